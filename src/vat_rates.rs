use rust_decimal::Decimal;

/// (country, standard rate, reduced rates), rates as (mantissa, scale). European VAT rates, 2024.
static EUROPEAN_VAT_RATES: &[(&str, (i64, u32), &[(i64, u32)])] = &[
    // eurozone
    ("AT", (20, 0), &[(10, 0), (13, 0)]),
    ("BE", (21, 0), &[(6, 0), (12, 0)]),
    ("CY", (19, 0), &[(5, 0), (9, 0)]),
    ("EE", (20, 0), &[(9, 0)]),
    ("FI", (24, 0), &[(10, 0), (14, 0)]),
    ("FR", (20, 0), &[(21, 1), (55, 1), (10, 0)]),
    ("DE", (19, 0), &[(7, 0)]),
    ("GR", (24, 0), &[(6, 0), (13, 0)]),
    ("IE", (23, 0), &[(9, 0), (135, 1)]),
    ("IT", (22, 0), &[(5, 0), (10, 0)]),
    ("LV", (21, 0), &[(5, 0), (12, 0)]),
    ("LT", (21, 0), &[(5, 0), (9, 0)]),
    ("LU", (17, 0), &[(3, 0), (8, 0), (14, 0)]),
    ("MT", (18, 0), &[(5, 0), (7, 0)]),
    ("NL", (21, 0), &[(9, 0)]),
    ("PT", (23, 0), &[(6, 0), (13, 0)]),
    ("SK", (20, 0), &[(10, 0)]),
    ("SI", (22, 0), &[(95, 1)]),
    ("ES", (21, 0), &[(10, 0)]),
    // EU, outside the eurozone
    ("BG", (20, 0), &[(9, 0)]),
    ("HR", (25, 0), &[(5, 0), (13, 0)]),
    ("CZ", (21, 0), &[(10, 0), (15, 0)]),
    ("HU", (27, 0), &[(5, 0), (18, 0)]),
    ("PL", (23, 0), &[(5, 0), (8, 0)]),
    ("RO", (19, 0), &[(5, 0), (9, 0)]),
    // rest of Europe
    ("GB", (20, 0), &[(5, 0)]),
    ("CH", (77, 1), &[(25, 1), (37, 1)]),
    ("NO", (25, 0), &[(12, 0), (15, 0)]),
    ("SE", (25, 0), &[(6, 0), (12, 0)]),
    ("DK", (25, 0), &[]),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VatRates {
    pub standard: Decimal,
    pub reduced: Vec<Decimal>,
}

impl VatRates {
    /// Standard, reduced, then zero: the order the rates are listed to users.
    pub fn valid_rates(&self) -> Vec<Decimal> {
        let mut out = Vec::with_capacity(self.reduced.len() + 2);
        out.push(self.standard);
        out.extend(self.reduced.iter().copied());
        out.push(Decimal::ZERO);
        out
    }

    pub fn allows(&self, rate: Decimal) -> bool {
        self.valid_rates().contains(&rate)
    }
}

/// Rates for a seller country code (case-insensitive); `None` outside the table.
pub fn vat_rates_for(country_code: &str) -> Option<VatRates> {
    let country = country_code.trim().to_ascii_uppercase();
    EUROPEAN_VAT_RATES
        .iter()
        .find(|(c, _, _)| *c == country)
        .map(|(_, (m, s), reduced)| VatRates {
            standard: Decimal::new(*m, *s),
            reduced: reduced.iter().map(|(m, s)| Decimal::new(*m, *s)).collect(),
        })
}

/// `Invalid VAT rate 21% for DE. Valid rates: 19, 7, 0%`
pub fn invalid_rate_message(rate: Decimal, country_code: &str, rates: &VatRates) -> String {
    let listed = rates
        .valid_rates()
        .iter()
        .map(|r| r.normalize().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Invalid VAT rate {}% for {}. Valid rates: {}%",
        rate.normalize(),
        country_code.trim().to_ascii_uppercase(),
        listed
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn germany_accepts_standard_reduced_and_zero() {
        let de = vat_rates_for("de").unwrap();
        assert!(de.allows(Decimal::from(19)));
        assert!(de.allows(Decimal::from(7)));
        assert!(de.allows(Decimal::ZERO));
        assert!(!de.allows(Decimal::from(21)));
    }

    #[test]
    fn message_names_rate_and_valid_set() {
        let de = vat_rates_for("DE").unwrap();
        assert_eq!(
            invalid_rate_message(Decimal::from(21), "de", &de),
            "Invalid VAT rate 21% for DE. Valid rates: 19, 7, 0%"
        );
    }

    #[test]
    fn fractional_rates_compare_by_value() {
        let fr = vat_rates_for("FR").unwrap();
        assert!(fr.allows(Decimal::from_str("5.50").unwrap()));
        assert!(fr.allows(Decimal::from_str("2.1").unwrap()));
        let ch = vat_rates_for("CH").unwrap();
        assert_eq!(ch.standard, Decimal::from_str("7.7").unwrap());
    }

    #[test]
    fn denmark_has_no_reduced_rates() {
        let dk = vat_rates_for("DK").unwrap();
        assert_eq!(dk.valid_rates(), vec![Decimal::from(25), Decimal::ZERO]);
    }

    #[test]
    fn unknown_country_has_no_table() {
        assert!(vat_rates_for("US").is_none());
        assert!(vat_rates_for("").is_none());
    }
}
