use rust_decimal::{Decimal, RoundingStrategy};

/// Display symbols for the selectable currencies. A few share a glyph (`$`, `£`, `¥`).
static CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("EUR", "€"),
    ("USD", "$"),
    ("GBP", "£"),
    ("CHF", "CHF"),
    ("SEK", "SEK"),
    ("NOK", "NOK"),
    ("DKK", "DKK"),
    ("PLN", "zł"),
    ("CZK", "Kč"),
    ("HUF", "Ft"),
    ("RON", "Lei"),
    ("BGN", "лв"),
    ("HRK", "kn"),
    ("RSD", "дин"),
    ("ALL", "L"),
    ("MKD", "ден"),
    ("BAM", "KM"),
    ("MNT", "₮"),
    ("GEL", "₾"),
    ("AMD", "դր"),
    ("AZN", "₼"),
    ("BYN", "Br"),
    ("MDL", "L"),
    ("UAH", "₴"),
    ("RUB", "₽"),
    ("KZT", "₸"),
    ("UZS", ""),
    ("KGS", "с"),
    ("TJS", "ЅМ"),
    ("TMT", "T"),
    ("TRY", "₺"),
    ("ILS", "₪"),
    ("EGP", "£"),
    ("MAD", "د.م"),
    ("TND", "د.ت"),
    ("LYD", "ل.د"),
    ("DZD", "د.ج"),
    ("XOF", "CFA"),
    ("XAF", "CFA"),
    ("CDF", "FC"),
    ("KES", "KSh"),
    ("NGN", "₦"),
    ("GHS", "₵"),
    ("ZAR", "R"),
    ("BWP", "P"),
    ("NAD", "N"),
    ("ZMW", "K"),
    ("MWK", "MK"),
    ("TZS", "TSh"),
    ("UGX", "USh"),
    ("ETB", "Br"),
    ("SOS", "S"),
    ("DJF", "Fdj"),
    ("KMF", "CF"),
    ("MUR", "₨"),
    ("SCR", "₨"),
    ("MVR", "MVR"),
    ("LKR", "₨"),
    ("BDT", "৳"),
    ("NPR", "₨"),
    ("PKR", "₨"),
    ("INR", "₹"),
    ("MMK", "K"),
    ("THB", "฿"),
    ("LAK", "₭"),
    ("KHR", "៛"),
    ("VND", "₫"),
    ("PHP", "₱"),
    ("MYR", "RM"),
    ("SGD", "S$"),
    ("IDR", "Rp"),
    ("BND", "B$"),
    ("JPY", "¥"),
    ("KRW", "₩"),
    ("CNY", "¥"),
    ("HKD", "HK$"),
    ("TWD", "NT$"),
    ("MOP", "MOP$"),
    ("AUD", "A$"),
    ("NZD", "NZ$"),
    ("FJD", "FJ$"),
    ("PGK", "K"),
    ("SBD", "SI$"),
    ("VUV", "VT"),
    ("WST", "WS$"),
    ("TOP", "T$"),
    ("CAD", "C$"),
    ("MXN", "$"),
    ("BRL", "R$"),
    ("ARS", "$"),
    ("CLP", "$"),
    ("COP", "$"),
    ("PEN", "S/"),
    ("BOB", "Bs"),
    ("PYG", "₲"),
    ("UYU", "$"),
    ("VES", "Bs"),
    ("GYD", "GY$"),
    ("SRD", "$"),
    ("BBD", "Bds$"),
    ("TTD", "TT$"),
    ("JMD", "J$"),
    ("HTG", "G"),
    ("DOP", "RD$"),
    ("CUC", "$"),
    ("CUP", "$"),
    ("BSD", "B$"),
    ("KYD", "CI$"),
    ("ANG", "ƒ"),
    ("AWG", "ƒ"),
    ("XCD", "EC$"),
    ("ECU", "Ecu"),
    ("PAB", "B/."),
    ("CRC", "₡"),
    ("NIO", "C$"),
    ("HNL", "L"),
    ("GTQ", "Q"),
    ("BZD", "BZ$"),
    ("SVC", "₡"),
    ("QAR", "ر.ق"),
    ("AED", "د.إ"),
    ("SAR", "ر.س"),
    ("OMR", "ر.ع"),
    ("YER", "﷼"),
    ("KWD", "د.ك"),
    ("BHD", ".د.ب"),
    ("IQD", "ع.د"),
    ("JOD", "د.ا"),
    ("LBP", "ل.ل"),
    ("SYP", "£"),
    ("IRR", "﷼"),
    ("AFN", "؋"),
];

pub fn is_known_currency(code: &str) -> bool {
    CURRENCY_SYMBOLS.iter().any(|(c, _)| *c == code)
}

pub fn currency_codes() -> impl Iterator<Item = &'static str> {
    CURRENCY_SYMBOLS.iter().map(|(c, _)| *c)
}

/// The symbol for `code`, or the code itself when it is unknown or has no symbol.
pub fn currency_symbol(code: &str) -> &str {
    CURRENCY_SYMBOLS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, s)| *s)
        .filter(|s| !s.is_empty())
        .unwrap_or(code)
}

/// Half-up to cents.
pub fn round_cents(v: Decimal) -> Decimal {
    v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `1234.5` -> `1,234.50`. Always two decimals, `,` grouping.
pub fn format_amount(v: Decimal) -> String {
    let mut rounded = round_cents(v);
    if rounded.is_zero() {
        rounded = Decimal::ZERO;
    }
    rounded.rescale(2);

    let s = rounded.abs().to_string();
    let (int_part, dec_part) = s.split_once('.').unwrap_or((s.as_str(), "00"));

    let mut out = String::with_capacity(s.len() + int_part.len() / 3 + 1);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }

    let sign = if rounded.is_sign_negative() { "-" } else { "" };
    format!("{}{}.{}", sign, out, dec_part)
}

/// Symbol prefix with no space, e.g. `€1,234.50`, `XYZ10.00`.
pub fn format_currency(amount: Decimal, currency_code: &str) -> String {
    format_with_prefix(amount, currency_symbol(currency_code))
}

pub fn format_with_prefix(amount: Decimal, prefix: &str) -> String {
    format!("{}{}", prefix, format_amount(amount))
}

/// Quantities and rates print without trailing zeros: `2`, `1.5`.
pub fn format_quantity(v: Decimal) -> String {
    v.normalize().to_string()
}

pub fn format_rate(v: Decimal) -> String {
    format!("{}%", format_quantity(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn euro_amounts_use_symbol_prefix() {
        assert_eq!(format_currency(d("250"), "EUR"), "€250.00");
        assert_eq!(format_currency(d("40"), "EUR"), "€40.00");
        assert_eq!(format_currency(d("290"), "EUR"), "€290.00");
    }

    #[test]
    fn unknown_currency_uses_code_as_symbol() {
        assert_eq!(format_currency(d("10"), "XYZ"), "XYZ10.00");
    }

    #[test]
    fn empty_symbol_falls_back_to_code() {
        assert!(is_known_currency("UZS"));
        assert_eq!(format_currency(d("5"), "UZS"), "UZS5.00");
    }

    #[test]
    fn thousands_are_grouped() {
        assert_eq!(format_amount(d("1234.5")), "1,234.50");
        assert_eq!(format_amount(d("999")), "999.00");
        assert_eq!(format_amount(d("1000")), "1,000.00");
        assert_eq!(format_amount(d("1234567.891")), "1,234,567.89");
        assert_eq!(format_currency(d("1234567"), "CHF"), "CHF1,234,567.00");
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(format_amount(d("0.005")), "0.01");
        assert_eq!(format_amount(d("2.675")), "2.68");
        assert_eq!(format_amount(d("0.004")), "0.00");
    }

    #[test]
    fn negative_amounts_keep_sign_after_symbol() {
        assert_eq!(format_currency(d("-5"), "EUR"), "€-5.00");
        assert_eq!(format_amount(d("-0.001")), "0.00");
    }

    #[test]
    fn quantities_and_rates_drop_trailing_zeros() {
        assert_eq!(format_quantity(d("2.00")), "2");
        assert_eq!(format_quantity(d("1.50")), "1.5");
        assert_eq!(format_rate(d("5.5")), "5.5%");
        assert_eq!(format_rate(d("19")), "19%");
    }

    #[test]
    fn table_has_no_duplicate_codes() {
        let mut codes: Vec<_> = currency_codes().collect();
        let before = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), before);
        assert!(before >= 130);
    }
}
