use rust_decimal::Decimal;
use serde::Serialize;

use crate::currency::round_cents;
use crate::document::LineItem;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineTotals {
    pub net: Decimal,
    pub vat: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub subtotal: Decimal,
    pub vat: Decimal,
    pub total: Decimal,
    pub lines: Vec<LineTotals>,
}

/// Printed net and VAT for one line, each rounded half-up to cents.
pub fn line_totals(item: &LineItem) -> LineTotals {
    let gross = item.quantity * item.unit_price;
    LineTotals {
        net: round_cents(gross),
        vat: round_cents(gross * item.vat_rate / HUNDRED),
    }
}

/// The subtotal is the exact sum of `quantity × unit price`, rounded once; VAT is rounded
/// per line and then summed. An empty list yields zeros.
pub fn compute_totals(items: &[LineItem]) -> Totals {
    let lines: Vec<LineTotals> = items.iter().map(line_totals).collect();
    let subtotal = round_cents(items.iter().map(|i| i.quantity * i.unit_price).sum());
    let vat: Decimal = lines.iter().map(|l| l.vat).sum();
    Totals {
        subtotal,
        vat,
        total: subtotal + vat,
        lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::str::FromStr;

    fn item(q: &str, p: &str, r: &str) -> LineItem {
        LineItem {
            id: format!("{q}-{p}-{r}"),
            description: "x".into(),
            quantity: Decimal::from_str(q).unwrap(),
            unit_price: Decimal::from_str(p).unwrap(),
            vat_rate: Decimal::from_str(r).unwrap(),
        }
    }

    #[test]
    fn two_items_example() {
        let t = compute_totals(&[item("2", "100", "20"), item("1", "50", "0")]);
        assert_eq!(t.subtotal, Decimal::from(250));
        assert_eq!(t.vat, Decimal::from(40));
        assert_eq!(t.total, Decimal::from(290));
    }

    #[test]
    fn empty_list_is_zero() {
        let t = compute_totals(&[]);
        assert!(t.subtotal.is_zero() && t.vat.is_zero() && t.total.is_zero());
        assert!(t.lines.is_empty());
    }

    #[test]
    fn vat_is_rounded_per_line() {
        // 0.025 rounds to 0.03 on each line; rounding the sum 0.05 would give 0.05
        let t = compute_totals(&[item("1", "0.10", "25"), item("1", "0.10", "25")]);
        assert_eq!(t.vat, Decimal::from_str("0.06").unwrap());
        assert_eq!(t.subtotal, Decimal::from_str("0.20").unwrap());
    }

    #[test]
    fn subtotal_rounds_the_exact_sum_once() {
        // each line prints 50.00, but 2 x 49.995 = 99.99
        let t = compute_totals(&[item("1.5", "33.33", "0"), item("1.5", "33.33", "0")]);
        assert_eq!(t.subtotal, Decimal::from_str("99.99").unwrap());
        assert_eq!(t.total, Decimal::from_str("99.99").unwrap());
        assert!(t.lines.iter().all(|l| l.net == Decimal::from_str("50.00").unwrap()));
    }

    #[test]
    fn fractional_quantity_net_is_rounded() {
        let t = compute_totals(&[item("1.333", "3", "0")]);
        assert_eq!(t.subtotal, Decimal::from_str("4.00").unwrap());
    }

    #[test]
    fn random_lists_never_drift() {
        let mut rng = StdRng::seed_from_u64(0x1A2B_3C4D);
        let rates = ["0", "5", "5.5", "7", "10", "13.5", "19", "20", "21", "25"];

        for _ in 0..1000 {
            let n = rng.gen_range(1..=12);
            let items: Vec<LineItem> = (0..n)
                .map(|i| LineItem {
                    id: i.to_string(),
                    description: "line".into(),
                    quantity: Decimal::new(rng.gen_range(1..=99_999_900), 2),
                    unit_price: Decimal::new(rng.gen_range(0..=99_999_900), 2),
                    vat_rate: Decimal::from_str(rates[rng.gen_range(0..rates.len())]).unwrap(),
                })
                .collect();

            let t = compute_totals(&items);
            assert_eq!(t.total, t.subtotal + t.vat);

            let expected_vat: Decimal = items
                .iter()
                .map(|i| round_cents(i.quantity * i.unit_price * i.vat_rate / HUNDRED))
                .sum();
            assert_eq!(t.vat, expected_vat);
            let expected_subtotal: Decimal = items.iter().map(|i| i.quantity * i.unit_price).sum();
            assert_eq!(t.subtotal, round_cents(expected_subtotal));
            assert!(t.total.scale() <= 2);
            assert_eq!(t.lines.len(), items.len());
        }
    }
}
