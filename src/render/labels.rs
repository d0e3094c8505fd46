use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Deserialize;

use crate::document::Language;

/// Fixed captions printed on an invoice, one set per language.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Labels {
    pub invoice: String,
    pub date_of_issue: String,
    pub date_due: String,
    pub service_date: String,
    pub currency: String,
    pub bill_to: String,
    pub ship_to: String,
    pub description: String,
    pub quantity: String,
    pub unit_price: String,
    pub tax: String,
    pub amount: String,
    pub subtotal: String,
    pub vat: String,
    pub total: String,
    pub payment_information: String,
    pub payment_method: String,
    pub due_date: String,
    pub payment_terms: String,
    pub notes: String,
    pub signature: String,
    pub pay_online: String,
    pub vat_number: String,
    pub account_number: String,
    pub swift_bic: String,
    pub email: String,
    pub page: String,
}

impl Labels {
    fn english() -> Self {
        Labels {
            invoice: "Invoice".into(),
            date_of_issue: "Date of issue".into(),
            date_due: "Date due".into(),
            service_date: "Service date".into(),
            currency: "Currency".into(),
            bill_to: "Bill to".into(),
            ship_to: "Ship to".into(),
            description: "Description".into(),
            quantity: "Qty".into(),
            unit_price: "Unit price".into(),
            tax: "Tax".into(),
            amount: "Amount".into(),
            subtotal: "Subtotal".into(),
            vat: "VAT".into(),
            total: "Total".into(),
            payment_information: "Payment information".into(),
            payment_method: "Payment method".into(),
            due_date: "Due date".into(),
            payment_terms: "Payment terms".into(),
            notes: "Notes".into(),
            signature: "Signature".into(),
            pay_online: "Pay online".into(),
            vat_number: "VAT number".into(),
            account_number: "Account number".into(),
            swift_bic: "SWIFT/BIC".into(),
            email: "Email".into(),
            page: "Page".into(),
        }
    }
}

static LABELS: OnceLock<HashMap<String, Labels>> = OnceLock::new();

fn catalog() -> &'static HashMap<String, Labels> {
    LABELS.get_or_init(|| {
        let json = include_str!("../../assets/labels.json");
        match serde_json::from_str::<HashMap<String, Labels>>(json) {
            Ok(map) => map,
            Err(e) => {
                tracing::error!(error = %e, "label catalog is malformed; using English captions");
                HashMap::new()
            }
        }
    })
}

/// Captions for `language`; English when the catalog lacks the language.
pub fn labels_for(language: Language) -> Labels {
    let file = catalog();
    file.get(language.code())
        .or_else(|| file.get(Language::En.code()))
        .cloned()
        .unwrap_or_else(Labels::english)
}
