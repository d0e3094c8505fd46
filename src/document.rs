use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::dates::{serde_iso_date, serde_iso_date_opt};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    De,
    Fr,
    Es,
    It,
    Nl,
    Pt,
    Pl,
    Sv,
    Da,
    Fi,
    No,
}

impl Language {
    pub const ALL: [Language; 12] = [
        Language::En,
        Language::De,
        Language::Fr,
        Language::Es,
        Language::It,
        Language::Nl,
        Language::Pt,
        Language::Pl,
        Language::Sv,
        Language::Da,
        Language::Fi,
        Language::No,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::De => "de",
            Language::Fr => "fr",
            Language::Es => "es",
            Language::It => "it",
            Language::Nl => "nl",
            Language::Pt => "pt",
            Language::Pl => "pl",
            Language::Sv => "sv",
            Language::Da => "da",
            Language::Fi => "fi",
            Language::No => "no",
        }
    }

    /// Accepts `de`, `DE`, `de-AT`. Norwegian `nb`/`nn` map to `no`.
    pub fn from_code(code: &str) -> Option<Self> {
        let lower = code.trim().to_ascii_lowercase();
        let primary = lower.split(['-', '_']).next().unwrap_or("");
        match primary {
            "nb" | "nn" => Some(Language::No),
            p => Language::ALL.into_iter().find(|l| l.code() == p),
        }
    }

    pub fn from_code_or_default(code: &str) -> Self {
        Self::from_code(code).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateVariant {
    #[default]
    Default,
    /// Branded variant: shows the company logo and the online payment link.
    Stripe,
}

impl TemplateVariant {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "default" => Some(TemplateVariant::Default),
            "stripe" => Some(TemplateVariant::Stripe),
            _ => None,
        }
    }

    pub fn is_branded(self) -> bool {
        self == TemplateVariant::Stripe
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateFormat {
    #[serde(rename = "YYYY-MM-DD")]
    Iso,
    #[serde(rename = "DD/MM/YYYY")]
    DayMonthYear,
    #[serde(rename = "MM/DD/YYYY")]
    MonthDayYear,
}

impl DateFormat {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "YYYY-MM-DD" => Some(DateFormat::Iso),
            "DD/MM/YYYY" => Some(DateFormat::DayMonthYear),
            "MM/DD/YYYY" => Some(DateFormat::MonthDayYear),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralInfo {
    #[serde(default)]
    pub invoice_number_prefix: String,
    pub invoice_number_value: String,
    #[serde(with = "serde_iso_date")]
    pub issue_date: Date,
    #[serde(with = "serde_iso_date")]
    pub due_date: Date,
    #[serde(default, with = "serde_iso_date_opt", skip_serializing_if = "Option::is_none")]
    pub service_date: Option<Date>,
    pub currency: String,
    pub language: Language,
    #[serde(default)]
    pub template: TemplateVariant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<DateFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_link_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_logo: Option<String>,
}

impl GeneralInfo {
    /// `"{prefix} {value}"`, or just the value when there is no prefix.
    pub fn full_invoice_number(&self) -> String {
        let prefix = self.invoice_number_prefix.trim();
        let value = self.invoice_number_value.trim();
        if !prefix.is_empty() && !value.is_empty() {
            format!("{} {}", prefix, value)
        } else {
            value.to_string()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seller {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub vat_number: String,
    pub email: String,
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub swift_bic: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default, rename = "showVatInPDF")]
    pub show_vat_in_pdf: bool,
    #[serde(default, rename = "showAccountInPDF")]
    pub show_account_in_pdf: bool,
    #[serde(default, rename = "showSwiftInPDF")]
    pub show_swift_in_pdf: bool,
    #[serde(default)]
    pub notes: String,
    #[serde(default, rename = "showNotesInPDF")]
    pub show_notes_in_pdf: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Buyer {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub vat_number: String,
    pub email: String,
    #[serde(default)]
    pub country_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: String,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub vat_rate: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    #[serde(default)]
    pub method: String,
    #[serde(default, with = "serde_iso_date_opt", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Date>,
    #[serde(default)]
    pub terms: String,
    #[serde(default, rename = "showMethodInPDF")]
    pub show_method_in_pdf: bool,
    #[serde(default, rename = "showDueDateInPDF")]
    pub show_due_date_in_pdf: bool,
    #[serde(default, rename = "showTermsInPDF")]
    pub show_terms_in_pdf: bool,
}

impl PaymentInfo {
    pub fn any_visible(&self) -> bool {
        self.show_method_in_pdf || self.show_due_date_in_pdf || self.show_terms_in_pdf
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notes {
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "showInPDF")]
    pub show_in_pdf: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signature {
    #[serde(default, rename = "showInPDF")]
    pub show_in_pdf: bool,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
}

/// A validated invoice. Values are immutable once built; edits produce a new document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDocument {
    pub general: GeneralInfo,
    pub seller: Seller,
    pub buyer: Buyer,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub payment: PaymentInfo,
    #[serde(default)]
    pub notes: Notes,
    #[serde(default)]
    pub signature: Signature,
}

impl InvoiceDocument {
    pub fn full_invoice_number(&self) -> String {
        self.general.full_invoice_number()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_number_joins_prefix_and_value() {
        let mut g = crate::test_support::sample_document().general;
        g.invoice_number_prefix = "INV".into();
        g.invoice_number_value = "2024-001".into();
        assert_eq!(g.full_invoice_number(), "INV 2024-001");
        g.invoice_number_prefix = "  ".into();
        assert_eq!(g.full_invoice_number(), "2024-001");
    }

    #[test]
    fn language_codes_are_lenient() {
        assert_eq!(Language::from_code("DE"), Some(Language::De));
        assert_eq!(Language::from_code("fr-CA"), Some(Language::Fr));
        assert_eq!(Language::from_code("nb"), Some(Language::No));
        assert_eq!(Language::from_code("sr"), None);
        assert_eq!(Language::from_code_or_default("sr"), Language::En);
    }

    #[test]
    fn document_json_uses_pdf_flag_names() {
        let doc = crate::test_support::sample_document();
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json["seller"].get("showVatInPDF").is_some());
        assert!(json["notes"].get("showInPDF").is_some());
        assert_eq!(json["general"]["issueDate"], "2024-03-01");
        assert_eq!(json["general"]["dateFormat"], serde_json::Value::Null);

        let back: InvoiceDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }
}
