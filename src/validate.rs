use std::collections::HashSet;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use time::Date;

use crate::config::ValidationConfig;
use crate::crypto::base64_decode;
use crate::currency::is_known_currency;
use crate::dates::parse_calendar_date;
use crate::document::{
    Buyer, DateFormat, GeneralInfo, InvoiceDocument, Language, LineItem, Notes, PaymentInfo, Seller,
    Signature, TemplateVariant,
};
use crate::error::FieldError;
use crate::vat_rates::{invalid_rate_message, vat_rates_for};

pub const MAX_INVOICE_NUMBER_LEN: usize = 50;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_ADDRESS_LEN: usize = 200;
pub const MAX_VAT_NUMBER_LEN: usize = 20;
pub const MAX_ACCOUNT_NUMBER_LEN: usize = 34;
pub const MAX_SWIFT_LEN: usize = 11;
pub const MAX_DESCRIPTION_LEN: usize = 200;
pub const MAX_LOGO_BYTES: usize = 3 * 1024 * 1024;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";
static EMAIL_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatorOptions {
    /// Check item rates (and the seller VAT number) against the seller country's VAT table.
    pub enforce_jurisdiction_vat: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            enforce_jurisdiction_vat: true,
        }
    }
}

impl From<&ValidationConfig> for ValidatorOptions {
    fn from(cfg: &ValidationConfig) -> Self {
        Self {
            enforce_jurisdiction_vat: cfg.enforce_jurisdiction_vat,
        }
    }
}

pub fn is_valid_email(s: &str) -> bool {
    match EMAIL_RE.get_or_init(|| Regex::new(EMAIL_PATTERN)) {
        Ok(re) => re.is_match(s),
        Err(_) => false,
    }
}

/// Free text is stored without angle brackets and surrounding whitespace.
pub fn sanitize_text(s: &str) -> String {
    s.replace(['<', '>'], "").trim().to_string()
}

fn is_http_url(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let rest = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"));
    match rest {
        Some(r) => !r.split(['/', '?', '#']).next().unwrap_or("").is_empty(),
        None => false,
    }
}

/// Decodes a `data:image/{jpeg,png,webp};base64,...` logo and enforces the size limit.
pub fn decode_logo_data_uri(uri: &str) -> Result<Vec<u8>, &'static str> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or("Logo must be a data URI")?;
    let (meta, data) = rest.split_once(',').ok_or("Logo must be a data URI")?;
    let meta = meta.to_ascii_lowercase();
    let mime_part = meta
        .strip_suffix(";base64")
        .ok_or("Logo must be base64 encoded")?;
    let parsed: mime::Mime = mime_part
        .parse()
        .map_err(|_| "Logo has an invalid MIME type")?;
    if parsed.type_() != mime::IMAGE || !matches!(parsed.subtype().as_str(), "jpeg" | "png" | "webp") {
        return Err("Logo must be a JPEG, PNG or WebP image");
    }

    let bytes = base64_decode(data).map_err(|_| "Logo data is not valid base64")?;
    if bytes.len() > MAX_LOGO_BYTES {
        return Err("Logo must be at most 3 MB");
    }
    Ok(bytes)
}

fn parse_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => {
            let s = n.to_string();
            Decimal::from_str(&s)
                .or_else(|_| Decimal::from_scientific(&s))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

type Obj = Map<String, Value>;

#[derive(Default)]
struct Collector {
    errors: Vec<FieldError>,
}

impl Collector {
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    fn section<'a>(&mut self, root: &'a Obj, key: &str, label: &str, required: bool) -> Option<&'a Obj> {
        match root.get(key) {
            Some(Value::Object(m)) => Some(m),
            None | Some(Value::Null) => {
                if required {
                    self.push(key, format!("{label} details are required"));
                }
                None
            }
            Some(_) => {
                self.push(key, format!("{label} must be an object"));
                None
            }
        }
    }

    fn raw_text(&mut self, map: Option<&Obj>, section: &str, key: &str) -> String {
        match map.and_then(|m| m.get(key)) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(_) => {
                self.push(format!("{section}.{key}"), "Must be text");
                String::new()
            }
        }
    }

    fn text(&mut self, map: Option<&Obj>, section: &str, key: &str) -> String {
        sanitize_text(&self.raw_text(map, section, key))
    }

    fn required_text(&mut self, map: Option<&Obj>, section: &str, key: &str, label: &str) -> String {
        let value = self.text(map, section, key);
        if value.is_empty() && map.is_some() {
            self.push(format!("{section}.{key}"), format!("{label} is required"));
        }
        value
    }

    fn max_len(&mut self, field: &str, value: &str, max: usize, label: &str) {
        if value.chars().count() > max {
            self.push(field, format!("{label} must be at most {max} characters"));
        }
    }

    fn email(&mut self, map: Option<&Obj>, section: &str, label: &str) -> String {
        let value = self.required_text(map, section, "email", label);
        if !value.is_empty() && !is_valid_email(&value) {
            self.push(format!("{section}.email"), "Invalid email format");
        }
        value
    }

    fn flag(&mut self, map: Option<&Obj>, section: &str, key: &str) -> bool {
        match map.and_then(|m| m.get(key)) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(_) => {
                self.push(format!("{section}.{key}"), "Must be true or false");
                false
            }
        }
    }

    fn date(&mut self, map: Option<&Obj>, section: &str, key: &str, label: &str, required: bool) -> Option<Date> {
        let raw = self.raw_text(map, section, key);
        if raw.is_empty() {
            if required && map.is_some() {
                self.push(format!("{section}.{key}"), format!("{label} is required"));
            }
            return None;
        }
        match parse_calendar_date(&raw) {
            Ok(d) => Some(d),
            Err(_) => {
                self.push(
                    format!("{section}.{key}"),
                    format!("{label} must be a valid date (YYYY-MM-DD)"),
                );
                None
            }
        }
    }

    fn number(&mut self, map: &Obj, field: &str, key: &str, label: &str) -> Option<Decimal> {
        match map.get(key).and_then(parse_decimal) {
            Some(d) => Some(d),
            None => {
                self.push(format!("{field}.{key}"), format!("{label} must be a number"));
                None
            }
        }
    }
}

/// Checks raw invoice JSON and builds the normalized document. Never panics and never stops at
/// the first problem: either a document or every field error found.
pub fn validate(raw: &Value, options: &ValidatorOptions) -> Result<InvoiceDocument, Vec<FieldError>> {
    let Some(root) = raw.as_object() else {
        return Err(vec![FieldError::new("", "Invoice must be a JSON object")]);
    };

    let mut v = Collector::default();

    let general = v.section(root, "general", "General", true);
    let seller = v.section(root, "seller", "Seller", true);
    let buyer = v.section(root, "buyer", "Buyer", true);
    let payment = v.section(root, "payment", "Payment", false);
    let notes = v.section(root, "notes", "Notes", false);
    let signature = v.section(root, "signature", "Signature", false);

    // general
    let number_prefix = v.text(general, "general", "invoiceNumberPrefix");
    let mut number_value = v.text(general, "general", "invoiceNumberValue");
    if number_value.is_empty() {
        number_value = v.text(general, "general", "invoiceNumber");
    }
    if number_value.is_empty() {
        if general.is_some() {
            v.push("general.invoiceNumberValue", "Invoice number is required");
        }
    } else {
        let full_len = number_prefix.chars().count()
            + number_value.chars().count()
            + usize::from(!number_prefix.is_empty());
        if full_len > MAX_INVOICE_NUMBER_LEN {
            v.push(
                "general.invoiceNumberValue",
                format!("Invoice number must be at most {MAX_INVOICE_NUMBER_LEN} characters"),
            );
        }
    }

    let issue_date = v.date(general, "general", "issueDate", "Issue date", true);
    let due_date = v.date(general, "general", "dueDate", "Due date", true);
    let service_date = v.date(general, "general", "serviceDate", "Service date", false);

    let currency = v
        .required_text(general, "general", "currency", "Currency")
        .to_ascii_uppercase();
    if !currency.is_empty() && !is_known_currency(&currency) {
        v.push("general.currency", format!("Unsupported currency {currency}"));
    }

    let language_raw = v.required_text(general, "general", "language", "Language");
    let language = Language::from_code(&language_raw);
    if language.is_none() && !language_raw.is_empty() {
        v.push("general.language", format!("Unsupported language {language_raw}"));
    }

    let mut template_raw = v.text(general, "general", "template");
    if template_raw.is_empty() {
        template_raw = match root.get("template") {
            Some(Value::String(s)) => sanitize_text(s),
            _ => String::new(),
        };
    }
    let template = if template_raw.is_empty() {
        TemplateVariant::Default
    } else {
        TemplateVariant::from_code(&template_raw).unwrap_or_else(|| {
            v.push("general.template", "Template must be one of default, stripe");
            TemplateVariant::Default
        })
    };

    let date_format_raw = v.text(general, "general", "dateFormat");
    let date_format = if date_format_raw.is_empty() {
        None
    } else {
        let parsed = DateFormat::from_code(&date_format_raw);
        if parsed.is_none() {
            v.push(
                "general.dateFormat",
                "Date format must be one of YYYY-MM-DD, DD/MM/YYYY, MM/DD/YYYY",
            );
        }
        parsed
    };

    let payment_link_url = v.raw_text(general, "general", "paymentLinkUrl");
    if !payment_link_url.is_empty() && !is_http_url(&payment_link_url) {
        v.push("general.paymentLinkUrl", "Payment link must be an http(s) URL");
    }

    let company_logo = v.raw_text(general, "general", "companyLogo");
    if !company_logo.is_empty() {
        if let Err(msg) = decode_logo_data_uri(&company_logo) {
            v.push("general.companyLogo", msg);
        }
    }

    // seller
    let seller_name = v.required_text(seller, "seller", "name", "Seller name");
    v.max_len("seller.name", &seller_name, MAX_NAME_LEN, "Seller name");
    let seller_address = v.required_text(seller, "seller", "address", "Seller address");
    v.max_len("seller.address", &seller_address, MAX_ADDRESS_LEN, "Seller address");
    let seller_vat = v.text(seller, "seller", "vatNumber");
    v.max_len("seller.vatNumber", &seller_vat, MAX_VAT_NUMBER_LEN, "VAT number");
    let seller_email = v.email(seller, "seller", "Seller email");
    let account_number = v.text(seller, "seller", "accountNumber");
    v.max_len("seller.accountNumber", &account_number, MAX_ACCOUNT_NUMBER_LEN, "Account number");
    let swift_bic = v.text(seller, "seller", "swiftBic");
    v.max_len("seller.swiftBic", &swift_bic, MAX_SWIFT_LEN, "SWIFT/BIC");
    let seller_country = v.text(seller, "seller", "countryCode").to_ascii_uppercase();
    let seller_notes = v.text(seller, "seller", "notes");
    let show_vat = v.flag(seller, "seller", "showVatInPDF");
    let show_account = v.flag(seller, "seller", "showAccountInPDF");
    let show_swift = v.flag(seller, "seller", "showSwiftInPDF");
    let show_seller_notes = v.flag(seller, "seller", "showNotesInPDF");

    let jurisdiction = if options.enforce_jurisdiction_vat {
        vat_rates_for(&seller_country)
    } else {
        None
    };
    if jurisdiction.is_some() && seller_vat.is_empty() {
        v.push("seller.vatNumber", "VAT number is required for EU businesses");
    }

    // buyer
    let buyer_name = v.required_text(buyer, "buyer", "name", "Buyer name");
    v.max_len("buyer.name", &buyer_name, MAX_NAME_LEN, "Buyer name");
    let buyer_address = v.required_text(buyer, "buyer", "address", "Buyer address");
    v.max_len("buyer.address", &buyer_address, MAX_ADDRESS_LEN, "Buyer address");
    let buyer_vat = v.text(buyer, "buyer", "vatNumber");
    v.max_len("buyer.vatNumber", &buyer_vat, MAX_VAT_NUMBER_LEN, "VAT number");
    let buyer_email = v.email(buyer, "buyer", "Buyer email");
    let buyer_country = v.text(buyer, "buyer", "countryCode").to_ascii_uppercase();

    // items
    let mut items: Vec<LineItem> = Vec::new();
    match root.get("items") {
        Some(Value::Array(list)) if !list.is_empty() => {
            let mut seen_ids: HashSet<String> = HashSet::new();
            for (idx, entry) in list.iter().enumerate() {
                let field = format!("items[{idx}]");
                let Some(obj) = entry.as_object() else {
                    v.push(field, "Item must be an object");
                    continue;
                };
                let id = v.text(Some(obj), &field, "id");
                if id.is_empty() {
                    v.push(format!("{field}.id"), "Item id is required");
                } else if !seen_ids.insert(id.clone()) {
                    v.push(format!("{field}.id"), format!("Duplicate item id {id}"));
                }

                let description = v.required_text(Some(obj), &field, "description", "Description");
                v.max_len(
                    &format!("{field}.description"),
                    &description,
                    MAX_DESCRIPTION_LEN,
                    "Description",
                );

                let quantity = v.number(obj, &field, "quantity", "Quantity");
                if let Some(q) = quantity {
                    if q <= Decimal::ZERO {
                        v.push(format!("{field}.quantity"), "Quantity must be positive");
                    } else if q > Decimal::from(999_999) {
                        v.push(format!("{field}.quantity"), "Quantity must not exceed 999999");
                    }
                }

                let unit_price = v.number(obj, &field, "unitPrice", "Unit price");
                if let Some(p) = unit_price {
                    if p < Decimal::ZERO {
                        v.push(format!("{field}.unitPrice"), "Unit price must not be negative");
                    } else if p > Decimal::from(999_999) {
                        v.push(format!("{field}.unitPrice"), "Unit price must not exceed 999999");
                    }
                }

                let vat_rate = v.number(obj, &field, "vatRate", "VAT rate");
                if let Some(r) = vat_rate {
                    if r < Decimal::ZERO || r > Decimal::ONE_HUNDRED {
                        v.push(format!("{field}.vatRate"), "VAT rate must be between 0 and 100");
                    } else if let Some(rates) = &jurisdiction {
                        if !rates.allows(r) {
                            v.push(
                                format!("{field}.vatRate"),
                                invalid_rate_message(r, &seller_country, rates),
                            );
                        }
                    }
                }

                if let (Some(quantity), Some(unit_price), Some(vat_rate)) = (quantity, unit_price, vat_rate) {
                    items.push(LineItem {
                        id,
                        description,
                        quantity,
                        unit_price,
                        vat_rate,
                    });
                }
            }
        }
        None | Some(Value::Null) | Some(Value::Array(_)) => {
            v.push("items", "At least one item is required");
        }
        Some(_) => v.push("items", "Items must be a list"),
    }

    // optional sections
    let payment_info = PaymentInfo {
        method: v.text(payment, "payment", "method"),
        due_date: v.date(payment, "payment", "dueDate", "Payment due date", false),
        terms: v.text(payment, "payment", "terms"),
        show_method_in_pdf: v.flag(payment, "payment", "showMethodInPDF"),
        show_due_date_in_pdf: v.flag(payment, "payment", "showDueDateInPDF"),
        show_terms_in_pdf: v.flag(payment, "payment", "showTermsInPDF"),
    };
    let notes_info = Notes {
        content: v.text(notes, "notes", "content"),
        show_in_pdf: v.flag(notes, "notes", "showInPDF"),
    };
    let signature_info = Signature {
        show_in_pdf: v.flag(signature, "signature", "showInPDF"),
        name: v.text(signature, "signature", "name"),
        title: v.text(signature, "signature", "title"),
    };

    if !v.errors.is_empty() {
        return Err(v.errors);
    }

    let (Some(issue_date), Some(due_date), Some(language)) = (issue_date, due_date, language) else {
        return Err(vec![FieldError::new("general", "General details are incomplete")]);
    };

    Ok(InvoiceDocument {
        general: GeneralInfo {
            invoice_number_prefix: number_prefix,
            invoice_number_value: number_value,
            issue_date,
            due_date,
            service_date,
            currency,
            language,
            template,
            date_format,
            payment_link_url: Some(payment_link_url).filter(|s| !s.is_empty()),
            company_logo: Some(company_logo).filter(|s| !s.is_empty()),
        },
        seller: Seller {
            name: seller_name,
            address: seller_address,
            vat_number: seller_vat,
            email: seller_email,
            account_number,
            swift_bic,
            country_code: seller_country,
            show_vat_in_pdf: show_vat,
            show_account_in_pdf: show_account,
            show_swift_in_pdf: show_swift,
            notes: seller_notes,
            show_notes_in_pdf: show_seller_notes,
        },
        buyer: Buyer {
            name: buyer_name,
            address: buyer_address,
            vat_number: buyer_vat,
            email: buyer_email,
            country_code: buyer_country,
        },
        items,
        payment: payment_info,
        notes: notes_info,
        signature: signature_info,
    })
}

/// Extra rule for documents that are stored or shared; the live preview may break it.
pub fn check_persistable(doc: &InvoiceDocument) -> Result<(), Vec<FieldError>> {
    if doc.general.due_date < doc.general.issue_date {
        return Err(vec![FieldError::new(
            "general.dueDate",
            "Due date must not be before the issue date",
        )]);
    }
    Ok(())
}
