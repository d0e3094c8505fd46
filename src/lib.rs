//! Invoice computation and rendering: validation, exact totals, localized formatting,
//! PDF and HTML output from one render tree, and expiring shareable links.

pub mod config;
pub mod crypto;
pub mod currency;
pub mod dates;
pub mod document;
pub mod error;
pub mod links;
pub mod render;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod totals;
pub mod validate;
pub mod vat_rates;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AppConfig;
pub use document::InvoiceDocument;
pub use error::{FieldError, ServiceError};
pub use service::InvoiceService;
