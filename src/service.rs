use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::crypto::base64_encode;
use crate::document::InvoiceDocument;
use crate::error::{RenderError, ServiceError};
use crate::links::{LinkCreated, ShareableLinkService};
use crate::render::{prepare_with, render_pdf_cancellable, to_reflow, FontMetrics, FormattedInvoice};
use crate::store::{open_store, DocumentStore, InvoicePage, PageRequest, StoredInvoice};
use crate::totals::Totals;
use crate::validate::{check_persistable, validate, ValidatorOptions};

pub(crate) fn sanitize_filename(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        let ok = ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' || ch == ' ';
        out.push(if ok { ch } else { '_' });
    }
    let trimmed = out.trim().to_string();
    if trimmed.is_empty() { "invoice".to_string() } else { trimmed }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedTotals {
    pub subtotal: String,
    pub vat: String,
    pub total: String,
    pub raw: Totals,
}

/// Answer to `submit`: both renderings plus the numbers they were built from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submitted {
    pub totals: SubmittedTotals,
    pub html: String,
    /// Base64 of the PDF bytes.
    pub pdf: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkRequest {
    #[serde(alias = "invoiceData")]
    pub document: Value,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub expiry_days: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveLinkRequest {
    pub link_id: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SharedInvoice {
    pub success: bool,
    pub invoice: StoredInvoice,
}

/// Status plus JSON body, ready for any transport to send.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

pub fn respond<T: Serialize>(result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(body) => Response { status: 200, body },
            Err(e) => {
                tracing::error!(error = %e, "response does not serialize");
                Response {
                    status: 500,
                    body: serde_json::json!({ "error": "Server error" }),
                }
            }
        },
        Err(err) => {
            let status = err.status_code();
            if status >= 500 {
                tracing::error!(error = %err, status, "request failed");
            }
            Response {
                status,
                body: err.body(),
            }
        }
    }
}

/// Transport-agnostic entry point: validation, rendering, links and stored invoices.
#[derive(Clone)]
pub struct InvoiceService {
    store: Arc<dyn DocumentStore>,
    links: ShareableLinkService,
    validator: ValidatorOptions,
    metrics: FontMetrics,
}

impl InvoiceService {
    pub fn new(store: Arc<dyn DocumentStore>, cfg: &AppConfig) -> Result<Self, ServiceError> {
        let metrics = match &cfg.render.font_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "embedding configured font");
                FontMetrics::load(path)?
            }
            None => FontMetrics::embedded(),
        };
        Ok(Self {
            links: ShareableLinkService::new(store.clone(), cfg.links.clone()),
            store,
            validator: ValidatorOptions::from(&cfg.validation),
            metrics,
        })
    }

    /// Opens the configured store and builds the service on top of it.
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        let store = open_store(&cfg.store)?;
        Self::new(store, cfg)
    }

    pub fn links(&self) -> &ShareableLinkService {
        &self.links
    }

    pub fn validate(&self, raw: &Value) -> Result<InvoiceDocument, ServiceError> {
        validate(raw, &self.validator).map_err(|errors| {
            tracing::debug!(count = errors.len(), "invoice failed validation");
            ServiceError::Validation(errors)
        })
    }

    fn validate_persistable(&self, raw: &Value) -> Result<InvoiceDocument, ServiceError> {
        let doc = self.validate(raw)?;
        check_persistable(&doc).map_err(ServiceError::Validation)?;
        Ok(doc)
    }

    pub async fn submit(&self, raw: &Value) -> Result<Submitted, ServiceError> {
        self.submit_cancellable(raw, CancellationToken::new()).await
    }

    /// Like [`InvoiceService::submit`], abandoning the PDF as soon as `cancel` fires.
    pub async fn submit_cancellable(&self, raw: &Value, cancel: CancellationToken) -> Result<Submitted, ServiceError> {
        let doc = self.validate(raw)?;
        let (totals, formatted, tree) = prepare_with(&doc, &self.metrics);
        let html = to_reflow(&tree);
        let pdf = render_pdf_cancellable(tree, self.metrics.clone(), cancel).await?;

        tracing::info!(
            invoice = %formatted.invoice_number,
            pdf_bytes = pdf.len(),
            "invoice rendered"
        );

        Ok(Submitted {
            file_name: sanitize_filename(&format!("invoice-{}.pdf", formatted.invoice_number)),
            totals: SubmittedTotals {
                subtotal: formatted.subtotal,
                vat: formatted.vat,
                total: formatted.total,
                raw: totals,
            },
            html,
            pdf: base64_encode(&pdf),
        })
    }

    /// Totals and display strings exactly as the renderings will print them.
    pub fn format(&self, doc: &InvoiceDocument) -> (Totals, FormattedInvoice) {
        let (totals, formatted, _) = prepare_with(doc, &self.metrics);
        (totals, formatted)
    }

    /// PDF bytes for an already validated document, rendered on the blocking pool.
    pub async fn render_pdf(&self, doc: &InvoiceDocument) -> Result<Vec<u8>, RenderError> {
        let (_, _, tree) = prepare_with(doc, &self.metrics);
        render_pdf_cancellable(tree, self.metrics.clone(), CancellationToken::new()).await
    }

    pub async fn create_link(&self, req: CreateLinkRequest) -> Result<LinkCreated, ServiceError> {
        let doc = self.validate(&req.document)?;
        let created = self
            .links
            .create(doc, req.password.as_deref(), req.expiry_days, OffsetDateTime::now_utc())
            .await?;
        Ok(created)
    }

    pub async fn resolve_link(&self, req: ResolveLinkRequest) -> Result<SharedInvoice, ServiceError> {
        let invoice = self
            .links
            .open(&req.link_id, req.password.as_deref(), OffsetDateTime::now_utc())
            .await?;
        Ok(SharedInvoice { success: true, invoice })
    }

    pub async fn save(&self, raw: &Value) -> Result<StoredInvoice, ServiceError> {
        let doc = self.validate_persistable(raw)?;
        let stored = self.store.insert(doc).await?;
        tracing::info!(invoice_id = %stored.id, "invoice saved");
        Ok(stored)
    }

    pub async fn get(&self, id: &str) -> Result<StoredInvoice, ServiceError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    pub async fn update(&self, id: &str, raw: &Value) -> Result<StoredInvoice, ServiceError> {
        let doc = self.validate_persistable(raw)?;
        let stored = self
            .store
            .update(id, doc)
            .await?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))?;
        tracing::info!(invoice_id = %stored.id, "invoice updated");
        Ok(stored)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        if !self.store.delete(id).await? {
            return Err(ServiceError::NotFound(id.to_string()));
        }
        tracing::info!(invoice_id = id, "invoice deleted");
        Ok(())
    }

    pub async fn list(&self, page: u32, limit: u32) -> Result<InvoicePage, ServiceError> {
        Ok(self.store.list(PageRequest::new(page, limit)).await?)
    }
}
