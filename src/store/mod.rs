//! Persistence for invoices and their shareable links.
//!
//! [`DocumentStore`] is the only seam the rest of the crate sees. The SQLite backend is used
//! when a database is configured; otherwise everything lives in process memory.

mod memory;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;

use crate::config::{StoreBackend, StoreConfig};
use crate::document::InvoiceDocument;
use crate::error::StoreError;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareableLink {
    pub id: String,
    pub invoice_id: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl ShareableLink {
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredInvoice {
    pub id: String,
    pub document: InvoiceDocument,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shareable_link: Option<ShareableLink>,
}

/// A link about to be attached to an invoice; the store fills in the invoice id.
#[derive(Debug, Clone)]
pub struct NewLink {
    pub id: String,
    pub password_hash: Option<String>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl NewLink {
    fn attach(self, invoice_id: &str) -> ShareableLink {
        ShareableLink {
            id: self.id,
            invoice_id: invoice_id.to_string(),
            password_hash: self.password_hash,
            is_active: true,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// 1-based page number and page size. The size is clamped to `1..=MAX_PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePage {
    pub items: Vec<StoredInvoice>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    /// `ceil(total / limit)`; zero for an empty store.
    pub pages: u64,
}

impl InvoicePage {
    pub fn new(items: Vec<StoredInvoice>, total: u64, req: PageRequest) -> Self {
        InvoicePage {
            items,
            total,
            page: req.page,
            limit: req.limit,
            pages: total.div_ceil(u64::from(req.limit.max(1))),
        }
    }
}

/// Result of looking a link up at a given instant.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkLookup {
    Active(Box<StoredInvoice>),
    Expired,
    NotFound,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, document: InvoiceDocument) -> Result<StoredInvoice, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<StoredInvoice>, StoreError>;

    /// Replaces the document; `None` when no invoice has that id.
    async fn update(&self, id: &str, document: InvoiceDocument) -> Result<Option<StoredInvoice>, StoreError>;

    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Newest first.
    async fn list(&self, page: PageRequest) -> Result<InvoicePage, StoreError>;

    /// Stores the document under its full invoice number, replacing an earlier invoice with
    /// the same number, and attaches `link` in the same step. Any previous link is dropped.
    async fn upsert_by_number(&self, document: InvoiceDocument, link: NewLink) -> Result<StoredInvoice, StoreError>;

    /// Active and expiry checks happen in the same call that reads the invoice.
    async fn lookup_link(&self, link_id: &str, now: OffsetDateTime) -> Result<LinkLookup, StoreError>;

    async fn deactivate_link(&self, link_id: &str) -> Result<bool, StoreError>;
}

/// Picks the backend once, at startup.
pub fn open_store(cfg: &StoreConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match cfg.resolved_backend() {
        StoreBackend::Sqlite => {
            let path = cfg.sqlite_path();
            tracing::info!(path = %path.display(), "using sqlite document store");
            Ok(Arc::new(SqliteStore::open(&path)?))
        }
        StoreBackend::Memory => {
            tracing::info!("no database configured, using in-memory document store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Link state at `now`: inactive links are indistinguishable from missing ones.
pub(crate) fn classify_link(link: &ShareableLink, now: OffsetDateTime) -> LinkState {
    if !link.is_active {
        LinkState::Missing
    } else if link.expires_at <= now {
        LinkState::Expired
    } else {
        LinkState::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkState {
    Active,
    Expired,
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn link(active: bool, expires_in: Duration) -> ShareableLink {
        let now = OffsetDateTime::UNIX_EPOCH + Duration::days(20_000);
        ShareableLink {
            id: "a".repeat(32),
            invoice_id: "inv".into(),
            password_hash: None,
            is_active: active,
            created_at: now,
            expires_at: now + expires_in,
        }
    }

    #[test]
    fn expired_wins_over_active() {
        let now = OffsetDateTime::UNIX_EPOCH + Duration::days(20_000);
        assert_eq!(classify_link(&link(true, Duration::days(1)), now), LinkState::Active);
        assert_eq!(classify_link(&link(true, Duration::seconds(-1)), now), LinkState::Expired);
        assert_eq!(classify_link(&link(false, Duration::days(1)), now), LinkState::Missing);
    }

    #[test]
    fn page_request_is_clamped() {
        let p = PageRequest::new(0, 500);
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
    }

    #[test]
    fn page_count_rounds_up() {
        let req = PageRequest::new(1, 10);
        assert_eq!(InvoicePage::new(Vec::new(), 0, req).pages, 0);
        assert_eq!(InvoicePage::new(Vec::new(), 10, req).pages, 1);
        let json = serde_json::to_value(InvoicePage::new(Vec::new(), 21, req)).unwrap();
        assert_eq!(json["pages"], 3);
        assert_eq!(json["total"], 21);
    }

    #[test]
    fn stored_link_never_serializes_its_hash() {
        let mut l = link(true, Duration::days(1));
        l.password_hash = Some("$argon2id$secret".into());
        let json = serde_json::to_value(&l).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["isActive"], true);
    }
}
