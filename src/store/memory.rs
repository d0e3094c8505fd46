use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{classify_link, DocumentStore, InvoicePage, LinkLookup, LinkState, NewLink, PageRequest, StoredInvoice};
use crate::document::InvoiceDocument;
use crate::error::StoreError;

struct Entry {
    seq: u64,
    invoice: StoredInvoice,
}

#[derive(Default)]
struct Inner {
    invoices: HashMap<String, Entry>,
    // link id -> invoice id
    links: HashMap<String, String>,
    next_seq: u64,
}

impl Inner {
    fn push(&mut self, invoice: StoredInvoice) {
        self.next_seq += 1;
        if let Some(link) = &invoice.shareable_link {
            self.links.insert(link.id.clone(), invoice.id.clone());
        }
        self.invoices.insert(
            invoice.id.clone(),
            Entry {
                seq: self.next_seq,
                invoice,
            },
        );
    }
}

/// Process-local store; every operation holds the lock once, so it is atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, document: InvoiceDocument) -> Result<StoredInvoice, StoreError> {
        let now = OffsetDateTime::now_utc();
        let stored = StoredInvoice {
            id: Uuid::new_v4().to_string(),
            document,
            created_at: now,
            updated_at: now,
            shareable_link: None,
        };
        self.inner.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Option<StoredInvoice>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.invoices.get(id).map(|e| e.invoice.clone()))
    }

    async fn update(&self, id: &str, document: InvoiceDocument) -> Result<Option<StoredInvoice>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.invoices.get_mut(id) else {
            return Ok(None);
        };
        entry.invoice.document = document;
        entry.invoice.updated_at = OffsetDateTime::now_utc();
        Ok(Some(entry.invoice.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.invoices.remove(id) else {
            return Ok(false);
        };
        if let Some(link) = entry.invoice.shareable_link {
            inner.links.remove(&link.id);
        }
        Ok(true)
    }

    async fn list(&self, page: PageRequest) -> Result<InvoicePage, StoreError> {
        let inner = self.inner.read().await;
        let mut entries: Vec<&Entry> = inner.invoices.values().collect();
        entries.sort_by(|a, b| {
            b.invoice
                .created_at
                .cmp(&a.invoice.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let items = entries
            .into_iter()
            .skip(offset)
            .take(page.limit as usize)
            .map(|e| e.invoice.clone())
            .collect();

        Ok(InvoicePage::new(items, inner.invoices.len() as u64, page))
    }

    async fn upsert_by_number(&self, document: InvoiceDocument, link: NewLink) -> Result<StoredInvoice, StoreError> {
        let now = OffsetDateTime::now_utc();
        let number = document.full_invoice_number();
        let mut inner = self.inner.write().await;

        let existing_id = inner
            .invoices
            .values()
            .filter(|e| e.invoice.document.full_invoice_number() == number)
            .min_by_key(|e| e.seq)
            .map(|e| e.invoice.id.clone());

        match existing_id {
            Some(id) => {
                let Some(entry) = inner.invoices.get_mut(&id) else {
                    return Err(StoreError::Corrupt(format!("invoice {id} vanished during upsert")));
                };
                let old_link = entry.invoice.shareable_link.take().map(|l| l.id);
                entry.invoice.document = document;
                entry.invoice.updated_at = now;
                entry.invoice.shareable_link = Some(link.attach(&id));
                let stored = entry.invoice.clone();

                if let Some(old) = old_link {
                    inner.links.remove(&old);
                }
                if let Some(l) = &stored.shareable_link {
                    inner.links.insert(l.id.clone(), id);
                }
                Ok(stored)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                let stored = StoredInvoice {
                    shareable_link: Some(link.attach(&id)),
                    id,
                    document,
                    created_at: now,
                    updated_at: now,
                };
                inner.push(stored.clone());
                Ok(stored)
            }
        }
    }

    async fn lookup_link(&self, link_id: &str, now: OffsetDateTime) -> Result<LinkLookup, StoreError> {
        let inner = self.inner.read().await;
        let Some(entry) = inner.links.get(link_id).and_then(|id| inner.invoices.get(id)) else {
            return Ok(LinkLookup::NotFound);
        };
        let Some(link) = &entry.invoice.shareable_link else {
            return Ok(LinkLookup::NotFound);
        };
        Ok(match classify_link(link, now) {
            LinkState::Active => LinkLookup::Active(Box::new(entry.invoice.clone())),
            LinkState::Expired => LinkLookup::Expired,
            LinkState::Missing => LinkLookup::NotFound,
        })
    }

    async fn deactivate_link(&self, link_id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(invoice_id) = inner.links.get(link_id).cloned() else {
            return Ok(false);
        };
        let link = inner
            .invoices
            .get_mut(&invoice_id)
            .and_then(|e| e.invoice.shareable_link.as_mut());
        match link {
            Some(l) if l.is_active => {
                l.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
