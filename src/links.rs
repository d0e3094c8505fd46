use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
};
use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::config::{LinkConfig, MIN_HASH_TIME_COST};
use crate::crypto::random_hex_id;
use crate::document::InvoiceDocument;
use crate::error::{FieldError, LinkError};
use crate::store::{DocumentStore, LinkLookup, NewLink, StoredInvoice};
use crate::validate::check_persistable;

/// 16 random bytes, 32 hex chars.
const LINK_ID_BYTES: usize = 16;
pub const MAX_EXPIRY_DAYS: i64 = 365;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkCreated {
    pub link_id: String,
    pub shareable_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub has_password: bool,
}

fn normalized_password(password: Option<&str>) -> Option<&str> {
    password.map(str::trim).filter(|p| !p.is_empty())
}

/// Creates, resolves and checks shareable links. Passwords only ever exist here as
/// arguments; the store sees the Argon2id hash.
#[derive(Clone)]
pub struct ShareableLinkService {
    store: Arc<dyn DocumentStore>,
    cfg: LinkConfig,
}

impl ShareableLinkService {
    pub fn new(store: Arc<dyn DocumentStore>, cfg: LinkConfig) -> Self {
        Self { store, cfg }
    }

    fn hasher(&self) -> Result<Argon2<'static>, LinkError> {
        let params = Params::new(
            self.cfg.hash_memory_kib,
            self.cfg.hash_time_cost.max(MIN_HASH_TIME_COST),
            self.cfg.hash_parallelism.max(1),
            None,
        )
        .map_err(|e| LinkError::Hash(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    async fn hash_password(&self, password: &str) -> Result<String, LinkError> {
        let argon2 = self.hasher()?;
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(password.as_bytes(), &salt)
                .map(|h| h.to_string())
                .map_err(|e| LinkError::Hash(e.to_string()))
        })
        .await
        .map_err(|e| LinkError::Hash(e.to_string()))?
    }

    /// Stores `document` under its invoice number and attaches a fresh link.
    ///
    /// A blank password means no password. `expiry_days` defaults to the configured value
    /// and must lie in `1..=365`.
    pub async fn create(
        &self,
        document: InvoiceDocument,
        password: Option<&str>,
        expiry_days: Option<i64>,
        now: OffsetDateTime,
    ) -> Result<LinkCreated, LinkError> {
        check_persistable(&document).map_err(LinkError::InvalidDocument)?;

        let days = expiry_days.unwrap_or(self.cfg.default_expiry_days);
        if !(1..=MAX_EXPIRY_DAYS).contains(&days) {
            return Err(LinkError::InvalidDocument(vec![FieldError::new(
                "expiryDays",
                format!("Expiry must be between 1 and {MAX_EXPIRY_DAYS} days"),
            )]));
        }

        let password_hash = match normalized_password(password) {
            Some(p) => Some(self.hash_password(p).await?),
            None => None,
        };
        let has_password = password_hash.is_some();

        let link = NewLink {
            id: random_hex_id(LINK_ID_BYTES),
            password_hash,
            created_at: now,
            expires_at: now + Duration::days(days),
        };
        let link_id = link.id.clone();
        let expires_at = link.expires_at;

        let stored = self.store.upsert_by_number(document, link).await?;
        tracing::info!(
            link_id = %link_id,
            invoice_id = %stored.id,
            has_password,
            expiry_days = days,
            "shareable link created"
        );

        Ok(LinkCreated {
            shareable_url: format!("{}/shared/{}", self.cfg.base_url, link_id),
            link_id,
            expires_at,
            has_password,
        })
    }

    /// The invoice behind an active, unexpired link.
    pub async fn resolve(&self, link_id: &str, now: OffsetDateTime) -> Result<StoredInvoice, LinkError> {
        match self.store.lookup_link(link_id, now).await? {
            LinkLookup::Active(stored) => Ok(*stored),
            LinkLookup::Expired => {
                tracing::info!(link_id, "shareable link expired");
                Err(LinkError::Expired)
            }
            LinkLookup::NotFound => {
                tracing::info!(link_id, "shareable link not found");
                Err(LinkError::NotFound)
            }
        }
    }

    /// Checks `password` against the link. Links without a password accept anything.
    pub async fn verify(&self, link_id: &str, password: Option<&str>, now: OffsetDateTime) -> Result<bool, LinkError> {
        let stored = self.resolve(link_id, now).await?;
        Ok(self.password_matches(&stored, password).await)
    }

    async fn password_matches(&self, stored: &StoredInvoice, password: Option<&str>) -> bool {
        let Some(hash) = stored.shareable_link.as_ref().and_then(|l| l.password_hash.clone()) else {
            return true;
        };
        let Some(password) = normalized_password(password).map(str::to_string) else {
            return false;
        };

        let checked = tokio::task::spawn_blocking(move || match PasswordHash::new(&hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::error!(error = %e, "stored link password hash does not parse");
                false
            }
        })
        .await;

        checked.unwrap_or_else(|e| {
            tracing::error!(error = %e, "password verification worker failed");
            false
        })
    }

    /// Resolve and verify in one go; a wrong password is [`LinkError::Unauthorized`].
    pub async fn open(
        &self,
        link_id: &str,
        password: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<StoredInvoice, LinkError> {
        let stored = self.resolve(link_id, now).await?;
        if !self.password_matches(&stored, password).await {
            tracing::info!(link_id, "shareable link password rejected");
            return Err(LinkError::Unauthorized);
        }
        Ok(stored)
    }

    pub async fn deactivate(&self, link_id: &str) -> Result<bool, LinkError> {
        let changed = self.store.deactivate_link(link_id).await?;
        tracing::info!(link_id, changed, "shareable link deactivated");
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_support::sample_document;
    use time::macros::datetime;

    fn service() -> ShareableLinkService {
        let cfg = LinkConfig {
            base_url: "https://inv.example".into(),
            hash_memory_kib: 64,
            ..LinkConfig::default()
        };
        ShareableLinkService::new(Arc::new(MemoryStore::new()), cfg)
    }

    #[tokio::test]
    async fn create_builds_url_and_default_expiry() {
        let svc = service();
        let now = OffsetDateTime::now_utc();
        let created = svc.create(sample_document(), None, None, now).await.unwrap();

        assert_eq!(created.link_id.len(), 32);
        assert!(created.link_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(created.shareable_url, format!("https://inv.example/shared/{}", created.link_id));
        assert_eq!(created.expires_at, now + Duration::days(30));
        assert!(!created.has_password);
        assert!(svc.verify(&created.link_id, None, now).await.unwrap());
    }

    #[tokio::test]
    async fn password_protects_the_link() {
        let svc = service();
        let now = OffsetDateTime::now_utc();
        let created = svc
            .create(sample_document(), Some(" hunter2 "), Some(7), now)
            .await
            .unwrap();
        assert!(created.has_password);

        let stored = svc.resolve(&created.link_id, now).await.unwrap();
        let hash = stored.shareable_link.unwrap().password_hash.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("hunter2"));

        assert!(svc.verify(&created.link_id, Some("hunter2"), now).await.unwrap());
        assert!(!svc.verify(&created.link_id, Some("wrong"), now).await.unwrap());
        assert!(!svc.verify(&created.link_id, None, now).await.unwrap());
        assert!(matches!(
            svc.open(&created.link_id, Some("wrong"), now).await,
            Err(LinkError::Unauthorized)
        ));
        assert!(svc.open(&created.link_id, Some("hunter2"), now).await.is_ok());
    }

    #[tokio::test]
    async fn blank_password_means_none() {
        let svc = service();
        let created = svc
            .create(sample_document(), Some("   "), None, OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert!(!created.has_password);
    }

    #[tokio::test]
    async fn expired_and_deactivated_links() {
        let svc = service();
        let now = datetime!(2024-03-01 12:00 UTC);
        let created = svc.create(sample_document(), None, Some(7), now).await.unwrap();

        let later = now + Duration::days(8);
        assert!(matches!(svc.resolve(&created.link_id, later).await, Err(LinkError::Expired)));
        assert!(matches!(svc.verify(&created.link_id, None, later).await, Err(LinkError::Expired)));

        assert!(svc.deactivate(&created.link_id).await.unwrap());
        assert!(matches!(svc.resolve(&created.link_id, now).await, Err(LinkError::NotFound)));
        assert!(matches!(svc.resolve("0".repeat(32).as_str(), now).await, Err(LinkError::NotFound)));
    }

    #[tokio::test]
    async fn rejects_unpersistable_documents_and_bad_expiry() {
        let svc = service();
        let now = OffsetDateTime::now_utc();

        let mut doc = sample_document();
        doc.general.due_date = doc.general.issue_date - Duration::days(1);
        match svc.create(doc, None, None, now).await {
            Err(LinkError::InvalidDocument(errors)) => assert_eq!(errors[0].field, "general.dueDate"),
            other => panic!("expected invalid document, got {other:?}"),
        }

        assert!(matches!(
            svc.create(sample_document(), None, Some(0), now).await,
            Err(LinkError::InvalidDocument(_))
        ));
        assert!(matches!(
            svc.create(sample_document(), None, Some(366), now).await,
            Err(LinkError::InvalidDocument(_))
        ));
    }
}
