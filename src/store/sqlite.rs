use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    classify_link, DocumentStore, InvoicePage, LinkLookup, LinkState, NewLink, PageRequest, ShareableLink,
    StoredInvoice,
};
use crate::document::InvoiceDocument;
use crate::error::StoreError;

const SCHEMA_VERSION: i64 = 1;

const SELECT_COLUMNS: &str = "id, data_json, createdAt, updatedAt, linkId, linkPasswordHash, linkIsActive, linkCreatedAt, linkExpiresAt";

fn configure_sqlite(conn: &Connection) -> Result<(), rusqlite::Error> {
    // Apply PRAGMAs on open (outside any transaction).
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA foreign_keys = ON;\n\
         PRAGMA temp_store = MEMORY;\n\
         PRAGMA busy_timeout = 5000;\n",
    )?;
    conn.busy_timeout(Duration::from_millis(5000))?;
    Ok(())
}

fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS invoices (
            id TEXT PRIMARY KEY NOT NULL,
            invoiceNumber TEXT NOT NULL,
            data_json TEXT NOT NULL,
            createdAt INTEGER NOT NULL,
            updatedAt INTEGER NOT NULL,
            linkId TEXT UNIQUE,
            linkPasswordHash TEXT,
            linkIsActive INTEGER,
            linkCreatedAt INTEGER,
            linkExpiresAt INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_invoices_number ON invoices(invoiceNumber);
        CREATE INDEX IF NOT EXISTS idx_invoices_created ON invoices(createdAt);
        "#,
    )
}

/// Returns the schema version found before migrating.
fn apply_migrations(conn: &Connection) -> Result<i64, rusqlite::Error> {
    let v: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    // v=0 is a fresh DB (init_schema created the latest tables).
    if v == 0 {
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
    }
    Ok(v)
}

fn to_nanos(t: OffsetDateTime) -> i64 {
    i64::try_from(t.unix_timestamp_nanos()).unwrap_or(i64::MAX)
}

fn from_nanos(n: i64) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(n))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {n}: {e}")))
}

/// One `invoices` row as stored, before the JSON and timestamps are decoded.
struct InvoiceRow {
    id: String,
    data_json: String,
    created_at: i64,
    updated_at: i64,
    link_id: Option<String>,
    link_password_hash: Option<String>,
    link_is_active: Option<bool>,
    link_created_at: Option<i64>,
    link_expires_at: Option<i64>,
}

fn read_row(r: &rusqlite::Row<'_>) -> Result<InvoiceRow, rusqlite::Error> {
    Ok(InvoiceRow {
        id: r.get(0)?,
        data_json: r.get(1)?,
        created_at: r.get(2)?,
        updated_at: r.get(3)?,
        link_id: r.get(4)?,
        link_password_hash: r.get(5)?,
        link_is_active: r.get(6)?,
        link_created_at: r.get(7)?,
        link_expires_at: r.get(8)?,
    })
}

fn select_by(conn: &Connection, clause: &str, key: &str) -> Result<Option<InvoiceRow>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM invoices WHERE {clause}"),
        params![key],
        read_row,
    )
    .optional()
}

impl InvoiceRow {
    fn link(&self) -> Result<Option<ShareableLink>, StoreError> {
        let Some(link_id) = &self.link_id else {
            return Ok(None);
        };
        let (Some(created), Some(expires)) = (self.link_created_at, self.link_expires_at) else {
            return Err(StoreError::Corrupt(format!("link {link_id} has no timestamps")));
        };
        Ok(Some(ShareableLink {
            id: link_id.clone(),
            invoice_id: self.id.clone(),
            password_hash: self.link_password_hash.clone(),
            is_active: self.link_is_active.unwrap_or(false),
            created_at: from_nanos(created)?,
            expires_at: from_nanos(expires)?,
        }))
    }

    fn into_stored(self) -> Result<StoredInvoice, StoreError> {
        let document: InvoiceDocument = serde_json::from_str(&self.data_json).map_err(|e| {
            tracing::error!(invoice_id = %self.id, error = %e, "stored invoice json does not parse");
            StoreError::Serialization(e)
        })?;
        let shareable_link = self.link()?;
        Ok(StoredInvoice {
            id: self.id,
            document,
            created_at: from_nanos(self.created_at)?,
            updated_at: from_nanos(self.updated_at)?,
            shareable_link,
        })
    }
}

fn encode(document: &InvoiceDocument) -> Result<String, StoreError> {
    serde_json::to_string(document).map_err(StoreError::Serialization)
}

/// SQLite-backed store. One connection; reads and writes run on the blocking pool and
/// writers are serialized by `write_lock`.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Corrupt(format!("cannot create {}: {e}", parent.display())))?;
        }

        let conn = Connection::open(path).map_err(|e| StoreError::sqlite("open", &e))?;
        configure_sqlite(&conn).map_err(|e| StoreError::sqlite("configure", &e))?;
        init_schema(&conn).map_err(|e| StoreError::sqlite("init_schema", &e))?;
        let found = apply_migrations(&conn).map_err(|e| StoreError::sqlite("migrate", &e))?;
        if found > SCHEMA_VERSION {
            return Err(StoreError::Corrupt(format!(
                "database schema v{found} is newer than supported v{SCHEMA_VERSION}"
            )));
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    async fn with_read<T, F>(&self, op_name: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| StoreError::Poisoned("db"))?;
            f(&guard).map_err(|e| {
                let err = StoreError::sqlite(op_name, &e);
                tracing::warn!(op = op_name, error = %err, "sqlite read failed");
                err
            })
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    async fn with_write<T, F>(&self, op_name: &'static str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = self.conn.clone();
        let write_lock = self.write_lock.clone();
        tokio::task::spawn_blocking(move || {
            let _wg = write_lock.lock().map_err(|_| StoreError::Poisoned("write"))?;
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned("db"))?;
            f(&mut guard).map_err(|e| {
                let err = StoreError::sqlite(op_name, &e);
                tracing::warn!(op = op_name, error = %err, "sqlite write failed");
                err
            })
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert(&self, document: InvoiceDocument) -> Result<StoredInvoice, StoreError> {
        let now = OffsetDateTime::now_utc();
        let json = encode(&document)?;
        let stored = StoredInvoice {
            id: Uuid::new_v4().to_string(),
            document,
            created_at: now,
            updated_at: now,
            shareable_link: None,
        };

        let id = stored.id.clone();
        let number = stored.document.full_invoice_number();
        self.with_write("insert_invoice", move |conn| {
            conn.execute(
                "INSERT INTO invoices (id, invoiceNumber, data_json, createdAt, updatedAt) VALUES (?1, ?2, ?3, ?4, ?4)",
                params![id, number, json, to_nanos(now)],
            )?;
            Ok(())
        })
        .await?;
        Ok(stored)
    }

    async fn get(&self, id: &str) -> Result<Option<StoredInvoice>, StoreError> {
        let id = id.to_string();
        let row = self
            .with_read("get_invoice", move |conn| select_by(conn, "id = ?1", &id))
            .await?;
        row.map(InvoiceRow::into_stored).transpose()
    }

    async fn update(&self, id: &str, document: InvoiceDocument) -> Result<Option<StoredInvoice>, StoreError> {
        let now = to_nanos(OffsetDateTime::now_utc());
        let json = encode(&document)?;
        let number = document.full_invoice_number();
        let id = id.to_string();

        let row = self
            .with_write("update_invoice", move |conn| {
                let changed = conn.execute(
                    "UPDATE invoices SET invoiceNumber = ?2, data_json = ?3, updatedAt = ?4 WHERE id = ?1",
                    params![id, number, json, now],
                )?;
                if changed == 0 {
                    return Ok(None);
                }
                select_by(conn, "id = ?1", &id)
            })
            .await?;
        row.map(InvoiceRow::into_stored).transpose()
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.with_write("delete_invoice", move |conn| {
            let n = conn.execute("DELETE FROM invoices WHERE id = ?1", params![id])?;
            Ok(n > 0)
        })
        .await
    }

    async fn list(&self, page: PageRequest) -> Result<InvoicePage, StoreError> {
        let limit = i64::from(page.limit);
        let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);

        let (total, rows) = self
            .with_read("list_invoices", move |conn| {
                let total: i64 = conn.query_row("SELECT COUNT(1) FROM invoices", [], |r| r.get(0))?;
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SELECT_COLUMNS} FROM invoices ORDER BY createdAt DESC, rowid DESC LIMIT ?1 OFFSET ?2"
                ))?;
                let rows = stmt
                    .query_map(params![limit, offset], read_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((total, rows))
            })
            .await?;

        let items = rows
            .into_iter()
            .map(InvoiceRow::into_stored)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(InvoicePage::new(items, u64::try_from(total).unwrap_or(0), page))
    }

    async fn upsert_by_number(&self, document: InvoiceDocument, link: NewLink) -> Result<StoredInvoice, StoreError> {
        let now = to_nanos(OffsetDateTime::now_utc());
        let json = encode(&document)?;
        let number = document.full_invoice_number();
        let fresh_id = Uuid::new_v4().to_string();

        let row = self
            .with_write("upsert_invoice", move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let existing: Option<String> = tx
                    .query_row(
                        "SELECT id FROM invoices WHERE invoiceNumber = ?1 ORDER BY createdAt ASC, rowid ASC LIMIT 1",
                        params![number],
                        |r| r.get(0),
                    )
                    .optional()?;

                let id = match existing {
                    Some(id) => {
                        tx.execute(
                            r#"UPDATE invoices SET data_json = ?2, updatedAt = ?3,
                                   linkId = ?4, linkPasswordHash = ?5, linkIsActive = 1,
                                   linkCreatedAt = ?6, linkExpiresAt = ?7
                               WHERE id = ?1"#,
                            params![
                                id,
                                json,
                                now,
                                link.id,
                                link.password_hash,
                                to_nanos(link.created_at),
                                to_nanos(link.expires_at),
                            ],
                        )?;
                        id
                    }
                    None => {
                        tx.execute(
                            r#"INSERT INTO invoices (
                                   id, invoiceNumber, data_json, createdAt, updatedAt,
                                   linkId, linkPasswordHash, linkIsActive, linkCreatedAt, linkExpiresAt
                               ) VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, 1, ?7, ?8)"#,
                            params![
                                fresh_id,
                                number,
                                json,
                                now,
                                link.id,
                                link.password_hash,
                                to_nanos(link.created_at),
                                to_nanos(link.expires_at),
                            ],
                        )?;
                        fresh_id
                    }
                };

                let row = select_by(&tx, "id = ?1", &id)?;
                tx.commit()?;
                Ok(row)
            })
            .await?;

        match row {
            Some(r) => r.into_stored(),
            None => Err(StoreError::Corrupt("upserted invoice not readable".into())),
        }
    }

    async fn lookup_link(&self, link_id: &str, now: OffsetDateTime) -> Result<LinkLookup, StoreError> {
        let link_id = link_id.to_string();
        let row = self
            .with_read("lookup_link", move |conn| select_by(conn, "linkId = ?1", &link_id))
            .await?;
        let Some(row) = row else {
            return Ok(LinkLookup::NotFound);
        };

        let stored = row.into_stored()?;
        let state = match &stored.shareable_link {
            Some(link) => classify_link(link, now),
            None => LinkState::Missing,
        };
        Ok(match state {
            LinkState::Active => LinkLookup::Active(Box::new(stored)),
            LinkState::Expired => LinkLookup::Expired,
            LinkState::Missing => LinkLookup::NotFound,
        })
    }

    async fn deactivate_link(&self, link_id: &str) -> Result<bool, StoreError> {
        let link_id = link_id.to_string();
        self.with_write("deactivate_link", move |conn| {
            let n = conn.execute(
                "UPDATE invoices SET linkIsActive = 0 WHERE linkId = ?1 AND linkIsActive = 1",
                params![link_id],
            )?;
            Ok(n > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_document;
    use time::Duration as TimeDuration;

    fn open_temp() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("invoices.db")).unwrap();
        (dir, store)
    }

    fn new_link(id: &str, expires_in: TimeDuration) -> NewLink {
        let now = OffsetDateTime::now_utc();
        NewLink {
            id: id.to_string(),
            password_hash: Some("$argon2id$v=19$stub".into()),
            created_at: now,
            expires_at: now + expires_in,
        }
    }

    #[tokio::test]
    async fn documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("invoices.db");
        let stored = {
            let store = SqliteStore::open(&path).unwrap();
            store.insert(sample_document()).await.unwrap()
        };

        let reopened = SqliteStore::open(&path).unwrap();
        let got = reopened.get(&stored.id).await.unwrap().unwrap();
        assert_eq!(got.document, stored.document);
        assert_eq!(got.created_at, stored.created_at);
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_rows() {
        let (_dir, store) = open_temp();
        assert!(store.update("missing", sample_document()).await.unwrap().is_none());
        assert!(!store.delete("missing").await.unwrap());

        let stored = store.insert(sample_document()).await.unwrap();
        let mut doc = sample_document();
        doc.notes.content = "Updated".into();
        let updated = store.update(&stored.id, doc).await.unwrap().unwrap();
        assert_eq!(updated.document.notes.content, "Updated");
        assert!(store.delete(&stored.id).await.unwrap());
    }

    #[tokio::test]
    async fn list_pages_newest_first() {
        let (_dir, store) = open_temp();
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(store.insert(sample_document()).await.unwrap().id);
        }
        let page = store.list(PageRequest::new(1, 2)).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.pages, 2);
        assert_eq!(page.items[0].id, ids[2]);
        assert_eq!(page.items[1].id, ids[1]);
        let rest = store.list(PageRequest::new(2, 2)).await.unwrap();
        assert_eq!(rest.items.len(), 1);
        assert_eq!(rest.items[0].id, ids[0]);
    }

    #[tokio::test]
    async fn link_lifecycle() {
        let (_dir, store) = open_temp();
        let id = "ab".repeat(16);
        let stored = store
            .upsert_by_number(sample_document(), new_link(&id, TimeDuration::days(30)))
            .await
            .unwrap();
        let link = stored.shareable_link.clone().unwrap();
        assert!(link.is_active);
        assert!(link.has_password());
        assert_eq!(link.invoice_id, stored.id);

        let now = OffsetDateTime::now_utc();
        match store.lookup_link(&id, now).await.unwrap() {
            LinkLookup::Active(found) => assert_eq!(found.id, stored.id),
            other => panic!("expected active link, got {other:?}"),
        }
        assert_eq!(
            store.lookup_link(&id, now + TimeDuration::days(31)).await.unwrap(),
            LinkLookup::Expired
        );

        assert!(store.deactivate_link(&id).await.unwrap());
        assert_eq!(store.lookup_link(&id, now).await.unwrap(), LinkLookup::NotFound);
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_number() {
        let (_dir, store) = open_temp();
        let a = store
            .upsert_by_number(sample_document(), new_link(&"a".repeat(32), TimeDuration::days(1)))
            .await
            .unwrap();
        let b = store
            .upsert_by_number(sample_document(), new_link(&"b".repeat(32), TimeDuration::days(1)))
            .await
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.list(PageRequest::default()).await.unwrap().total, 1);
        assert_eq!(
            store.lookup_link(&"a".repeat(32), OffsetDateTime::now_utc()).await.unwrap(),
            LinkLookup::NotFound
        );
    }

    #[tokio::test]
    async fn corrupt_json_is_a_serialization_error() {
        let (_dir, store) = open_temp();
        let stored = store.insert(sample_document()).await.unwrap();
        let id = stored.id.clone();
        store
            .with_write("corrupt", move |conn| {
                conn.execute("UPDATE invoices SET data_json = '{' WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await
            .unwrap();
        assert!(matches!(
            store.get(&stored.id).await,
            Err(StoreError::Serialization(_))
        ));
    }
}
