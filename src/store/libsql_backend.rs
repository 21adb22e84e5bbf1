//! libSQL backend for the lead store.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database, params};
use tracing::info;

use crate::error::StoreError;
use crate::store::{LeadRecord, LeadStore};

/// libSQL lead store. Holds a single connection reused for all lookups;
/// `libsql::Connection` is safe for concurrent async use.
pub struct LibSqlLeadStore {
    #[allow(dead_code)]
    db: Arc<Database>,
    conn: Connection,
}

impl LibSqlLeadStore {
    /// Open (or create) a local database file.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("Failed to create store directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open lead database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Lead store opened");
        Ok(store)
    }

    /// Create an in-memory store (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to create in-memory store: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS leads (
                    cod_lead INTEGER PRIMARY KEY,
                    email TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_leads_email ON leads(email);
                "#,
            )
            .await
            .map_err(|e| StoreError::Open(format!("Schema init failed: {e}")))?;
        Ok(())
    }

    /// Insert or replace a lead row. Used by seeding and tests.
    pub async fn insert_lead(&self, cod_lead: i64, email: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO leads (cod_lead, email) VALUES (?1, ?2)",
                params![cod_lead, email],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl LeadStore for LibSqlLeadStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<LeadRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT cod_lead, email FROM leads WHERE email = ?1 LIMIT 1",
                params![email],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let row = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let cod_lead: i64 = row.get(0).map_err(|e| StoreError::Query(e.to_string()))?;
                let email: String = row.get(1).map_err(|e| StoreError::Query(e.to_string()))?;
                Ok(Some(LeadRecord { cod_lead, email }))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_by_email_returns_seeded_lead() {
        let store = LibSqlLeadStore::new_memory().await.unwrap();
        store.insert_lead(101, "alice@example.com").await.unwrap();

        let lead = store.find_by_email("alice@example.com").await.unwrap();
        assert_eq!(
            lead,
            Some(LeadRecord {
                cod_lead: 101,
                email: "alice@example.com".to_string()
            })
        );
    }

    #[tokio::test]
    async fn find_by_email_unmatched_is_none() {
        let store = LibSqlLeadStore::new_memory().await.unwrap();
        store.insert_lead(101, "alice@example.com").await.unwrap();

        let lead = store.find_by_email("unknown@example.com").await.unwrap();
        assert_eq!(lead, None);
    }

    #[tokio::test]
    async fn find_by_email_is_case_sensitive() {
        let store = LibSqlLeadStore::new_memory().await.unwrap();
        store.insert_lead(101, "alice@example.com").await.unwrap();

        let lead = store.find_by_email("Alice@Example.com").await.unwrap();
        assert_eq!(lead, None);
    }

    #[tokio::test]
    async fn insert_lead_replaces_changed_address() {
        let store = LibSqlLeadStore::new_memory().await.unwrap();
        store.insert_lead(101, "old@example.com").await.unwrap();
        store.insert_lead(101, "new@example.com").await.unwrap();

        assert_eq!(store.find_by_email("old@example.com").await.unwrap(), None);
        let lead = store.find_by_email("new@example.com").await.unwrap();
        assert_eq!(lead.map(|l| l.cod_lead), Some(101));
    }
}
