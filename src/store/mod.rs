//! Lead record store — single-row lookups against libSQL.

mod libsql_backend;

pub use libsql_backend::LibSqlLeadStore;

use async_trait::async_trait;

use crate::error::StoreError;

/// An internal lead record, keyed by the address it was resolved from.
///
/// Ephemeral: looked up per message and never cached across messages —
/// the store is the single source of truth for address changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadRecord {
    pub cod_lead: i64,
    pub email: String,
}

/// Backend-agnostic lead lookup.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Point lookup by exact (case-sensitive, as received) address match.
    ///
    /// `Ok(None)` means no matching lead — normal flow, not an error.
    async fn find_by_email(&self, email: &str) -> Result<Option<LeadRecord>, StoreError>;
}
