//! Sender-address resolution against the lead store.

use std::sync::Arc;

use crate::error::StoreError;
use crate::store::{LeadRecord, LeadStore};

/// Resolves a sender address to its lead record, one lookup per message.
pub struct LeadResolver {
    store: Arc<dyn LeadStore>,
}

impl LeadResolver {
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self { store }
    }

    /// Resolve a sender to a lead.
    ///
    /// `Ok(None)` — no matching lead; the message is silently dropped.
    /// `Err(_)` — the store was unreachable; retryable per-message
    /// failure, never fatal to the watch loop.
    pub async fn resolve(&self, sender: &str) -> Result<Option<LeadRecord>, StoreError> {
        self.store.find_by_email(sender).await
    }
}
