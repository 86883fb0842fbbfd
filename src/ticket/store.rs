// Ticket record store
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::primitives::{FieldElement, Result, TicketError, TicketMetadata, ValidityWindow};

/// Server-side state for one ticket id, from allocation to eviction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub ticket_id: FieldElement,
    pub metadata: TicketMetadata,
    pub validity: ValidityWindow,
    /// Set at issuance
    pub commitment: Option<FieldElement>,
    pub leaf_index: Option<usize>,
    /// Pinned at the first accepted verification
    pub nullifier: Option<FieldElement>,
    pub check_count: u64,
    /// Set under the record lock once the record leaves the store
    #[serde(default)]
    pub evicted: bool,
}

impl TicketRecord {
    pub fn allocated(ticket_id: FieldElement, metadata: TicketMetadata, validity: ValidityWindow) -> Self {
        Self {
            ticket_id,
            metadata,
            validity,
            commitment: None,
            leaf_index: None,
            nullifier: None,
            check_count: 0,
            evicted: false,
        }
    }

    pub fn is_issued(&self) -> bool {
        self.commitment.is_some()
    }
}

/// Per-ticket lock; every read-modify-write of a record goes through it
pub type TicketHandle = Arc<Mutex<TicketRecord>>;

#[async_trait::async_trait]
pub trait TicketStore: Send + Sync {
    /// Insert a new record; fails if the ticket id is already present
    async fn insert(&self, record: TicketRecord) -> Result<TicketHandle>;

    async fn get(&self, ticket_id: &FieldElement) -> Result<Option<TicketHandle>>;

    /// Remove a record, mark it evicted for holders of its handle and
    /// return its last state
    async fn evict(&self, ticket_id: &FieldElement) -> Result<Option<TicketRecord>>;

    async fn len(&self) -> Result<usize>;
}

/// In-memory store for a single service process
#[derive(Default)]
pub struct InMemoryTicketStore {
    records: RwLock<HashMap<FieldElement, TicketHandle>>,
}

impl InMemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn insert(&self, record: TicketRecord) -> Result<TicketHandle> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.ticket_id) {
            return Err(TicketError::Validation(format!(
                "ticket {} already exists",
                record.ticket_id
            )));
        }

        let ticket_id = record.ticket_id;
        let handle = Arc::new(Mutex::new(record));
        records.insert(ticket_id, handle.clone());
        Ok(handle)
    }

    async fn get(&self, ticket_id: &FieldElement) -> Result<Option<TicketHandle>> {
        Ok(self.records.read().await.get(ticket_id).cloned())
    }

    async fn evict(&self, ticket_id: &FieldElement) -> Result<Option<TicketRecord>> {
        let removed = self.records.write().await.remove(ticket_id);
        match removed {
            Some(handle) => {
                let mut record = handle.lock().await;
                record.evicted = true;
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}
