// Nullifier ledger and fraud detector
//
// Every check-in is appended under its nullifier. A check-in is fraudulent
// when an earlier entry for the same nullifier came from a different context
// less than the fraud window away. Entries are never pruned.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::warn;

use crate::primitives::{FieldElement, Policy, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckLogEntry {
    pub timestamp: Timestamp,
    /// Verifying context, e.g. a train number
    pub context_id: String,
    pub segment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FraudCheck {
    pub fraud: bool,
    /// Earlier entry that conflicts with the new one
    pub conflict: Option<CheckLogEntry>,
}

pub struct NullifierLedger {
    window_ms: i64,
    entries: Mutex<HashMap<FieldElement, Vec<CheckLogEntry>>>,
}

impl Default for NullifierLedger {
    fn default() -> Self {
        Self::new(Policy::FRAUD_WINDOW_MS)
    }
}

impl NullifierLedger {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    fn scan(&self, history: &[CheckLogEntry], entry: &CheckLogEntry) -> FraudCheck {
        let conflict = history
            .iter()
            .find(|prior| {
                prior.context_id != entry.context_id
                    && (entry.timestamp - prior.timestamp).abs() < self.window_ms
            })
            .cloned();

        FraudCheck { fraud: conflict.is_some(), conflict }
    }

    /// Scan without recording
    pub async fn check_fraud(&self, nullifier: &FieldElement, entry: &CheckLogEntry) -> FraudCheck {
        let entries = self.entries.lock().await;
        match entries.get(nullifier) {
            Some(history) => self.scan(history, entry),
            None => FraudCheck { fraud: false, conflict: None },
        }
    }

    /// Scan and append as one step, so concurrent check-ins on the same
    /// nullifier always see each other
    pub async fn record(&self, nullifier: FieldElement, entry: CheckLogEntry) -> FraudCheck {
        let mut entries = self.entries.lock().await;
        let history = entries.entry(nullifier).or_default();
        let result = self.scan(history, &entry);

        if let Some(conflict) = &result.conflict {
            warn!(
                "🚨 Parallel use of nullifier {}: {} at {} vs {} at {}",
                nullifier, entry.context_id, entry.timestamp, conflict.context_id, conflict.timestamp
            );
        }

        history.push(entry);
        result
    }

    pub async fn history(&self, nullifier: &FieldElement) -> Vec<CheckLogEntry> {
        self.entries.lock().await.get(nullifier).cloned().unwrap_or_default()
    }

    /// Total number of logged check-ins
    pub async fn len(&self) -> usize {
        self.entries.lock().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
