// Ticket verification state machine
//
//   signature -> inclusion -> proof -> validity window -> copy protection -> count
//
// Steps run in this order and stop at the first failure. Every failure is
// reported as a structured rejection; nothing here returns an error.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::crypto::PublicKey;
use crate::fraud::CopyProtectionGuard;
use crate::merkle::MerkleAccumulator;
use crate::primitives::{Clock, Policy, RejectReason, Result, TicketError};
use crate::ticket::{signing_hash, verify_ticket_signature, Ticket, TicketHandle, TicketRecord, TicketStore};
use crate::zkp::{verify_within, ProofBackend, ProofEnvelope, ProofStatement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(rename = "checkCount")]
    pub check_count: u64,
}

impl VerificationResult {
    pub fn accepted(check_count: u64) -> Self {
        Self { valid: true, reason: None, check_count }
    }

    pub fn rejected(reason: RejectReason) -> Self {
        Self { valid: false, reason: Some(reason), check_count: 0 }
    }
}

/// Step the machine stopped at, for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStep {
    Signature,
    Inclusion,
    Proof,
    ValidityWindow,
    CopyProtection,
}

pub struct Verifier {
    issuer_key: PublicKey,
    store: Arc<dyn TicketStore>,
    accumulator: Arc<RwLock<MerkleAccumulator>>,
    proofs: Arc<dyn ProofBackend>,
    copy_guard: Arc<CopyProtectionGuard>,
    clock: Arc<dyn Clock>,
    proof_timeout: Duration,
}

impl Verifier {
    pub fn new(
        issuer_key: PublicKey,
        store: Arc<dyn TicketStore>,
        accumulator: Arc<RwLock<MerkleAccumulator>>,
        proofs: Arc<dyn ProofBackend>,
        copy_guard: Arc<CopyProtectionGuard>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            issuer_key,
            store,
            accumulator,
            proofs,
            copy_guard,
            clock,
            proof_timeout: Duration::from_millis(Policy::PROOF_TIMEOUT_MS),
        }
    }

    /// Bound on a single proof backend call
    pub fn with_proof_timeout(mut self, proof_timeout: Duration) -> Self {
        self.proof_timeout = proof_timeout;
        self
    }

    pub async fn verify(
        &self,
        ticket: &Ticket,
        proof: Option<&ProofEnvelope>,
        context_id: &str,
    ) -> VerificationResult {
        match self.run(ticket, proof, context_id).await {
            Ok(check_count) => {
                info!(
                    "✅ Ticket {} accepted on {} (check #{})",
                    ticket.ticket_id, context_id, check_count
                );
                VerificationResult::accepted(check_count)
            }
            Err((step, err)) => {
                warn!(
                    "❌ Ticket {} rejected on {} at {:?}: {}",
                    ticket.ticket_id, context_id, step, err
                );
                VerificationResult::rejected(err.reject_reason())
            }
        }
    }

    async fn run(
        &self,
        ticket: &Ticket,
        proof: Option<&ProofEnvelope>,
        context_id: &str,
    ) -> std::result::Result<u64, (VerificationStep, TicketError)> {
        use VerificationStep::*;

        self.check_signature(ticket).map_err(|e| (Signature, e))?;
        let (handle, issued) = self.check_inclusion(ticket).await.map_err(|e| (Inclusion, e))?;
        self.check_proof(ticket, proof, &issued).await.map_err(|e| (Proof, e))?;

        // The record stays locked through the last three steps so the
        // counter and the pinned nullifier move together
        let now = self.clock.now_ms();
        let mut record = handle.lock().await;
        if record.evicted {
            return Err((Inclusion, TicketError::NotFound(format!("ticket {} was evicted", ticket.ticket_id))));
        }
        record.validity.check(now).map_err(|e| (ValidityWindow, e))?;

        if record.nullifier.is_some_and(|pinned| pinned != ticket.nullifier) {
            return Err((CopyProtection, TicketError::CommitmentMismatch));
        }
        self.copy_guard
            .check_copy_protection(&ticket.nullifier, context_id, now)
            .await
            .map_err(|e| (CopyProtection, e))?;

        record.nullifier = Some(ticket.nullifier);
        record.check_count += 1;
        Ok(record.check_count)
    }

    fn check_signature(&self, ticket: &Ticket) -> Result<()> {
        ticket.metadata.validate()?;
        if verify_ticket_signature(
            &self.issuer_key,
            &ticket.metadata,
            &ticket.ticket_id,
            &ticket.commitment,
            &ticket.signature,
        ) {
            Ok(())
        } else {
            Err(TicketError::InvalidSignature)
        }
    }

    /// Returns the record handle and a snapshot of the record as issued
    async fn check_inclusion(&self, ticket: &Ticket) -> Result<(TicketHandle, TicketRecord)> {
        let handle = self
            .store
            .get(&ticket.ticket_id)
            .await?
            .ok_or_else(|| TicketError::NotFound(format!("ticket {}", ticket.ticket_id)))?;

        let issued = handle.lock().await.clone();
        if issued.evicted {
            return Err(TicketError::NotFound(format!("ticket {} was evicted", ticket.ticket_id)));
        }
        if issued.commitment != Some(ticket.commitment) {
            return Err(TicketError::CommitmentMismatch);
        }

        let accumulator = self.accumulator.read().await;

        // Carried proof must replay to a root this accumulator published
        if !accumulator.verify(&ticket.commitment, &ticket.merkle_proof, &ticket.merkle_root)
            || !accumulator.is_known_root(&ticket.merkle_root)
        {
            return Err(TicketError::MerkleRootMismatch);
        }

        // and the commitment must still be a leaf under the current root
        let current_root = accumulator.root().ok_or(TicketError::MerkleRootMismatch)?;
        let index = accumulator
            .leaf_index(&ticket.commitment)
            .ok_or(TicketError::MerkleRootMismatch)?;
        let fresh = accumulator.get_proof(index)?;
        if !accumulator.verify(&ticket.commitment, &fresh, &current_root) {
            return Err(TicketError::MerkleRootMismatch);
        }

        Ok((handle, issued))
    }

    async fn check_proof(&self, ticket: &Ticket, proof: Option<&ProofEnvelope>, issued: &TicketRecord) -> Result<()> {
        let envelope = match proof {
            Some(envelope) => envelope,
            None => return Self::check_rehash(ticket, issued),
        };
        let statement = ProofStatement {
            metadata: ticket.metadata,
            ticket_id: ticket.ticket_id,
            commitment: ticket.commitment,
            nullifier: ticket.nullifier,
        };

        if verify_within(self.proofs.as_ref(), envelope, &statement, self.proof_timeout).await? {
            Ok(())
        } else {
            Err(TicketError::ProofUnavailable(format!(
                "{} proof did not verify",
                self.proofs.name()
            )))
        }
    }

    /// Proofless fallback: the presented tuple must re-hash to the one
    /// issued for this ticket id, and carry the issued validity window
    fn check_rehash(ticket: &Ticket, issued: &TicketRecord) -> Result<()> {
        let commitment = issued.commitment.ok_or(TicketError::CommitmentMismatch)?;
        let presented = signing_hash(&ticket.metadata, &ticket.ticket_id, &ticket.commitment);
        let expected = signing_hash(&issued.metadata, &issued.ticket_id, &commitment);

        if presented != expected || ticket.validity != issued.validity {
            return Err(TicketError::CommitmentMismatch);
        }
        Ok(())
    }
}
