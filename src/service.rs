// Ticket service: allocation, issuance, verification and check-in
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::{ProofMode, ServiceConfig};
use crate::crypto::PublicKey;
use crate::fraud::{CheckLogEntry, CopyProtectionGuard, NullifierLedger, SweeperHandle};
use crate::merkle::{MerkleAccumulator, MerkleProof};
use crate::primitives::{Clock, FieldElement, Result, TicketError, TicketMetadata, ValidityWindow};
use crate::ticket::{
    verify_ticket_signature, AllocatedTicket, CheckInRequest, CheckInResponse, CommitmentScheme,
    InMemoryTicketStore, IssuanceRequest, IssuanceResponse, Issuer, PublicInputs, Ticket, TicketHandle,
    TicketRecord, TicketStore,
};
use crate::verifier::{VerificationResult, Verifier};
use crate::zkp::{
    verify_within, CircuitKeys, Groth16Backend, ProofBackend, ProofEnvelope, ProofStatement, ProofSystem,
    SimplifiedBackend,
};

/// Attempts at drawing an unused ticket id before giving up
const ALLOCATION_ATTEMPTS: usize = 4;

pub struct TicketService {
    config: ServiceConfig,
    issuer: Issuer,
    scheme: CommitmentScheme,
    store: Arc<dyn TicketStore>,
    accumulator: Arc<RwLock<MerkleAccumulator>>,
    ledger: Arc<NullifierLedger>,
    copy_guard: Arc<CopyProtectionGuard>,
    proofs: Arc<dyn ProofBackend>,
    verifier: Verifier,
    clock: Arc<dyn Clock>,
    _sweeper: Option<SweeperHandle>,
}

impl TicketService {
    /// Build the proof system named by the config, then the service
    pub async fn new(config: ServiceConfig, issuer: Issuer, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let proofs = match config.proof_mode {
            ProofMode::Simplified => ProofSystem::Simplified(SimplifiedBackend::new(config.nullifier_salt)),
            ProofMode::Groth16 => {
                let dir = config
                    .circuit_keys_dir
                    .as_ref()
                    .ok_or_else(|| TicketError::Config("groth16 proof mode needs circuit_keys_dir".to_string()))?;
                let keys = CircuitKeys::load(dir, true).await?;
                if keys.salt != config.nullifier_salt {
                    return Err(TicketError::Config(
                        "circuit keys were generated for a different nullifier salt".to_string(),
                    ));
                }
                ProofSystem::Real(Groth16Backend::new(keys, Duration::from_millis(config.proof_timeout_ms))?)
            }
        };

        Self::with_proof_backend(config, issuer, Arc::new(proofs), clock)
    }

    /// Wire the service around an existing proof backend
    pub fn with_proof_backend(
        config: ServiceConfig,
        issuer: Issuer,
        proofs: Arc<dyn ProofBackend>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn TicketStore> = Arc::new(InMemoryTicketStore::new());
        let accumulator = Arc::new(RwLock::new(MerkleAccumulator::new(config.tree_depth)?));
        let ledger = Arc::new(NullifierLedger::new(config.fraud_window_ms));
        let copy_guard = Arc::new(CopyProtectionGuard::new(
            config.copy_protection_ttl_ms,
            config.copy_conflict_threshold,
        ));

        // The sweep is an optimisation over lazy eviction; skip it outside a runtime
        let sweeper = if config.copy_sweep_interval_ms > 0 && tokio::runtime::Handle::try_current().is_ok() {
            Some(copy_guard.spawn_sweeper(Duration::from_millis(config.copy_sweep_interval_ms), clock.clone()))
        } else {
            None
        };

        let verifier = Verifier::new(
            issuer.public_key(),
            store.clone(),
            accumulator.clone(),
            proofs.clone(),
            copy_guard.clone(),
            clock.clone(),
        )
        .with_proof_timeout(Duration::from_millis(config.proof_timeout_ms));

        info!(
            "🚉 Ticket service ready: depth {}, proofs {}, fraud window {} ms, copy TTL {} ms",
            config.tree_depth,
            proofs.name(),
            config.fraud_window_ms,
            config.copy_protection_ttl_ms
        );

        Ok(Self {
            scheme: CommitmentScheme::new(config.nullifier_salt),
            config,
            issuer,
            store,
            accumulator,
            ledger,
            copy_guard,
            proofs,
            verifier,
            clock,
            _sweeper: sweeper,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn issuer_key(&self) -> PublicKey {
        self.issuer.public_key()
    }

    /// Scheme riders must use to derive C and N for this service
    pub fn commitment_scheme(&self) -> CommitmentScheme {
        self.scheme
    }

    pub fn proof_backend(&self) -> Arc<dyn ProofBackend> {
        self.proofs.clone()
    }

    pub fn ledger(&self) -> &NullifierLedger {
        &self.ledger
    }

    pub fn copy_guard(&self) -> &CopyProtectionGuard {
        &self.copy_guard
    }

    /// Reserve a fresh ticket id and compute its validity window.
    /// The departure must be on the ticket's date.
    pub async fn allocate_ticket(&self, metadata: TicketMetadata, departure: DateTime<Utc>) -> Result<AllocatedTicket> {
        metadata.validate()?;
        metadata.check_departure(departure)?;
        let validity = ValidityWindow::for_product(departure, metadata.product_type);

        for _ in 0..ALLOCATION_ATTEMPTS {
            let ticket_id = FieldElement::from_u128(rand::thread_rng().gen::<u128>());
            match self.store.insert(TicketRecord::allocated(ticket_id, metadata, validity)).await {
                Ok(_) => {
                    info!("🎟️  Allocated ticket {} ({} → {})", ticket_id, metadata.origin, metadata.destination);
                    return Ok(AllocatedTicket { ticket_id, metadata, validity });
                }
                Err(TicketError::Validation(_)) => continue,
                Err(other) => return Err(other),
            }
        }

        Err(TicketError::Storage("could not draw an unused ticket id".to_string()))
    }

    /// Sign `(metadata, ticket_id, C)`, append C and return the inclusion proof
    pub async fn issue_ticket(&self, request: IssuanceRequest) -> Result<IssuanceResponse> {
        request.metadata.validate()?;

        let handle = self
            .store
            .get(&request.ticket_id)
            .await?
            .ok_or_else(|| TicketError::NotFound(format!("ticket {} was never allocated", request.ticket_id)))?;
        let mut record = handle.lock().await;

        if record.is_issued() {
            return Err(TicketError::Validation(format!("ticket {} already issued", request.ticket_id)));
        }
        if record.metadata != request.metadata {
            return Err(TicketError::Validation(
                "metadata differs from the allocated ticket".to_string(),
            ));
        }

        let mut accumulator = self.accumulator.write().await;
        if accumulator.contains(&request.commitment) {
            return Err(TicketError::Validation("commitment already issued".to_string()));
        }

        let sig = self
            .issuer
            .sign_ticket(&request.metadata, &request.ticket_id, &request.commitment)?;
        let (leaf_index, merkle_root) = accumulator.insert(request.commitment)?;
        let merkle_proof = accumulator.get_proof(leaf_index)?;

        record.commitment = Some(request.commitment);
        record.leaf_index = Some(leaf_index);

        info!("🎫 Issued ticket {} at leaf {}", request.ticket_id, leaf_index);

        Ok(IssuanceResponse {
            issuer_key: self.issuer.public_key(),
            sig,
            merkle_root,
            merkle_proof,
            leaf_index,
        })
    }

    /// Current root and a fresh inclusion proof for an issued commitment
    pub async fn current_proof(&self, commitment: &FieldElement) -> Result<(FieldElement, MerkleProof)> {
        let accumulator = self.accumulator.read().await;
        let index = accumulator
            .leaf_index(commitment)
            .ok_or_else(|| TicketError::NotFound(format!("commitment {}", commitment)))?;
        let root = accumulator.root().ok_or_else(|| TicketError::NotFound("empty accumulator".to_string()))?;
        Ok((root, accumulator.get_proof(index)?))
    }

    pub async fn merkle_root(&self) -> Option<FieldElement> {
        self.accumulator.read().await.root()
    }

    pub async fn verify(&self, ticket: &Ticket, proof: Option<&ProofEnvelope>, context_id: &str) -> VerificationResult {
        self.verifier.verify(ticket, proof, context_id).await
    }

    /// Log a check-in and report whether it conflicts with earlier ones
    pub async fn check_in(&self, request: CheckInRequest) -> CheckInResponse {
        let CheckInRequest { proof, public_inputs, context_id, segment, timestamp } = request;

        let handle = match self.validate_check_in(&public_inputs, proof.as_ref()).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!("❌ Check-in on {} refused: {}", context_id, err);
                return CheckInResponse::rejected(err.reject_reason());
            }
        };

        // N is bound to the ticket before it reaches the ledger, so a swapped
        // nullifier cannot start a clean history
        let mut record = handle.lock().await;
        if let Err(err) = Self::bind_nullifier(&mut record, &public_inputs.nullifier) {
            warn!("❌ Check-in on {} refused: {}", context_id, err);
            return CheckInResponse::rejected(err.reject_reason());
        }

        let entry = CheckLogEntry {
            timestamp: timestamp.unwrap_or_else(|| self.clock.now_ms()),
            context_id,
            segment,
        };
        let result = self.ledger.record(public_inputs.nullifier, entry).await;
        CheckInResponse::accepted(result.fraud)
    }

    fn bind_nullifier(record: &mut TicketRecord, nullifier: &FieldElement) -> Result<()> {
        if record.evicted {
            return Err(TicketError::NotFound(format!("ticket {} was evicted", record.ticket_id)));
        }
        if record.nullifier.is_some_and(|pinned| pinned != *nullifier) {
            return Err(TicketError::CommitmentMismatch);
        }
        record.nullifier = Some(*nullifier);
        Ok(())
    }

    async fn validate_check_in(&self, inputs: &PublicInputs, proof: Option<&ProofEnvelope>) -> Result<TicketHandle> {
        inputs.metadata.validate()?;
        if inputs.issuer_key != self.issuer.public_key() {
            return Err(TicketError::InvalidSignature);
        }
        if !verify_ticket_signature(
            &inputs.issuer_key,
            &inputs.metadata,
            &inputs.ticket_id,
            &inputs.commitment,
            &inputs.sig,
        ) {
            return Err(TicketError::InvalidSignature);
        }

        let handle = self
            .store
            .get(&inputs.ticket_id)
            .await?
            .ok_or_else(|| TicketError::NotFound(format!("ticket {}", inputs.ticket_id)))?;
        if handle.lock().await.commitment != Some(inputs.commitment) {
            return Err(TicketError::CommitmentMismatch);
        }
        if !self.accumulator.read().await.contains(&inputs.commitment) {
            return Err(TicketError::NotFound(format!("commitment {}", inputs.commitment)));
        }

        if let Some(envelope) = proof {
            let statement = ProofStatement {
                metadata: inputs.metadata,
                ticket_id: inputs.ticket_id,
                commitment: inputs.commitment,
                nullifier: inputs.nullifier,
            };
            let limit = Duration::from_millis(self.config.proof_timeout_ms);
            if !verify_within(self.proofs.as_ref(), envelope, &statement, limit).await? {
                return Err(TicketError::ProofUnavailable("check-in proof did not verify".to_string()));
            }
        }

        Ok(handle)
    }

    pub async fn check_count(&self, ticket_id: &FieldElement) -> Result<u64> {
        let handle = self
            .store
            .get(ticket_id)
            .await?
            .ok_or_else(|| TicketError::NotFound(format!("ticket {}", ticket_id)))?;
        let count = handle.lock().await.check_count;
        Ok(count)
    }

    /// Drop a ticket record and its copy-protection registrations.
    /// The commitment stays in the accumulator; verifications already holding
    /// the record see it marked evicted.
    pub async fn evict_ticket(&self, ticket_id: &FieldElement) -> Result<bool> {
        match self.store.evict(ticket_id).await? {
            Some(record) => {
                if let Some(nullifier) = record.nullifier {
                    self.copy_guard.release(&nullifier).await;
                }
                info!("🗑️  Evicted ticket {}", ticket_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
