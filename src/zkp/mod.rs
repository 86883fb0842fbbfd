// Zero-knowledge ticket ownership proofs
// A Groth16 circuit over BN254 and a deterministic re-hash fallback,
// selected once at startup through ProofSystem

pub mod circuit;
pub mod backend;
pub mod setup;

pub use backend::*;
pub use circuit::{poseidon_gadget, TicketOwnershipCircuit};
pub use setup::{CircuitKeys, SetupManifest, TICKET_CIRCUIT_ID};

use crate::primitives::TicketError;

/// Error types for proof generation and verification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProofError {
    #[error("Proof backend has no proving key")]
    ProverUnavailable,
    #[error("Proof does not match this backend: expected {expected}, got {actual}")]
    WrongProofType { expected: &'static str, actual: &'static str },
    #[error("Malformed proof: {0}")]
    MalformedProof(String),
    #[error("Witness does not open the public inputs")]
    InvalidWitness,
    #[error("Proof generation failed: {0}")]
    ProofGenerationFailed(String),
    #[error("Proof verification failed: {0}")]
    VerificationFailed(String),
    #[error("Proof verification timed out after {0} ms")]
    Timeout(u64),
    #[error("Circuit setup failed: {0}")]
    SetupFailed(String),
    #[error("Circuit key storage error: {0}")]
    KeyStorage(String),
}

pub type Result<T> = std::result::Result<T, ProofError>;

impl From<ProofError> for TicketError {
    fn from(err: ProofError) -> Self {
        match err {
            ProofError::SetupFailed(msg) | ProofError::KeyStorage(msg) => TicketError::Storage(msg),
            other => TicketError::ProofUnavailable(other.to_string()),
        }
    }
}
