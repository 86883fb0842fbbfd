// Error taxonomy shared by issuance and verification
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TicketError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown {table} code: {value}")]
    UnknownCode { table: &'static str, value: String },

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Invalid issuer signature")]
    InvalidSignature,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Commitment does not match the issued record")]
    CommitmentMismatch,

    #[error("Merkle root mismatch")]
    MerkleRootMismatch,

    #[error("Parallel use on different contexts: {0}")]
    Fraud(String),

    #[error("Ticket appears to be used simultaneously in multiple locations (possible copy)")]
    CopyConflict,

    #[error("Ticket not yet valid (starts at {start}, now {now})")]
    NotYetValid { start: i64, now: i64 },

    #[error("Ticket expired (ended at {end}, now {now})")]
    Expired { end: i64, now: i64 },

    #[error("Proof unavailable: {0}")]
    ProofUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Coarse error class, one per entry of the protocol's error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Crypto,
    NotFound,
    Fraud,
    CopyConflict,
    Expired,
    ProofUnavailable,
    Config,
    Storage,
}

/// Machine-readable rejection code carried by a verification result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MalformedInput,
    InvalidSignature,
    CryptoFailure,
    TicketNotFound,
    CommitmentMismatch,
    MerkleRootMismatch,
    ParallelUseDifferentContexts,
    PossibleCopy,
    NotYetValid,
    Expired,
    ProofUnavailable,
    Internal,
}

impl TicketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TicketError::Validation(_) | TicketError::UnknownCode { .. } => ErrorKind::Validation,
            TicketError::Crypto(_) | TicketError::InvalidSignature => ErrorKind::Crypto,
            TicketError::NotFound(_)
            | TicketError::CommitmentMismatch
            | TicketError::MerkleRootMismatch => ErrorKind::NotFound,
            TicketError::Fraud(_) => ErrorKind::Fraud,
            TicketError::CopyConflict => ErrorKind::CopyConflict,
            TicketError::NotYetValid { .. } | TicketError::Expired { .. } => ErrorKind::Expired,
            TicketError::ProofUnavailable(_) => ErrorKind::ProofUnavailable,
            TicketError::Config(_) => ErrorKind::Config,
            TicketError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn reject_reason(&self) -> RejectReason {
        match self {
            TicketError::Validation(_) | TicketError::UnknownCode { .. } => RejectReason::MalformedInput,
            TicketError::Crypto(_) => RejectReason::CryptoFailure,
            TicketError::InvalidSignature => RejectReason::InvalidSignature,
            TicketError::NotFound(_) => RejectReason::TicketNotFound,
            TicketError::CommitmentMismatch => RejectReason::CommitmentMismatch,
            TicketError::MerkleRootMismatch => RejectReason::MerkleRootMismatch,
            TicketError::Fraud(_) => RejectReason::ParallelUseDifferentContexts,
            TicketError::CopyConflict => RejectReason::PossibleCopy,
            TicketError::NotYetValid { .. } => RejectReason::NotYetValid,
            TicketError::Expired { .. } => RejectReason::Expired,
            TicketError::ProofUnavailable(_) => RejectReason::ProofUnavailable,
            TicketError::Config(_) | TicketError::Storage(_) => RejectReason::Internal,
        }
    }
}

impl From<std::io::Error> for TicketError {
    fn from(err: std::io::Error) -> Self {
        TicketError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for TicketError {
    fn from(err: serde_json::Error) -> Self {
        TicketError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_mapping() {
        assert_eq!(TicketError::Expired { end: 1, now: 2 }.kind(), ErrorKind::Expired);
        assert_eq!(TicketError::NotYetValid { start: 2, now: 1 }.kind(), ErrorKind::Expired);
        assert_eq!(TicketError::MerkleRootMismatch.kind(), ErrorKind::NotFound);
        assert_eq!(TicketError::InvalidSignature.kind(), ErrorKind::Crypto);
        assert_eq!(TicketError::CopyConflict.reject_reason(), RejectReason::PossibleCopy);
    }

    #[test]
    fn test_reject_reason_wire_names() {
        let json = serde_json::to_string(&RejectReason::ParallelUseDifferentContexts).unwrap();
        assert_eq!(json, "\"parallel_use_different_contexts\"");
        let json = serde_json::to_string(&RejectReason::ProofUnavailable).unwrap();
        assert_eq!(json, "\"proof_unavailable\"");
    }
}
