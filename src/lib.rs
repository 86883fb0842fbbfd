// Anonymous transit tickets
// Poseidon commitments and nullifiers, a fixed-depth Merkle accumulator,
// issuer signatures on Baby Jubjub, fraud and copy detection, and a
// verifier that ties them together

pub mod primitives;
pub mod crypto;
pub mod merkle;
pub mod ticket;
pub mod fraud;
pub mod zkp;
pub mod verifier;
pub mod config;
pub mod service;

// Re-export key types for easy access
pub use primitives::{
    primitives::*,
    error::*,
    metadata::*,
    clock::*,
};

pub use crypto::{BabyJubjubEddsa, FieldHasher, PoseidonHasher, PublicKey, SignatureScheme, Signature};
pub use merkle::{MerkleAccumulator, MerkleProof};
pub use ticket::{
    AllocatedTicket, CheckInRequest, CheckInResponse, CommitmentScheme, IssuanceRequest,
    IssuanceResponse, Issuer, PublicInputs, RiderCredentials, RiderSecret, Ticket,
};
pub use fraud::{CheckLogEntry, CopyProtectionGuard, NullifierLedger};
pub use zkp::{ProofBackend, ProofEnvelope, ProofStatement, ProofSystem, ProofWitness};
pub use verifier::{VerificationResult, Verifier};
pub use config::{ProofMode, ServiceConfig};
pub use service::TicketService;
