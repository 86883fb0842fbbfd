// Cryptographic primitives consumed by the ticket protocol:
// a field hash (Poseidon) and a signature scheme (EdDSA on Baby Jubjub)

pub mod poseidon;
pub mod eddsa;

pub use poseidon::{poseidon_config, PoseidonHasher};
pub use eddsa::{BabyJubjubEddsa, PublicKey, SecretKey, Signature};

use crate::primitives::{FieldElement, TicketError};

/// Hash from an ordered list of field elements to one field element
pub trait FieldHasher: Send + Sync + 'static {
    fn hash(inputs: &[FieldElement]) -> FieldElement;

    fn hash_pair(left: &FieldElement, right: &FieldElement) -> FieldElement {
        Self::hash(&[*left, *right])
    }
}

/// Signature primitive over a single field-element message
pub trait SignatureScheme {
    type SecretKey;
    type PublicKey;
    type Signature;

    fn public_key(secret: &Self::SecretKey) -> Self::PublicKey;

    /// Must be deterministic in `(secret, message)`
    fn sign(secret: &Self::SecretKey, message: &FieldElement) -> Result<Self::Signature>;

    fn verify(public: &Self::PublicKey, message: &FieldElement, signature: &Self::Signature) -> bool;
}

/// Cryptographic errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),
    #[error("Invalid scalar: {0}")]
    InvalidScalar(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;

impl From<CryptoError> for TicketError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidSignature => TicketError::InvalidSignature,
            other => TicketError::Crypto(other.to_string()),
        }
    }
}
