// Commitment and nullifier derivation
//
//   C = Hash(ticket_id, secret)
//   N = Hash(secret)            without salt
//   N = Hash(secret, salt)      with salt
//
// The secret stays with the rider; the service only ever sees C and N.

use rand::{CryptoRng, RngCore};
use std::marker::PhantomData;

use crate::crypto::{FieldHasher, PoseidonHasher};
use crate::primitives::FieldElement;

/// Rider secret. Debug output is redacted; it is never serialized.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RiderSecret(FieldElement);

impl RiderSecret {
    /// 248 random bits, always below the field modulus
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 31];
        rng.fill_bytes(&mut bytes);
        RiderSecret(FieldElement::from_le_bytes_mod_order(&bytes))
    }

    pub fn from_field(value: FieldElement) -> Self {
        RiderSecret(value)
    }

    pub fn expose(&self) -> FieldElement {
        self.0
    }
}

impl std::fmt::Debug for RiderSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RiderSecret(<redacted>)")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommitmentScheme<H: FieldHasher = PoseidonHasher> {
    salt: Option<FieldElement>,
    _hasher: PhantomData<H>,
}

impl<H: FieldHasher> Default for CommitmentScheme<H> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<H: FieldHasher> CommitmentScheme<H> {
    pub fn new(salt: Option<FieldElement>) -> Self {
        Self { salt, _hasher: PhantomData }
    }

    pub fn salt(&self) -> Option<FieldElement> {
        self.salt
    }

    pub fn commitment(&self, ticket_id: &FieldElement, secret: &RiderSecret) -> FieldElement {
        H::hash(&[*ticket_id, secret.expose()])
    }

    pub fn nullifier(&self, secret: &RiderSecret) -> FieldElement {
        match self.salt {
            Some(salt) => H::hash(&[secret.expose(), salt]),
            None => H::hash(&[secret.expose()]),
        }
    }

    pub fn derive(&self, ticket_id: FieldElement, secret: RiderSecret) -> RiderCredentials {
        RiderCredentials {
            ticket_id,
            commitment: self.commitment(&ticket_id, &secret),
            nullifier: self.nullifier(&secret),
            secret,
        }
    }
}

/// Everything the rider holds for one ticket before issuance
#[derive(Debug, Clone, Copy)]
pub struct RiderCredentials {
    pub ticket_id: FieldElement,
    pub secret: RiderSecret,
    pub commitment: FieldElement,
    pub nullifier: FieldElement,
}
