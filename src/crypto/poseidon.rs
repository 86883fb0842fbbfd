// Poseidon hash over the BN254 scalar field
// Shared by commitments, nullifiers, the Merkle accumulator, the signature
// challenge and the ownership circuit, so all of them must use this config.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    poseidon::{find_poseidon_ark_and_mds, PoseidonConfig, PoseidonSponge},
    CryptographicSponge, FieldBasedCryptographicSponge,
};
use ark_ff::{PrimeField, Zero};
use std::sync::OnceLock;

use super::FieldHasher;
use crate::primitives::FieldElement;

pub const POSEIDON_RATE: usize = 2;
pub const POSEIDON_CAPACITY: usize = 1;
pub const POSEIDON_ALPHA: u64 = 5;
pub const POSEIDON_FULL_ROUNDS: usize = 8;
pub const POSEIDON_PARTIAL_ROUNDS: usize = 57;

/// Process-wide Poseidon parameters (Grain LFSR round constants and MDS)
pub fn poseidon_config() -> &'static PoseidonConfig<Fr> {
    static CONFIG: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();
    CONFIG.get_or_init(|| {
        let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
            Fr::MODULUS_BIT_SIZE as u64,
            POSEIDON_RATE,
            POSEIDON_FULL_ROUNDS as u64,
            POSEIDON_PARTIAL_ROUNDS as u64,
            0,
        );
        PoseidonConfig::new(
            POSEIDON_FULL_ROUNDS,
            POSEIDON_PARTIAL_ROUNDS,
            POSEIDON_ALPHA,
            mds,
            ark,
            POSEIDON_RATE,
            POSEIDON_CAPACITY,
        )
    })
}

/// Poseidon sponge hasher. The input length is absorbed before the inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoseidonHasher;

impl PoseidonHasher {
    pub fn hash_native(inputs: &[Fr]) -> Fr {
        let mut sponge = PoseidonSponge::<Fr>::new(poseidon_config());
        sponge.absorb(&Fr::from(inputs.len() as u64));
        for input in inputs {
            sponge.absorb(input);
        }
        sponge
            .squeeze_native_field_elements(1)
            .into_iter()
            .next()
            .unwrap_or_else(Fr::zero)
    }
}

impl FieldHasher for PoseidonHasher {
    fn hash(inputs: &[FieldElement]) -> FieldElement {
        let native: Vec<Fr> = inputs.iter().map(FieldElement::inner).collect();
        FieldElement(Self::hash_native(&native))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fe(v: u64) -> FieldElement {
        FieldElement::from_u64(v)
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = PoseidonHasher::hash(&[fe(42), fe(7)]);
        let b = PoseidonHasher::hash(&[fe(42), fe(7)]);
        assert_eq!(a, b);
        assert!(!a.is_zero());
    }

    #[test]
    fn test_hash_is_order_sensitive() {
        assert_ne!(
            PoseidonHasher::hash(&[fe(1), fe(2)]),
            PoseidonHasher::hash(&[fe(2), fe(1)])
        );
    }

    #[test]
    fn test_length_is_domain_separated() {
        assert_ne!(
            PoseidonHasher::hash(&[fe(7)]),
            PoseidonHasher::hash(&[fe(7), fe(0)])
        );
        assert_ne!(PoseidonHasher::hash(&[]), PoseidonHasher::hash(&[fe(0)]));
    }

    #[test]
    fn test_hash_pair_matches_hash() {
        assert_eq!(
            PoseidonHasher::hash_pair(&fe(3), &fe(4)),
            PoseidonHasher::hash(&[fe(3), fe(4)])
        );
    }
}
