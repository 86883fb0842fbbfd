// Ticket ownership circuit
//
// Public inputs, in order: ticket_id, C, N
// Private witness: the rider secret
// Constraints: C == Poseidon(ticket_id, secret) and
//              N == Poseidon(secret) or Poseidon(secret, salt)

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    constraints::CryptographicSpongeVar, poseidon::constraints::PoseidonSpongeVar,
};
use ark_r1cs_std::{alloc::AllocVar, eq::EqGadget, fields::fp::FpVar};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use crate::crypto::poseidon_config;
use crate::primitives::FieldElement;

/// In-circuit Poseidon, absorbing the input length first like the native hasher
pub fn poseidon_gadget(
    cs: ConstraintSystemRef<Fr>,
    inputs: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut sponge = PoseidonSpongeVar::new(cs, poseidon_config());
    sponge.absorb(&FpVar::Constant(Fr::from(inputs.len() as u64)))?;
    for input in inputs {
        sponge.absorb(input)?;
    }
    sponge
        .squeeze_field_elements(1)?
        .into_iter()
        .next()
        .ok_or(SynthesisError::Unsatisfiable)
}

#[derive(Clone, Debug)]
pub struct TicketOwnershipCircuit {
    // Public inputs
    pub ticket_id: Option<Fr>,
    pub commitment: Option<Fr>,
    pub nullifier: Option<Fr>,

    // Private witness
    pub secret: Option<Fr>,

    /// Nullifier salt, fixed per deployment and baked into the keys
    pub salt: Option<Fr>,
}

impl TicketOwnershipCircuit {
    pub fn new(
        ticket_id: FieldElement,
        commitment: FieldElement,
        nullifier: FieldElement,
        secret: FieldElement,
        salt: Option<FieldElement>,
    ) -> Self {
        Self {
            ticket_id: Some(ticket_id.inner()),
            commitment: Some(commitment.inner()),
            nullifier: Some(nullifier.inner()),
            secret: Some(secret.inner()),
            salt: salt.map(|s| s.inner()),
        }
    }

    /// Shape-only instance for key generation
    pub fn empty(salt: Option<FieldElement>) -> Self {
        Self {
            ticket_id: None,
            commitment: None,
            nullifier: None,
            secret: None,
            salt: salt.map(|s| s.inner()),
        }
    }

    /// Public input vector in allocation order
    pub fn public_inputs(ticket_id: &FieldElement, commitment: &FieldElement, nullifier: &FieldElement) -> Vec<Fr> {
        vec![ticket_id.inner(), commitment.inner(), nullifier.inner()]
    }
}

impl ConstraintSynthesizer<Fr> for TicketOwnershipCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let ticket_id = FpVar::new_input(cs.clone(), || {
            self.ticket_id.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let commitment = FpVar::new_input(cs.clone(), || {
            self.commitment.ok_or(SynthesisError::AssignmentMissing)
        })?;
        let nullifier = FpVar::new_input(cs.clone(), || {
            self.nullifier.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let secret = FpVar::new_witness(cs.clone(), || {
            self.secret.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let computed_commitment = poseidon_gadget(cs.clone(), &[ticket_id, secret.clone()])?;
        computed_commitment.enforce_equal(&commitment)?;

        let nullifier_inputs = match self.salt {
            Some(salt) => vec![secret, FpVar::Constant(salt)],
            None => vec![secret],
        };
        let computed_nullifier = poseidon_gadget(cs, &nullifier_inputs)?;
        computed_nullifier.enforce_equal(&nullifier)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{FieldHasher, PoseidonHasher};
    use crate::ticket::{CommitmentScheme, RiderSecret};
    use ark_r1cs_std::R1CSVar;
    use ark_relations::r1cs::ConstraintSystem;

    #[test]
    fn test_gadget_matches_native_hash() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let a = FpVar::new_witness(cs.clone(), || Ok(Fr::from(42u64))).unwrap();
        let b = FpVar::new_witness(cs.clone(), || Ok(Fr::from(7u64))).unwrap();

        let out = poseidon_gadget(cs.clone(), &[a, b]).unwrap();
        let native = PoseidonHasher::hash(&[FieldElement::from_u64(42), FieldElement::from_u64(7)]);
        assert_eq!(out.value().unwrap(), native.inner());
    }

    fn satisfied(circuit: TicketOwnershipCircuit) -> bool {
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        cs.is_satisfied().unwrap()
    }

    #[test]
    fn test_honest_witness_satisfies() {
        for salt in [None, Some(FieldElement::from_u64(123456789))] {
            let scheme = CommitmentScheme::<PoseidonHasher>::new(salt);
            let creds = scheme.derive(FieldElement::from_u64(42), RiderSecret::from_field(FieldElement::from_u64(7)));

            assert!(satisfied(TicketOwnershipCircuit::new(
                creds.ticket_id,
                creds.commitment,
                creds.nullifier,
                creds.secret.expose(),
                salt,
            )));
        }
    }

    #[test]
    fn test_wrong_secret_unsatisfied() {
        let scheme = CommitmentScheme::<PoseidonHasher>::default();
        let creds = scheme.derive(FieldElement::from_u64(42), RiderSecret::from_field(FieldElement::from_u64(7)));

        assert!(!satisfied(TicketOwnershipCircuit::new(
            creds.ticket_id,
            creds.commitment,
            creds.nullifier,
            FieldElement::from_u64(8),
            None,
        )));

        // Nullifier from another secret
        let other = scheme.nullifier(&RiderSecret::from_field(FieldElement::from_u64(8)));
        assert!(!satisfied(TicketOwnershipCircuit::new(
            creds.ticket_id,
            creds.commitment,
            other,
            creds.secret.expose(),
            None,
        )));
    }
}
