// Proof backends: Groth16 ownership proofs and the simplified re-hash digest
use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, ProvingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::circuit::TicketOwnershipCircuit;
use super::setup::CircuitKeys;
use super::{ProofError, Result};
use crate::crypto::{FieldHasher, PoseidonHasher};
use crate::primitives::{FieldElement, Policy, TicketMetadata};
use crate::ticket::{CommitmentScheme, RiderSecret};

/// Proof as carried on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProofEnvelope {
    Groth16 {
        #[serde(with = "hex::serde")]
        proof: Vec<u8>,
    },
    Simplified {
        digest: FieldElement,
    },
}

impl ProofEnvelope {
    pub fn kind(&self) -> &'static str {
        match self {
            ProofEnvelope::Groth16 { .. } => "groth16",
            ProofEnvelope::Simplified { .. } => "simplified",
        }
    }
}

/// Public side of an ownership proof
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofStatement {
    pub metadata: TicketMetadata,
    pub ticket_id: FieldElement,
    pub commitment: FieldElement,
    pub nullifier: FieldElement,
}

#[derive(Debug, Clone, Copy)]
pub struct ProofWitness {
    pub statement: ProofStatement,
    pub secret: RiderSecret,
}

#[async_trait::async_trait]
pub trait ProofBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn prove(&self, witness: &ProofWitness) -> Result<ProofEnvelope>;

    /// `Ok(false)` for a well-formed proof that does not verify
    async fn verify(&self, envelope: &ProofEnvelope, statement: &ProofStatement) -> Result<bool>;
}

/// Run one verification under a deadline; a backend that does not answer in
/// time fails with `ProofError::Timeout`
pub async fn verify_within(
    backend: &dyn ProofBackend,
    envelope: &ProofEnvelope,
    statement: &ProofStatement,
    limit: Duration,
) -> Result<bool> {
    tokio::time::timeout(limit, backend.verify(envelope, statement))
        .await
        .map_err(|_| ProofError::Timeout(limit.as_millis() as u64))?
}

fn check_witness<H: FieldHasher>(scheme: &CommitmentScheme<H>, witness: &ProofWitness) -> Result<()> {
    let statement = &witness.statement;
    if scheme.commitment(&statement.ticket_id, &witness.secret) != statement.commitment
        || scheme.nullifier(&witness.secret) != statement.nullifier
    {
        return Err(ProofError::InvalidWitness);
    }
    Ok(())
}

/// Deterministic fallback: the "proof" is a hash over every public value
#[derive(Debug, Clone, Copy)]
pub struct SimplifiedBackend<H: FieldHasher = PoseidonHasher> {
    scheme: CommitmentScheme<H>,
    _hasher: PhantomData<H>,
}

impl<H: FieldHasher> SimplifiedBackend<H> {
    pub fn new(salt: Option<FieldElement>) -> Self {
        Self {
            scheme: CommitmentScheme::new(salt),
            _hasher: PhantomData,
        }
    }

    /// `Hash(origin, destination, date, class, product_type, ticket_id, C, N)`
    pub fn digest(statement: &ProofStatement) -> FieldElement {
        let mut fields = statement.metadata.to_fields().to_vec();
        fields.extend([statement.ticket_id, statement.commitment, statement.nullifier]);
        H::hash(&fields)
    }
}

#[async_trait::async_trait]
impl<H: FieldHasher> ProofBackend for SimplifiedBackend<H> {
    fn name(&self) -> &'static str {
        "simplified"
    }

    async fn prove(&self, witness: &ProofWitness) -> Result<ProofEnvelope> {
        check_witness(&self.scheme, witness)?;
        Ok(ProofEnvelope::Simplified {
            digest: Self::digest(&witness.statement),
        })
    }

    async fn verify(&self, envelope: &ProofEnvelope, statement: &ProofStatement) -> Result<bool> {
        match envelope {
            ProofEnvelope::Simplified { digest } => Ok(*digest == Self::digest(statement)),
            other => Err(ProofError::WrongProofType {
                expected: "simplified",
                actual: other.kind(),
            }),
        }
    }
}

/// Groth16 over BN254 for the ticket ownership circuit
pub struct Groth16Backend {
    proving_key: Option<Arc<ProvingKey<Bn254>>>,
    verifying_key: Arc<PreparedVerifyingKey<Bn254>>,
    scheme: CommitmentScheme<PoseidonHasher>,
    timeout: Duration,
}

impl Groth16Backend {
    pub fn new(keys: CircuitKeys, timeout: Duration) -> Result<Self> {
        let verifying_key = Groth16::<Bn254>::process_vk(&keys.verifying_key)
            .map_err(|e| ProofError::SetupFailed(format!("failed to prepare verifying key: {}", e)))?;

        info!("🔐 Groth16 backend ready (prover {})", if keys.proving_key.is_some() { "enabled" } else { "disabled" });

        Ok(Self {
            proving_key: keys.proving_key.map(Arc::new),
            verifying_key: Arc::new(verifying_key),
            scheme: CommitmentScheme::new(keys.salt),
            timeout,
        })
    }

    pub fn with_default_timeout(keys: CircuitKeys) -> Result<Self> {
        Self::new(keys, Duration::from_millis(Policy::PROOF_TIMEOUT_MS))
    }

    pub fn can_prove(&self) -> bool {
        self.proving_key.is_some()
    }
}

#[async_trait::async_trait]
impl ProofBackend for Groth16Backend {
    fn name(&self) -> &'static str {
        "groth16"
    }

    async fn prove(&self, witness: &ProofWitness) -> Result<ProofEnvelope> {
        let proving_key = self.proving_key.clone().ok_or(ProofError::ProverUnavailable)?;
        check_witness(&self.scheme, witness)?;

        let statement = witness.statement;
        let circuit = TicketOwnershipCircuit::new(
            statement.ticket_id,
            statement.commitment,
            statement.nullifier,
            witness.secret.expose(),
            self.scheme.salt(),
        );

        let proof = tokio::task::spawn_blocking(move || {
            let mut rng = StdRng::from_entropy();
            Groth16::<Bn254>::prove(&proving_key, circuit, &mut rng)
        })
        .await
        .map_err(|e| ProofError::ProofGenerationFailed(e.to_string()))?
        .map_err(|e| ProofError::ProofGenerationFailed(e.to_string()))?;

        let mut bytes = Vec::new();
        proof
            .serialize_compressed(&mut bytes)
            .map_err(|e| ProofError::ProofGenerationFailed(format!("proof serialization error: {}", e)))?;

        debug!("🧾 Generated Groth16 proof ({} bytes)", bytes.len());
        Ok(ProofEnvelope::Groth16 { proof: bytes })
    }

    async fn verify(&self, envelope: &ProofEnvelope, statement: &ProofStatement) -> Result<bool> {
        let bytes = match envelope {
            ProofEnvelope::Groth16 { proof } => proof,
            other => {
                return Err(ProofError::WrongProofType {
                    expected: "groth16",
                    actual: other.kind(),
                })
            }
        };

        let proof = Proof::<Bn254>::deserialize_compressed(&bytes[..])
            .map_err(|e| ProofError::MalformedProof(e.to_string()))?;
        let inputs: Vec<Fr> = TicketOwnershipCircuit::public_inputs(
            &statement.ticket_id,
            &statement.commitment,
            &statement.nullifier,
        );
        let verifying_key = self.verifying_key.clone();

        let task = tokio::task::spawn_blocking(move || {
            Groth16::<Bn254>::verify_with_processed_vk(&verifying_key, &inputs, &proof)
        });

        let timeout_ms = self.timeout.as_millis() as u64;
        tokio::time::timeout(self.timeout, task)
            .await
            .map_err(|_| ProofError::Timeout(timeout_ms))?
            .map_err(|e| ProofError::VerificationFailed(e.to_string()))?
            .map_err(|e| ProofError::VerificationFailed(e.to_string()))
    }
}

/// Backend chosen once at startup
pub enum ProofSystem {
    Real(Groth16Backend),
    Simplified(SimplifiedBackend),
}

#[async_trait::async_trait]
impl ProofBackend for ProofSystem {
    fn name(&self) -> &'static str {
        match self {
            ProofSystem::Real(backend) => backend.name(),
            ProofSystem::Simplified(backend) => backend.name(),
        }
    }

    async fn prove(&self, witness: &ProofWitness) -> Result<ProofEnvelope> {
        match self {
            ProofSystem::Real(backend) => backend.prove(witness).await,
            ProofSystem::Simplified(backend) => backend.prove(witness).await,
        }
    }

    async fn verify(&self, envelope: &ProofEnvelope, statement: &ProofStatement) -> Result<bool> {
        match self {
            ProofSystem::Real(backend) => backend.verify(envelope, statement).await,
            ProofSystem::Simplified(backend) => backend.verify(envelope, statement).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{ProductType, Station, TicketClass};

    fn witness(secret: u64) -> ProofWitness {
        let scheme = CommitmentScheme::<PoseidonHasher>::default();
        let secret = RiderSecret::from_field(FieldElement::from_u64(secret));
        let ticket_id = FieldElement::from_u64(42);
        let metadata = TicketMetadata::new(
            Station::Bern,
            Station::Zurich,
            1735689600,
            TicketClass::Second,
            ProductType::Single,
        )
        .unwrap();

        ProofWitness {
            statement: ProofStatement {
                metadata,
                ticket_id,
                commitment: scheme.commitment(&ticket_id, &secret),
                nullifier: scheme.nullifier(&secret),
            },
            secret,
        }
    }

    #[tokio::test]
    async fn test_simplified_round_trip() {
        let backend = SimplifiedBackend::<PoseidonHasher>::new(None);
        let w = witness(7);
        let envelope = backend.prove(&w).await.unwrap();
        assert!(backend.verify(&envelope, &w.statement).await.unwrap());

        let mut other = w.statement;
        other.metadata.destination = Station::Geneva;
        assert!(!backend.verify(&envelope, &other).await.unwrap());
    }

    #[tokio::test]
    async fn test_simplified_rejects_bad_witness_and_wrong_type() {
        let backend = SimplifiedBackend::<PoseidonHasher>::new(None);
        let mut w = witness(7);
        w.secret = RiderSecret::from_field(FieldElement::from_u64(8));
        assert_eq!(backend.prove(&w).await, Err(ProofError::InvalidWitness));

        let envelope = ProofEnvelope::Groth16 { proof: vec![1, 2, 3] };
        assert!(matches!(
            backend.verify(&envelope, &w.statement).await,
            Err(ProofError::WrongProofType { .. })
        ));
    }

    #[tokio::test]
    async fn test_groth16_prove_and_verify() {
        let mut rng = StdRng::seed_from_u64(11);
        let keys = CircuitKeys::generate(&mut rng, None).unwrap();
        let backend = ProofSystem::Real(Groth16Backend::with_default_timeout(keys).unwrap());

        let w = witness(7);
        let envelope = backend.prove(&w).await.unwrap();
        assert!(backend.verify(&envelope, &w.statement).await.unwrap());

        // Same proof, different nullifier
        let mut forged = w.statement;
        forged.nullifier = witness(8).statement.nullifier;
        assert!(!backend.verify(&envelope, &forged).await.unwrap());

        let garbage = ProofEnvelope::Groth16 { proof: vec![0u8; 8] };
        assert!(matches!(
            backend.verify(&garbage, &w.statement).await,
            Err(ProofError::MalformedProof(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_only_backend_cannot_prove() {
        let mut rng = StdRng::seed_from_u64(12);
        let mut keys = CircuitKeys::generate(&mut rng, None).unwrap();
        keys.proving_key = None;
        let backend = Groth16Backend::with_default_timeout(keys).unwrap();

        assert!(!backend.can_prove());
        assert_eq!(backend.prove(&witness(7)).await, Err(ProofError::ProverUnavailable));
    }

    /// Never answers within any sane deadline
    struct StalledBackend;

    #[async_trait::async_trait]
    impl ProofBackend for StalledBackend {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn prove(&self, _witness: &ProofWitness) -> Result<ProofEnvelope> {
            Err(ProofError::ProverUnavailable)
        }

        async fn verify(&self, _envelope: &ProofEnvelope, _statement: &ProofStatement) -> Result<bool> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(true)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_within_times_out_stalled_backend() {
        let w = witness(7);
        let envelope = ProofEnvelope::Simplified {
            digest: SimplifiedBackend::<PoseidonHasher>::digest(&w.statement),
        };

        let result = verify_within(&StalledBackend, &envelope, &w.statement, Duration::from_millis(250)).await;
        assert_eq!(result, Err(ProofError::Timeout(250)));

        // A prompt backend is unaffected by the deadline
        let simplified = SimplifiedBackend::<PoseidonHasher>::new(None);
        let result = verify_within(&simplified, &envelope, &w.statement, Duration::from_millis(250)).await;
        assert_eq!(result, Ok(true));
    }

    #[test]
    fn test_envelope_wire_shape() {
        let json = serde_json::to_value(ProofEnvelope::Groth16 { proof: vec![0xab, 0xcd] }).unwrap();
        assert_eq!(json["type"], "groth16");
        assert_eq!(json["proof"], "abcd");

        let json = serde_json::to_value(ProofEnvelope::Simplified { digest: FieldElement::from_u64(5) }).unwrap();
        assert_eq!(json["type"], "simplified");
        assert_eq!(json["digest"], "5");
    }
}
