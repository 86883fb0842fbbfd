// Circuit key generation and storage for the ticket ownership circuit
use ark_bn254::Bn254;
use ark_groth16::{Groth16, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use chrono::{DateTime, Utc};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

use super::circuit::TicketOwnershipCircuit;
use super::{ProofError, Result};
use crate::crypto::poseidon::{POSEIDON_FULL_ROUNDS, POSEIDON_PARTIAL_ROUNDS, POSEIDON_RATE};
use crate::primitives::FieldElement;

pub const TICKET_CIRCUIT_ID: &str = "ticket_ownership";

const MANIFEST_FILE: &str = "setup_manifest.json";

/// Record written next to the keys so a verifier can check what it loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupManifest {
    pub circuit_id: String,
    pub verifying_key_sha256: String,
    pub nullifier_salt: Option<FieldElement>,
    pub poseidon_rate: usize,
    pub poseidon_full_rounds: usize,
    pub poseidon_partial_rounds: usize,
    pub created_at: DateTime<Utc>,
}

pub struct CircuitKeys {
    /// Absent on verify-only nodes
    pub proving_key: Option<ProvingKey<Bn254>>,
    pub verifying_key: VerifyingKey<Bn254>,
    pub salt: Option<FieldElement>,
}

fn pk_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.pk", TICKET_CIRCUIT_ID))
}

fn vk_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.vk", TICKET_CIRCUIT_ID))
}

fn storage_error(context: &str, err: impl std::fmt::Display) -> ProofError {
    ProofError::KeyStorage(format!("{}: {}", context, err))
}

impl CircuitKeys {
    /// Circuit-specific Groth16 setup. The salt is fixed into the circuit.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R, salt: Option<FieldElement>) -> Result<Self> {
        info!("⚙️  Running Groth16 setup for {}", TICKET_CIRCUIT_ID);

        let circuit = TicketOwnershipCircuit::empty(salt);
        let (proving_key, verifying_key) = Groth16::<Bn254>::circuit_specific_setup(circuit, rng)
            .map_err(|e| ProofError::SetupFailed(e.to_string()))?;

        info!("✅ Circuit setup complete");
        Ok(Self {
            proving_key: Some(proving_key),
            verifying_key,
            salt,
        })
    }

    fn verifying_key_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.verifying_key
            .serialize_compressed(&mut bytes)
            .map_err(|e| storage_error("VK serialization error", e))?;
        Ok(bytes)
    }

    /// Write keys and manifest into `dir`, creating it if needed
    pub async fn save(&self, dir: &Path) -> Result<SetupManifest> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| storage_error("failed to create keys directory", e))?;

        if let Some(proving_key) = &self.proving_key {
            let mut pk_bytes = Vec::new();
            proving_key
                .serialize_compressed(&mut pk_bytes)
                .map_err(|e| storage_error("PK serialization error", e))?;
            fs::write(pk_path(dir), &pk_bytes)
                .await
                .map_err(|e| storage_error("failed to write PK", e))?;
            info!("   📁 Proving key: {} bytes", pk_bytes.len());
        }

        let vk_bytes = self.verifying_key_bytes()?;
        fs::write(vk_path(dir), &vk_bytes)
            .await
            .map_err(|e| storage_error("failed to write VK", e))?;
        info!("   📁 Verifying key: {} bytes", vk_bytes.len());

        let manifest = SetupManifest {
            circuit_id: TICKET_CIRCUIT_ID.to_string(),
            verifying_key_sha256: hex::encode(Sha256::digest(&vk_bytes)),
            nullifier_salt: self.salt,
            poseidon_rate: POSEIDON_RATE,
            poseidon_full_rounds: POSEIDON_FULL_ROUNDS,
            poseidon_partial_rounds: POSEIDON_PARTIAL_ROUNDS,
            created_at: Utc::now(),
        };
        let manifest_json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| storage_error("manifest serialization error", e))?;
        fs::write(dir.join(MANIFEST_FILE), manifest_json)
            .await
            .map_err(|e| storage_error("failed to write manifest", e))?;

        info!("💾 Saved {} keys to {:?}", TICKET_CIRCUIT_ID, dir);
        Ok(manifest)
    }

    /// Load keys from `dir`. The verifying key must match the manifest hash.
    pub async fn load(dir: &Path, with_proving_key: bool) -> Result<Self> {
        let manifest_json = fs::read_to_string(dir.join(MANIFEST_FILE))
            .await
            .map_err(|e| storage_error("failed to read manifest", e))?;
        let manifest: SetupManifest = serde_json::from_str(&manifest_json)
            .map_err(|e| storage_error("manifest deserialization error", e))?;

        let params = (POSEIDON_RATE, POSEIDON_FULL_ROUNDS, POSEIDON_PARTIAL_ROUNDS);
        let stored = (manifest.poseidon_rate, manifest.poseidon_full_rounds, manifest.poseidon_partial_rounds);
        if manifest.circuit_id != TICKET_CIRCUIT_ID || stored != params {
            return Err(ProofError::KeyStorage(format!(
                "keys were generated for a different circuit ({}, {:?})",
                manifest.circuit_id, stored
            )));
        }

        let vk_bytes = fs::read(vk_path(dir))
            .await
            .map_err(|e| storage_error("failed to read VK", e))?;
        if hex::encode(Sha256::digest(&vk_bytes)) != manifest.verifying_key_sha256 {
            return Err(ProofError::KeyStorage(
                "verifying key does not match manifest".to_string(),
            ));
        }
        let verifying_key = VerifyingKey::<Bn254>::deserialize_compressed(&vk_bytes[..])
            .map_err(|e| storage_error("VK deserialization error", e))?;

        let proving_key = if with_proving_key {
            let pk_bytes = fs::read(pk_path(dir))
                .await
                .map_err(|e| storage_error("failed to read PK", e))?;
            Some(
                ProvingKey::<Bn254>::deserialize_compressed(&pk_bytes[..])
                    .map_err(|e| storage_error("PK deserialization error", e))?,
            )
        } else {
            None
        };

        info!("🔑 Loaded keys for circuit: {}", TICKET_CIRCUIT_ID);
        Ok(Self {
            proving_key,
            verifying_key,
            salt: manifest.nullifier_salt,
        })
    }

    pub fn exists(dir: &Path) -> bool {
        vk_path(dir).exists() && dir.join(MANIFEST_FILE).exists()
    }
}
