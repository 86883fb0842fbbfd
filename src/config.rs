// Service configuration
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::merkle::MAX_TREE_DEPTH;
use crate::primitives::{FieldElement, Policy, Result, TicketError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofMode {
    Groth16,
    Simplified,
}

impl FromStr for ProofMode {
    type Err = TicketError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "groth16" | "real" => Ok(ProofMode::Groth16),
            "simplified" => Ok(ProofMode::Simplified),
            other => Err(TicketError::Config(format!("unknown proof mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub tree_depth: usize,
    pub fraud_window_ms: i64,
    pub copy_protection_ttl_ms: i64,
    /// Other live contexts at which a new context is refused.
    /// 1 rejects any second context; 11 matches the legacy guard.
    pub copy_conflict_threshold: usize,
    pub nullifier_salt: Option<FieldElement>,
    pub proof_mode: ProofMode,
    pub proof_timeout_ms: u64,
    pub circuit_keys_dir: Option<PathBuf>,
    /// Background sweep of copy-protection registrations; 0 disables it
    pub copy_sweep_interval_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            tree_depth: Policy::TREE_DEPTH,
            fraud_window_ms: Policy::FRAUD_WINDOW_MS,
            copy_protection_ttl_ms: Policy::COPY_PROTECTION_TTL_MS,
            copy_conflict_threshold: Policy::COPY_CONFLICT_THRESHOLD,
            nullifier_salt: None,
            proof_mode: ProofMode::Simplified,
            proof_timeout_ms: Policy::PROOF_TIMEOUT_MS,
            circuit_keys_dir: None,
            copy_sweep_interval_ms: 60_000,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| TicketError::Config(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}

impl ServiceConfig {
    /// Defaults overridden by `TICKET_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(depth) = env_parse("TICKET_TREE_DEPTH")? {
            config.tree_depth = depth;
        }
        if let Some(window) = env_parse("TICKET_FRAUD_WINDOW_MS")? {
            config.fraud_window_ms = window;
        }
        if let Some(ttl) = env_parse("TICKET_COPY_TTL_MS")? {
            config.copy_protection_ttl_ms = ttl;
        }
        if let Some(threshold) = env_parse("TICKET_COPY_CONFLICT_THRESHOLD")? {
            config.copy_conflict_threshold = threshold;
        }
        if let Some(salt) = env_parse::<FieldElement>("TICKET_NULLIFIER_SALT")? {
            config.nullifier_salt = Some(salt);
        }
        if let Some(mode) = env_parse("TICKET_PROOF_MODE")? {
            config.proof_mode = mode;
        }
        if let Some(timeout) = env_parse("TICKET_PROOF_TIMEOUT_MS")? {
            config.proof_timeout_ms = timeout;
        }
        if let Ok(dir) = std::env::var("TICKET_CIRCUIT_KEYS_DIR") {
            config.circuit_keys_dir = Some(PathBuf::from(dir));
        }
        if let Some(interval) = env_parse("TICKET_COPY_SWEEP_MS")? {
            config.copy_sweep_interval_ms = interval;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TicketError::Config(format!("failed to read {:?}: {}", path, e)))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| TicketError::Config(format!("invalid config {:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tree_depth == 0 || self.tree_depth > MAX_TREE_DEPTH {
            return Err(TicketError::Config(format!(
                "tree_depth must be between 1 and {}",
                MAX_TREE_DEPTH
            )));
        }
        if self.fraud_window_ms <= 0 || self.copy_protection_ttl_ms <= 0 {
            return Err(TicketError::Config(
                "fraud window and copy-protection TTL must be positive".to_string(),
            ));
        }
        if self.copy_conflict_threshold == 0 {
            return Err(TicketError::Config(
                "copy_conflict_threshold must be at least 1".to_string(),
            ));
        }
        if self.proof_timeout_ms == 0 {
            return Err(TicketError::Config("proof_timeout_ms must be positive".to_string()));
        }
        if self.proof_mode == ProofMode::Groth16 && self.circuit_keys_dir.is_none() {
            return Err(TicketError::Config(
                "groth16 proof mode needs circuit_keys_dir".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.tree_depth, 20);
        assert_eq!(config.fraud_window_ms, 20 * 60 * 1000);
        assert_eq!(config.copy_protection_ttl_ms, 5 * 60 * 1000);
        assert_eq!(config.proof_mode, ProofMode::Simplified);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_file_with_partial_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tree_depth": 8, "nullifier_salt": "123456789", "copy_conflict_threshold": 11}}"#).unwrap();

        let config = ServiceConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.tree_depth, 8);
        assert_eq!(config.copy_conflict_threshold, 11);
        assert_eq!(config.nullifier_salt, Some(FieldElement::from_u64(123456789)));
        assert_eq!(config.fraud_window_ms, Policy::FRAUD_WINDOW_MS);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut config = ServiceConfig::default();
        config.tree_depth = 0;
        assert!(matches!(config.validate(), Err(TicketError::Config(_))));

        let mut config = ServiceConfig::default();
        config.proof_mode = ProofMode::Groth16;
        assert!(config.validate().is_err());
        config.circuit_keys_dir = Some(PathBuf::from("/tmp/keys"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_proof_mode_parsing() {
        assert_eq!("groth16".parse::<ProofMode>().unwrap(), ProofMode::Groth16);
        assert_eq!("Simplified".parse::<ProofMode>().unwrap(), ProofMode::Simplified);
        assert!("plonk".parse::<ProofMode>().is_err());
    }
}
