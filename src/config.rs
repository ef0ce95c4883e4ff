use serde::{Deserialize, Serialize};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::{read_keypair_file, Keypair},
};
use std::str::FromStr;

use crate::{
    error::{ReclaimError, Result},
    reclaim::engine::ExecutionMode,
    solana::retry::RetryPolicy,
};

/// Environment variable holding a base58 operator secret key.
pub const OPERATOR_SECRET_ENV: &str = "KORA_OPERATOR_SECRET";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub solana: SolanaConfig,
    pub rpc: RpcConfig,
    pub kora: KoraConfig,
    pub reclaim: ReclaimConfig,
    pub storage: StorageConfig,
    pub alerts: AlertConfig,
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SolanaConfig {
    pub rpc_url: String,
    pub commitment: String,
    pub rate_limit_delay_ms: u64,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.devnet.solana.com".to_string(),
            commitment: "confirmed".to_string(),
            rate_limit_delay_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RpcConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub confirm_timeout_secs: u64,
    pub confirm_poll_interval_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 250,
            max_backoff_ms: 5_000,
            confirm_timeout_secs: 60,
            confirm_poll_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct KoraConfig {
    pub operator_pubkey: String,
    pub operator_keypair_path: Option<String>,
    pub treasury_wallet: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ReclaimConfig {
    /// Slots that must have elapsed since creation before an account may be reclaimed.
    pub min_inactive_slots: u64,
    pub dry_run: bool,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub max_batch_retries: u32,
    pub curve_check: bool,
    pub shards: usize,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            // roughly 30 days at 400ms slots
            min_inactive_slots: 6_480_000,
            dry_run: true,
            batch_size: 50,
            batch_delay_ms: 2_000,
            max_batch_retries: 3,
            curve_check: true,
            shards: 1,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Json,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite database file, or the index JSON file for the json backend.
    pub index_path: String,
    /// Audit JSON file (json backend only; sqlite keeps audit in `index_path`).
    pub audit_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            index_path: "kora_reclaim.db".to_string(),
            audit_path: "audit_log.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AlertConfig {
    pub materiality_threshold_lamports: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            materiality_threshold_lamports: 10_000_000,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub authorized_users: Vec<u64>,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("KORA")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Fatal-configuration gate. Must pass before any account is processed.
    pub fn validate(&self, mode: ExecutionMode) -> Result<()> {
        let treasury = self.treasury_wallet()?;
        let operator = self.operator_pubkey()?;

        if treasury == operator {
            return Err(ReclaimError::Config(
                "Treasury wallet must differ from the operator".to_string(),
            ));
        }
        if self.reclaim.batch_size == 0 {
            return Err(ReclaimError::Config("reclaim.batch_size must be > 0".to_string()));
        }
        if self.reclaim.shards == 0 {
            return Err(ReclaimError::Config("reclaim.shards must be > 0".to_string()));
        }
        if self.reclaim.shards > 1 && self.storage.backend == StorageBackend::Json {
            return Err(ReclaimError::Config(
                "Sharded runs need the sqlite backend; the json store is single-owner".to_string(),
            ));
        }
        if self.rpc.max_attempts == 0 {
            return Err(ReclaimError::Config("rpc.max_attempts must be > 0".to_string()));
        }

        if mode == ExecutionMode::Live {
            let keypair = self.load_operator_keypair()?;
            if solana_sdk::signer::Signer::pubkey(&keypair) != operator {
                return Err(ReclaimError::Config(
                    "Operator keypair does not match kora.operator_pubkey".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn operator_pubkey(&self) -> Result<Pubkey> {
        Pubkey::from_str(&self.kora.operator_pubkey)
            .map_err(|e| ReclaimError::Config(format!("Invalid operator pubkey: {}", e)))
    }

    pub fn treasury_wallet(&self) -> Result<Pubkey> {
        Pubkey::from_str(&self.kora.treasury_wallet)
            .map_err(|e| ReclaimError::Config(format!("Invalid treasury wallet: {}", e)))
    }

    /// Loads the operator credential from `KORA_OPERATOR_SECRET` or the configured keypair file.
    pub fn load_operator_keypair(&self) -> Result<Keypair> {
        if let Ok(secret) = std::env::var(OPERATOR_SECRET_ENV) {
            return keypair_from_base58(secret.trim());
        }

        let path = self.kora.operator_keypair_path.as_deref().ok_or_else(|| {
            ReclaimError::Config(format!(
                "No operator credential: set kora.operator_keypair_path or {}",
                OPERATOR_SECRET_ENV
            ))
        })?;

        read_keypair_file(path)
            .map_err(|e| ReclaimError::Config(format!("Failed to read keypair {}: {}", path, e)))
    }

    pub fn commitment_config(&self) -> CommitmentConfig {
        CommitmentConfig::from_str(&self.solana.commitment)
            .unwrap_or_else(|_| CommitmentConfig::confirmed())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.rpc.max_attempts,
            base_backoff_ms: self.rpc.base_backoff_ms,
            max_backoff_ms: self.rpc.max_backoff_ms,
            ..RetryPolicy::default()
        }
    }
}

fn keypair_from_base58(secret: &str) -> Result<Keypair> {
    let bytes = bs58::decode(secret)
        .into_vec()
        .map_err(|e| ReclaimError::Config(format!("Operator secret is not base58: {}", e)))?;
    Keypair::from_bytes(&bytes)
        .map_err(|e| ReclaimError::Config(format!("Operator secret is not a keypair: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::{write_keypair_file, Signer};

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.kora.operator_pubkey = Keypair::new().pubkey().to_string();
        config.kora.treasury_wallet = Keypair::new().pubkey().to_string();
        config
    }

    #[test]
    fn test_dry_run_validation_passes_without_credential() {
        let config = valid_config();
        assert!(config.validate(ExecutionMode::DryRun).is_ok());
    }

    #[test]
    fn test_invalid_treasury_is_fatal() {
        let mut config = valid_config();
        config.kora.treasury_wallet = "not-a-pubkey".to_string();
        let err = config.validate(ExecutionMode::DryRun).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_treasury_equal_to_operator_rejected() {
        let mut config = valid_config();
        config.kora.treasury_wallet = config.kora.operator_pubkey.clone();
        assert!(config.validate(ExecutionMode::DryRun).is_err());
    }

    #[test]
    fn test_sharding_requires_sqlite() {
        let mut config = valid_config();
        config.reclaim.shards = 4;
        config.storage.backend = StorageBackend::Json;
        assert!(config.validate(ExecutionMode::DryRun).is_err());

        config.storage.backend = StorageBackend::Sqlite;
        assert!(config.validate(ExecutionMode::DryRun).is_ok());
    }

    #[test]
    fn test_live_mode_requires_matching_keypair() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("operator.json");
        let keypair = Keypair::new();
        write_keypair_file(&keypair, &path).unwrap();

        let mut config = valid_config();
        config.kora.operator_keypair_path = Some(path.to_string_lossy().to_string());
        assert!(config.validate(ExecutionMode::Live).is_err());

        config.kora.operator_pubkey = keypair.pubkey().to_string();
        assert!(config.validate(ExecutionMode::Live).is_ok());
    }

    #[test]
    fn test_base58_secret_roundtrip() {
        let keypair = Keypair::new();
        let encoded = bs58::encode(keypair.to_bytes()).into_string();
        let decoded = keypair_from_base58(&encoded).unwrap();
        assert_eq!(decoded.pubkey(), keypair.pubkey());
    }
}
