use solana_client::client_error::{ClientError, ClientErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReclaimError {
    #[error("Solana RPC error: {0}")]
    SolanaRpc(#[from] ClientError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid pubkey: {0}")]
    ParsePubkey(#[from] solana_sdk::pubkey::ParsePubkeyError),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Audit log unwritable: {0}")]
    AuditUnwritable(String),

    #[error("Invalid reclaim transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Unsupported account type for reclaim: {0}")]
    Unsupported(String),

    #[error("Signing failed: {0}")]
    Signing(#[from] solana_sdk::signer::SignerError),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReclaimError {
    /// Whether the failure is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            ReclaimError::Transport(_) | ReclaimError::Timeout(_) => true,
            ReclaimError::SolanaRpc(e) => matches!(
                e.kind(),
                ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_)
            ),
            _ => false,
        }
    }

    /// Errors that must halt the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReclaimError::Config(_) | ReclaimError::AuditUnwritable(_))
    }
}

pub type Result<T> = std::result::Result<T, ReclaimError>;
