use async_trait::async_trait;
use solana_client::{
    client_error::ClientErrorKind,
    nonblocking::rpc_client::RpcClient,
    rpc_client::GetConfirmedSignaturesForAddress2Config,
    rpc_config::RpcTransactionConfig,
};
use solana_sdk::{
    account::Account,
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};
use solana_transaction_status::{EncodedConfirmedTransactionWithStatusMeta, UiTransactionEncoding};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::Result;

/// Network view of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Not yet visible at the configured commitment.
    Pending,
    Succeeded,
    /// Landed but the runtime reported an execution error.
    Failed(String),
}

/// One entry of an address's signature history.
#[derive(Debug, Clone)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub failed: bool,
}

/// The RPC surface the reclaim pipeline depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainConnection: Send + Sync {
    /// `None` when the account does not exist.
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>>;

    async fn get_slot(&self) -> Result<u64>;

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64>;

    async fn get_latest_blockhash(&self) -> Result<Hash>;

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature>;

    async fn get_signature_status(&self, signature: &Signature) -> Result<TxStatus>;

    /// Newest first, paginated with `before`.
    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        before: Option<Signature>,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>>;

    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<EncodedConfirmedTransactionWithStatusMeta>>;
}

/// Minimum spacing between consecutive RPC calls
pub struct RateLimiter {
    delay: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            last_call: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.delay {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// `ChainConnection` backed by a JSON-RPC endpoint.
#[derive(Clone)]
pub struct RpcChain {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
    limiter: Arc<RateLimiter>,
}

impl RpcChain {
    pub fn new(rpc_url: &str, commitment: CommitmentConfig, rate_limit_delay_ms: u64) -> Self {
        Self {
            client: Arc::new(RpcClient::new_with_commitment(rpc_url.to_string(), commitment)),
            commitment,
            limiter: Arc::new(RateLimiter::new(rate_limit_delay_ms)),
        }
    }
}

#[async_trait]
impl ChainConnection for RpcChain {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>> {
        self.limiter.wait().await;
        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await?;
        Ok(response.value)
    }

    async fn get_slot(&self) -> Result<u64> {
        self.limiter.wait().await;
        Ok(self.client.get_slot_with_commitment(self.commitment).await?)
    }

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64> {
        self.limiter.wait().await;
        Ok(self
            .client
            .get_minimum_balance_for_rent_exemption(data_len)
            .await?)
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.limiter.wait().await;
        Ok(self.client.get_latest_blockhash().await?)
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature> {
        self.limiter.wait().await;
        Ok(self.client.send_transaction(transaction).await?)
    }

    async fn get_signature_status(&self, signature: &Signature) -> Result<TxStatus> {
        self.limiter.wait().await;
        let status = self
            .client
            .get_signature_status_with_commitment(signature, self.commitment)
            .await?;
        Ok(match status {
            None => TxStatus::Pending,
            Some(Ok(())) => TxStatus::Succeeded,
            Some(Err(e)) => TxStatus::Failed(e.to_string()),
        })
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        before: Option<Signature>,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>> {
        self.limiter.wait().await;
        let config = GetConfirmedSignaturesForAddress2Config {
            before,
            until: None,
            limit: Some(limit),
            commitment: Some(self.commitment),
        };
        let signatures = self
            .client
            .get_signatures_for_address_with_config(address, config)
            .await?;

        Ok(signatures
            .into_iter()
            .map(|s| SignatureInfo {
                signature: s.signature,
                slot: s.slot,
                block_time: s.block_time,
                failed: s.err.is_some(),
            })
            .collect())
    }

    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<EncodedConfirmedTransactionWithStatusMeta>> {
        self.limiter.wait().await;
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::JsonParsed),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };
        match self.client.get_transaction_with_config(signature, config).await {
            Ok(tx) => Ok(Some(tx)),
            // a null result surfaces as a deserialization failure
            Err(e) if matches!(e.kind(), ClientErrorKind::SerdeJson(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_spaces_calls() {
        let limiter = RateLimiter::new(20);
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
