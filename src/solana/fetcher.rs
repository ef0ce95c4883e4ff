use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    error::{ReclaimError, Result},
    solana::{
        client::ChainConnection,
        retry::{retry_with_backoff, RetryPolicy},
        state::ObservedAccountState,
    },
};

/// Result of resolving one address against the chain.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Observed(ObservedAccountState),
    NotFound,
    /// Retries were exhausted. Treated exactly like `NotFound` downstream.
    Unavailable { attempts: u32, last_error: String },
}

/// Resolves current on-chain state through a retrying connection
pub struct StateFetcher {
    chain: Arc<dyn ChainConnection>,
    policy: RetryPolicy,
    rent_cache: Mutex<HashMap<usize, u64>>,
}

impl StateFetcher {
    pub fn new(chain: Arc<dyn ChainConnection>, policy: RetryPolicy) -> Self {
        Self {
            chain,
            policy,
            rent_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Current slot. Fetched once per batch and reused for every account in it.
    pub async fn current_height(&self) -> Result<u64> {
        retry_with_backoff("get_slot", &self.policy, || self.chain.get_slot())
            .await
            .map_err(|e| e.last_error)
    }

    /// Never propagates transport failures: after the retry budget the
    /// outcome is `Unavailable`, which callers skip.
    pub async fn fetch(&self, address: &Pubkey) -> FetchOutcome {
        let account = match retry_with_backoff("get_account", &self.policy, || {
            self.chain.get_account(address)
        })
        .await
        {
            Ok(Some(account)) => account,
            Ok(None) => {
                debug!(%address, "Account not found on chain");
                return FetchOutcome::NotFound;
            }
            Err(exhausted) => {
                warn!(%address, attempts = exhausted.attempts, error = %exhausted.last_error, "Account fetch failed");
                return FetchOutcome::Unavailable {
                    attempts: exhausted.attempts,
                    last_error: exhausted.last_error.to_string(),
                };
            }
        };

        match self.rent_exempt_minimum(account.data.len()).await {
            Ok(minimum) => FetchOutcome::Observed(ObservedAccountState::from_account(
                *address, account, minimum,
            )),
            Err((attempts, err)) => {
                warn!(%address, error = %err, "Rent-exempt minimum unavailable");
                FetchOutcome::Unavailable {
                    attempts,
                    last_error: err.to_string(),
                }
            }
        }
    }

    async fn rent_exempt_minimum(&self, data_len: usize) -> std::result::Result<u64, (u32, ReclaimError)> {
        if let Some(minimum) = self.rent_cache.lock().await.get(&data_len) {
            return Ok(*minimum);
        }

        let minimum = retry_with_backoff("get_minimum_balance_for_rent_exemption", &self.policy, || {
            self.chain.get_minimum_balance_for_rent_exemption(data_len)
        })
        .await
        .map_err(|e| (e.attempts, e.last_error))?;

        self.rent_cache.lock().await.insert(data_len, minimum);
        Ok(minimum)
    }
}
