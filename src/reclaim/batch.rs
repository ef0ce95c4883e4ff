use colored::Colorize;
use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::{
    config::{Config, StorageBackend},
    error::{ReclaimError, Result},
    events::EventBus,
    reclaim::{
        engine::{DryRunSubmitter, ExecutionMode, ReclaimAction, ReclaimStatus, RpcSubmitter, Submitter},
        pipeline::ReclaimPipeline,
    },
    solana::{
        client::{ChainConnection, RpcChain},
        rent::RentCalculator,
        retry::RetryPolicy,
    },
    storage::open_stores,
    telegram::AutoNotifier,
};

/// Aggregate outcome of one or more pipeline runs
#[derive(Debug, Default, Clone)]
pub struct BatchSummary {
    pub total_accounts: usize,
    pub approved: usize,
    pub rejected: usize,
    pub simulated: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_reclaimed: u64,
    pub total_simulated: u64,
    pub actions: Vec<ReclaimAction>,
    /// Address and reason for every rejection
    pub rejections: Vec<(Pubkey, String)>,
}

impl BatchSummary {
    pub fn new(total_accounts: usize) -> Self {
        Self {
            total_accounts,
            ..Self::default()
        }
    }

    pub fn record_action(&mut self, action: ReclaimAction) {
        match action.status {
            ReclaimStatus::Simulated => {
                self.simulated += 1;
                self.total_simulated += action.amount;
            }
            ReclaimStatus::Confirmed => {
                self.confirmed += 1;
                self.total_reclaimed += action.amount;
            }
            ReclaimStatus::Failed => self.failed += 1,
            ReclaimStatus::Pending | ReclaimStatus::Submitted => {}
        }
        self.actions.push(action);
    }

    pub fn record_rejection(&mut self, address: Pubkey, reason: String) {
        self.rejected += 1;
        self.rejections.push((address, reason));
    }

    pub fn merge(&mut self, other: BatchSummary) {
        self.total_accounts += other.total_accounts;
        self.approved += other.approved;
        self.rejected += other.rejected;
        self.simulated += other.simulated;
        self.confirmed += other.confirmed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.total_reclaimed += other.total_reclaimed;
        self.total_simulated += other.total_simulated;
        self.actions.extend(other.actions);
        self.rejections.extend(other.rejections);
    }

    /// Print a formatted summary to console
    pub fn print_summary(&self) {
        println!("\n{}", "=== Reclaim Batch Summary ===".bold());
        println!("Total Accounts:  {}", self.total_accounts);
        println!("Approved:        {}", self.approved.to_string().green());
        println!("Rejected:        {}", self.rejected.to_string().yellow());
        println!("Simulated:       {}", self.simulated);
        println!("Confirmed:       {} ✓", self.confirmed.to_string().green());
        println!("Failed:          {} ✗", self.failed.to_string().red());
        println!("Skipped:         {}", self.skipped);
        if self.total_simulated > 0 {
            println!("Would Reclaim:   {}", RentCalculator::format_sol(self.total_simulated));
        }
        println!("Total Reclaimed: {}", RentCalculator::format_sol(self.total_reclaimed));

        if !self.rejections.is_empty() {
            println!("\n{}", "Rejections:".bold());
            for (address, reason) in &self.rejections {
                println!("  {}  {}", address, reason.yellow());
            }
        }
        println!("{}", "=============================".bold());
    }
}

pub type Connector = Arc<dyn Fn() -> Arc<dyn ChainConnection> + Send + Sync>;

/// Builds and runs pipelines. Each run gets its own connection, stores and
/// credential.
pub struct BatchRunner {
    config: Config,
    events: EventBus,
    connect: Connector,
}

impl BatchRunner {
    pub fn new(config: Config, events: EventBus) -> Self {
        let solana = config.solana.clone();
        let commitment = config.commitment_config();
        let connect: Connector = Arc::new(move || {
            Arc::new(RpcChain::new(&solana.rpc_url, commitment, solana.rate_limit_delay_ms))
                as Arc<dyn ChainConnection>
        });
        Self::with_connector(config, events, connect)
    }

    pub fn with_connector(config: Config, events: EventBus, connect: Connector) -> Self {
        Self {
            config,
            events,
            connect,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// One sequential pipeline over `addresses`
    pub async fn process_batch(&self, addresses: &[Pubkey], mode: ExecutionMode) -> Result<BatchSummary> {
        self.config.validate(mode)?;

        let chain = (self.connect)();
        let submitter: Arc<dyn Submitter> = match mode {
            ExecutionMode::DryRun => Arc::new(DryRunSubmitter::new(self.config.operator_pubkey()?)),
            ExecutionMode::Live => Arc::new(RpcSubmitter::from_config(
                chain.clone(),
                self.config.load_operator_keypair()?,
                &self.config,
            )),
        };
        let (index, audit) = open_stores(&self.config.storage)?;

        let mut pipeline = ReclaimPipeline::new(
            chain,
            submitter,
            &self.config,
            index,
            audit,
            self.events.clone(),
        )?;
        pipeline.process_batch(addresses).await
    }

    /// Runs disjoint shards concurrently and merges their summaries.
    pub async fn process_sharded(
        &self,
        addresses: &[Pubkey],
        shards: usize,
        mode: ExecutionMode,
    ) -> Result<BatchSummary> {
        if shards <= 1 || addresses.len() <= 1 {
            return self.process_batch(addresses, mode).await;
        }
        if self.config.storage.backend == StorageBackend::Json {
            return Err(ReclaimError::Config(
                "Sharded runs need the sqlite backend".to_string(),
            ));
        }

        let shard_size = (addresses.len() + shards - 1) / shards;
        info!(
            accounts = addresses.len(),
            shards = addresses.chunks(shard_size).len(),
            "Running sharded batch"
        );

        let results = join_all(
            addresses
                .chunks(shard_size)
                .map(|shard| self.process_batch(shard, mode)),
        )
        .await;

        let mut summary = BatchSummary::default();
        for result in results {
            summary.merge(result?);
        }
        Ok(summary)
    }
}

/// Periodic driver over the whole index
pub struct Scheduler {
    runner: BatchRunner,
    mode: ExecutionMode,
    notifier: Option<Arc<AutoNotifier>>,
}

impl Scheduler {
    pub fn new(runner: BatchRunner, mode: ExecutionMode) -> Self {
        Self {
            runner,
            mode,
            notifier: None,
        }
    }

    /// Sends a summary after every cycle and reports cycle errors.
    pub fn with_notifier(mut self, notifier: Option<Arc<AutoNotifier>>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Runs a cycle every `interval` until a fatal error occurs.
    pub async fn run(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(ReclaimError::Config("Scheduler interval must be > 0".to_string()));
        }
        info!(interval_secs = interval.as_secs(), mode = %self.mode, "Scheduler started");
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;
            match self.run_cycle().await {
                Ok(summary) => {
                    info!(
                        accounts = summary.total_accounts,
                        confirmed = summary.confirmed,
                        simulated = summary.simulated,
                        rejected = summary.rejected,
                        failed = summary.failed,
                        "Cycle complete"
                    );
                    if let Some(notifier) = &self.notifier {
                        if summary.total_accounts > 0 {
                            notifier.notify_batch_complete(&summary).await;
                        }
                    }
                }
                Err(e) => {
                    if let Some(notifier) = &self.notifier {
                        notifier.notify_error(&e.to_string()).await;
                    }
                    if e.is_fatal() {
                        error!(error = %e, "Fatal error, stopping scheduler");
                        return Err(e);
                    }
                    warn!(error = %e, "Cycle failed");
                }
            }
        }
    }

    /// One pass over every tracked address, chunked by `batch_size`.
    pub async fn run_cycle(&self) -> Result<BatchSummary> {
        let config = self.runner.config();
        config.validate(self.mode)?;

        let addresses = {
            let (index, _) = open_stores(&config.storage)?;
            index.addresses()?
        };
        if addresses.is_empty() {
            info!("No tracked accounts");
            return Ok(BatchSummary::default());
        }

        let batch_size = config.reclaim.batch_size;
        let delay = Duration::from_millis(config.reclaim.batch_delay_ms);
        let chunks: Vec<&[Pubkey]> = addresses.chunks(batch_size).collect();

        let mut summary = BatchSummary::default();
        for (position, chunk) in chunks.iter().enumerate() {
            info!("Processing chunk {}/{}", position + 1, chunks.len());
            summary.merge(self.run_chunk(chunk).await?);

            if position + 1 < chunks.len() {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(summary)
    }

    /// Retries a failed chunk with backoff. A chunk that keeps failing is
    /// counted as skipped.
    async fn run_chunk(&self, chunk: &[Pubkey]) -> Result<BatchSummary> {
        let config = self.runner.config();
        let backoff = RetryPolicy {
            max_attempts: config.reclaim.max_batch_retries + 1,
            base_backoff_ms: config.reclaim.batch_delay_ms,
            ..config.retry_policy()
        };

        let mut attempt = 0;
        loop {
            match self
                .runner
                .process_sharded(chunk, config.reclaim.shards, self.mode)
                .await
            {
                Ok(summary) => return Ok(summary),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) if attempt < config.reclaim.max_batch_retries => {
                    warn!(attempt = attempt + 1, error = %e, "Chunk failed, retrying");
                    tokio::time::sleep(backoff.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(accounts = chunk.len(), error = %e, "Chunk failed after retries");
                    let mut summary = BatchSummary::new(chunk.len());
                    summary.skipped = chunk.len();
                    return Ok(summary);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::AuditAction;
    use crate::test_utils::{on_curve_address, record_for, FakeChain};
    use solana_sdk::signature::{Keypair, Signer};
    use solana_sdk::system_program;

    fn sqlite_config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.kora.operator_pubkey = Keypair::new().pubkey().to_string();
        config.kora.treasury_wallet = Keypair::new().pubkey().to_string();
        config.reclaim.min_inactive_slots = 1_000;
        config.reclaim.batch_size = 2;
        config.reclaim.batch_delay_ms = 0;
        config.rpc.base_backoff_ms = 0;
        config.rpc.max_backoff_ms = 0;
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.index_path = dir.path().join("reclaim.db").to_string_lossy().to_string();
        config
    }

    fn seed(config: &Config, chain: &FakeChain, count: usize) -> Vec<Pubkey> {
        let (mut index, _) = open_stores(&config.storage).unwrap();
        (0..count)
            .map(|_| {
                let address = on_curve_address();
                index.register(&record_for(address, system_program::id(), 0)).unwrap();
                chain.set_account(address, system_program::id(), 890_880, vec![]);
                address
            })
            .collect()
    }

    fn runner(config: Config, chain: Arc<FakeChain>) -> BatchRunner {
        let connect: Connector = Arc::new(move || chain.clone() as Arc<dyn ChainConnection>);
        BatchRunner::with_connector(config, EventBus::new(0), connect)
    }

    #[tokio::test]
    async fn test_sharded_run_covers_every_address_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = sqlite_config(&dir);
        let chain = Arc::new(FakeChain::new(10_000));
        let addresses = seed(&config, &chain, 5);

        let summary = runner(config.clone(), chain.clone())
            .process_sharded(&addresses, 3, ExecutionMode::DryRun)
            .await
            .unwrap();

        assert_eq!(summary.total_accounts, 5);
        assert_eq!(summary.simulated, 5);
        assert_eq!(summary.total_simulated, 5 * 890_880);
        assert!(chain.sent().is_empty());

        let (_, audit) = open_stores(&config.storage).unwrap();
        assert_eq!(audit.summary().unwrap().count(AuditAction::Simulated), 5);
    }

    #[tokio::test]
    async fn test_json_backend_refuses_shards() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = sqlite_config(&dir);
        config.storage.backend = StorageBackend::Json;
        config.storage.index_path = dir.path().join("index.json").to_string_lossy().to_string();
        config.storage.audit_path = dir.path().join("audit.json").to_string_lossy().to_string();

        let chain = Arc::new(FakeChain::new(10_000));
        let addresses = vec![on_curve_address(), on_curve_address()];
        let err = runner(config, chain)
            .process_sharded(&addresses, 2, ExecutionMode::DryRun)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_invalid_treasury_stops_before_processing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = sqlite_config(&dir);
        let chain = Arc::new(FakeChain::new(10_000));
        let addresses = seed(&config, &chain, 1);
        config.kora.treasury_wallet = "nope".to_string();

        let err = runner(config.clone(), chain)
            .process_batch(&addresses, ExecutionMode::DryRun)
            .await
            .unwrap_err();
        assert!(err.is_fatal());

        let (_, audit) = open_stores(&config.storage).unwrap();
        assert_eq!(audit.summary().unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_scheduler_cycle_walks_index_in_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let config = sqlite_config(&dir);
        let chain = Arc::new(FakeChain::new(10_000));
        seed(&config, &chain, 5);

        let scheduler = Scheduler::new(runner(config, chain), ExecutionMode::DryRun);
        let summary = scheduler.run_cycle().await.unwrap();
        assert_eq!(summary.total_accounts, 5);
        assert_eq!(summary.simulated, 5);
    }

    #[tokio::test]
    async fn test_zero_interval_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = sqlite_config(&dir);
        let chain = Arc::new(FakeChain::new(10_000));
        seed(&config, &chain, 1);

        let scheduler = Scheduler::new(runner(config.clone(), chain), ExecutionMode::DryRun);
        let err = scheduler.run(Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, ReclaimError::Config(_)));

        let (_, audit) = open_stores(&config.storage).unwrap();
        assert_eq!(audit.summary().unwrap().total, 0);
    }

    #[test]
    fn test_merge_adds_counts() {
        let mut a = BatchSummary::new(2);
        a.rejected = 1;
        a.total_reclaimed = 10;
        let mut b = BatchSummary::new(3);
        b.confirmed = 2;
        b.total_reclaimed = 5;
        a.merge(b);
        assert_eq!(a.total_accounts, 5);
        assert_eq!(a.confirmed, 2);
        assert_eq!(a.total_reclaimed, 15);
    }
}
