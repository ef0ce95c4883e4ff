pub mod accounts;
pub mod client;
pub mod fetcher;
pub mod rent;
pub mod retry;
pub mod state;

pub use accounts::AccountDiscovery;
pub use client::{ChainConnection, RpcChain, TxStatus};
pub use fetcher::{FetchOutcome, StateFetcher};
pub use rent::{RentCalculator, LAMPORTS_PER_SOL};
pub use retry::RetryPolicy;
pub use state::{AccountType, ObservedAccountState};
