pub mod config;
pub mod error;
pub mod events;
pub mod kora;
pub mod reclaim;
pub mod report;
pub mod solana;
pub mod storage;
pub mod telegram;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub use config::Config;
pub use error::{ReclaimError, Result};
