use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "kora-safe-reclaim")]
#[command(about = "Safety-gated rent reclaim for Kora-sponsored Solana accounts")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    pub config: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default configuration and initialize storage
    Init,

    /// Register tracked accounts from a JSON array file
    Import {
        /// Path to the JSON file
        file: String,
    },

    /// Write the account index to a JSON array file
    Export {
        /// Destination path
        file: String,
    },

    /// Find accounts sponsored by the operator and add them to the index
    Discover {
        /// Max signatures to walk in the operator's history
        #[arg(short, long, default_value = "1000")]
        limit: usize,
    },

    /// List tracked accounts
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Run the safety pipeline over tracked accounts
    Process {
        /// Simulate reclaims without sending transactions
        #[arg(long)]
        dry_run: bool,

        /// Only process these addresses (repeatable)
        #[arg(short, long = "account")]
        accounts: Vec<String>,

        /// Concurrent shards (overrides reclaim.shards)
        #[arg(long)]
        shards: Option<usize>,

        /// Skip confirmation prompt in live mode
        #[arg(short, long)]
        yes: bool,
    },

    /// Run the pipeline periodically over the whole index
    Auto {
        /// Check interval in seconds
        #[arg(short, long, default_value = "3600")]
        interval: u64,

        /// Dry run mode (don't actually reclaim)
        #[arg(long)]
        dry_run: bool,
    },

    /// Show statistics and reports
    Stats {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show the most recent audit entries
    Audit {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_accepts_repeated_accounts() {
        let cli = Cli::try_parse_from([
            "kora-safe-reclaim",
            "process",
            "--dry-run",
            "--account",
            "A",
            "--account",
            "B",
            "--shards",
            "2",
        ])
        .unwrap();

        match cli.command {
            Commands::Process { dry_run, accounts, shards, yes } => {
                assert!(dry_run);
                assert_eq!(accounts, vec!["A", "B"]);
                assert_eq!(shards, Some(2));
                assert!(!yes);
            }
            _ => panic!("expected process"),
        }
        assert_eq!(cli.config, "config.toml");
    }

    #[test]
    fn test_global_config_and_format() {
        let cli = Cli::try_parse_from(["kora-safe-reclaim", "stats", "--format", "json", "-c", "alt.toml"])
            .unwrap();
        assert_eq!(cli.config, "alt.toml");
        assert!(matches!(cli.command, Commands::Stats { format: OutputFormat::Json }));
    }
}
