mod cli;

use anyhow::Context;
use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use solana_sdk::pubkey::Pubkey;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::{commands::OutputFormat, Cli, Commands};
use kora_safe_reclaim::{
    events::EventBus,
    kora::{monitor::audit_registered, KoraMonitor},
    reclaim::{BatchRunner, ExecutionMode, Scheduler},
    report::DashboardSnapshot,
    solana::{ChainConnection, RentCalculator, RpcChain},
    storage::{open_stores, AuditAction},
    telegram::AutoNotifier,
    utils, Config,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("kora_safe_reclaim=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Init => initialize(&config, &cli.config),
        Commands::Import { file } => import_accounts(&config, &file),
        Commands::Export { file } => export_accounts(&config, &file),
        Commands::Discover { limit } => discover_accounts(&config, limit).await,
        Commands::List { format } => list_accounts(&config, format),
        Commands::Process {
            dry_run,
            accounts,
            shards,
            yes,
        } => process_accounts(&config, dry_run, &accounts, shards, yes).await,
        Commands::Auto { interval, dry_run } => {
            info!(interval, "Starting automated reclaim service");
            run_auto_service(&config, interval, dry_run).await
        }
        Commands::Stats { format } => show_stats(&config, format),
        Commands::Audit { limit } => show_audit(&config, limit),
    };

    if let Err(e) = result {
        eprintln!("{}", format!("Error: {:#}", e).red());
        std::process::exit(1);
    }
}

fn initialize(config: &Config, config_path: &str) -> anyhow::Result<()> {
    println!("{}", "Initializing Kora Safe Reclaim...".green());

    if Path::new(config_path).exists() {
        println!("{} {}", "✓ Using existing configuration".green(), config_path);
    } else {
        let rendered = toml::to_string_pretty(&Config::default())?;
        std::fs::write(config_path, rendered)
            .with_context(|| format!("writing {}", config_path))?;
        println!("{} {}", "✓ Default configuration written to".green(), config_path);
    }

    open_stores(&config.storage)?;
    println!("{}", "✓ Storage initialized".green());

    println!("\n{}", "Configuration:".cyan());
    println!("  RPC URL:        {}", config.solana.rpc_url);
    println!("  Operator:       {}", config.kora.operator_pubkey);
    println!("  Treasury:       {}", config.kora.treasury_wallet);
    println!("  Storage:        {:?} ({})", config.storage.backend, config.storage.index_path);
    println!("  Dry Run:        {}", config.reclaim.dry_run);
    println!("  Min Inactive:   {} slots", config.reclaim.min_inactive_slots);

    println!("\n{}", "Ready to use! Try running:".cyan());
    println!("  {} to index sponsored accounts", "kora-safe-reclaim discover".yellow());
    println!("  {} to preview reclaims", "kora-safe-reclaim process --dry-run".yellow());
    println!("  {} to view statistics", "kora-safe-reclaim stats".yellow());
    Ok(())
}

fn import_accounts(config: &Config, file: &str) -> anyhow::Result<()> {
    let (mut index, mut audit) = open_stores(&config.storage)?;
    let report = index.import_file(file)?;
    audit_registered(&index, &mut audit, &report, "import")?;

    println!("{}", "Import complete".green());
    println!("  Imported:    {}", report.imported.to_string().green());
    println!("  Duplicates:  {}", report.duplicates);
    println!("  Invalid:     {}", report.invalid.to_string().yellow());
    Ok(())
}

fn export_accounts(config: &Config, file: &str) -> anyhow::Result<()> {
    let (index, _audit) = open_stores(&config.storage)?;
    let written = index.export_file(file)?;
    println!("{} {} accounts to {}", "✓ Exported".green(), written, file);
    Ok(())
}

async fn discover_accounts(config: &Config, limit: usize) -> anyhow::Result<()> {
    let operator = config.operator_pubkey()?;
    let chain: Arc<dyn ChainConnection> = Arc::new(RpcChain::new(
        &config.solana.rpc_url,
        config.commitment_config(),
        config.solana.rate_limit_delay_ms,
    ));
    let (mut index, mut audit) = open_stores(&config.storage)?;

    let spinner = spinner(format!("Walking {} signatures of {}", limit, operator));
    let monitor = KoraMonitor::new(chain, operator, config.retry_policy());
    let report = monitor.sync_index(&mut index, &mut audit, limit).await;
    spinner.finish_and_clear();
    let report = report?;

    println!("{}", "Discovery complete".green());
    println!("  New accounts:  {}", report.imported.to_string().green());
    println!("  Already known: {}", report.duplicates);
    println!("  Invalid:       {}", report.invalid);
    Ok(())
}

fn list_accounts(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    let (index, _audit) = open_stores(&config.storage)?;
    let records = index.list()?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{}", "No tracked accounts. Run `discover` or `import` first.".yellow());
        return Ok(());
    }

    let widths = [16, 16, 14, 12, 24, 24];
    utils::print_table_border(116);
    utils::print_table_row(
        &["Address", "Claimed Owner", "Rent Paid", "Slot", "Created", "Last Checked"],
        &widths,
    );
    utils::print_table_border(116);
    for record in &records {
        let address = record.address.to_string();
        let owner = record.claimed_owner_program.to_string();
        let rent = RentCalculator::format_sol(record.rent_paid_at_creation);
        let slot = record.creation_height.to_string();
        let created = utils::format_timestamp(record.created_at);
        let checked = record
            .last_checked_at
            .map(utils::format_timestamp)
            .unwrap_or_else(|| "never".to_string());
        let (address, owner) = (utils::format_pubkey(&address), utils::format_pubkey(&owner));
        let columns: [&str; 6] = [&address, &owner, &rent, &slot, &created, &checked];
        utils::print_table_row(&columns, &widths);
    }
    utils::print_table_border(116);
    println!("{} tracked accounts", records.len());
    Ok(())
}

async fn process_accounts(
    config: &Config,
    dry_run: bool,
    accounts: &[String],
    shards: Option<usize>,
    yes: bool,
) -> anyhow::Result<()> {
    let mode = ExecutionMode::from_dry_run(dry_run || config.reclaim.dry_run);
    let mut config = config.clone();
    if let Some(shards) = shards {
        config.reclaim.shards = shards;
    }
    config.validate(mode)?;

    let addresses = if accounts.is_empty() {
        let (index, _audit) = open_stores(&config.storage)?;
        index.addresses()?
    } else {
        accounts
            .iter()
            .map(|a| Pubkey::from_str(a).with_context(|| format!("invalid address {}", a)))
            .collect::<anyhow::Result<Vec<_>>>()?
    };

    if addresses.is_empty() {
        println!("{}", "Nothing to process".yellow());
        return Ok(());
    }

    println!("Mode: {}", mode.to_string().cyan());
    if mode == ExecutionMode::Live && !yes {
        let prompt = format!(
            "Reclaim approved accounts among {} to {}?",
            addresses.len(),
            config.kora.treasury_wallet
        );
        if !utils::confirm_action(&prompt)? {
            println!("{}", "Cancelled".yellow());
            return Ok(());
        }
    }

    let events = EventBus::new(config.alerts.materiality_threshold_lamports);
    let notifications = AutoNotifier::new(&config).map(|n| Arc::new(n).spawn(events.subscribe()));

    let shard_count = config.reclaim.shards;
    let runner = BatchRunner::new(config, events);
    let spinner = spinner(format!("Processing {} accounts", addresses.len()));
    let summary = runner.process_sharded(&addresses, shard_count, mode).await;
    spinner.finish_and_clear();

    // closing the bus lets the notifier drain and exit
    drop(runner);
    if let Some(handle) = notifications {
        AutoNotifier::finish(handle).await;
    }

    summary?.print_summary();
    Ok(())
}

async fn run_auto_service(config: &Config, interval: u64, dry_run: bool) -> anyhow::Result<()> {
    let mode = ExecutionMode::from_dry_run(dry_run || config.reclaim.dry_run);
    println!("{}", "Starting automated reclaim service...".green());
    println!("Interval: {} seconds", interval);
    println!("Mode: {}", mode);

    let events = EventBus::new(config.alerts.materiality_threshold_lamports);
    let notifier = AutoNotifier::new(config).map(Arc::new);
    if let Some(notifier) = &notifier {
        println!("{}", "✓ Telegram notifications enabled".green());
        notifier.clone().spawn(events.subscribe());
    }

    let runner = BatchRunner::new(config.clone(), events);
    Scheduler::new(runner, mode)
        .with_notifier(notifier)
        .run(Duration::from_secs(interval))
        .await?;
    Ok(())
}

fn show_stats(config: &Config, format: OutputFormat) -> anyhow::Result<()> {
    let (index, audit) = open_stores(&config.storage)?;
    let snapshot = DashboardSnapshot::build(&index.list()?, &audit.entries()?);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("\n{}", "=== Kora Safe Reclaim Statistics ===".bold());
    println!("Tracked Accounts:  {}", snapshot.tracked_accounts);
    println!("Rent Tracked:      {}", utils::format_sol(snapshot.total_rent_tracked));
    println!("Total Reclaimed:   {}", utils::format_sol(snapshot.total_reclaimed));
    println!("Total Simulated:   {}", utils::format_sol(snapshot.total_simulated));

    println!("\n{}", "Audit actions:".bold());
    for (action, count) in &snapshot.action_counts {
        println!("  {:<12} {}", action.as_str(), count);
    }

    if !snapshot.daily_confirmed.is_empty() {
        println!("\n{}", "Confirmed per day:".bold());
        for (day, total) in &snapshot.daily_confirmed {
            println!(
                "  {}  {:>4}  {}",
                day,
                total.count,
                RentCalculator::format_sol(total.lamports)
            );
        }
    }

    let failed = snapshot.count(AuditAction::Failed);
    if failed > 0 {
        println!("\n{} {} failed reclaims, see `audit`", "!".red(), failed);
    }
    Ok(())
}

fn show_audit(config: &Config, limit: usize) -> anyhow::Result<()> {
    let (_index, audit) = open_stores(&config.storage)?;
    let entries = audit.entries()?;
    let start = entries.len().saturating_sub(limit);

    for entry in &entries[start..] {
        let action = match entry.action {
            AuditAction::Confirmed | AuditAction::Approved => entry.action.as_str().green(),
            AuditAction::Rejected | AuditAction::Failed => entry.action.as_str().red(),
            AuditAction::Skipped => entry.action.as_str().yellow(),
            _ => entry.action.as_str().normal(),
        };
        println!(
            "{}  {:<10}  {:<44}  {}",
            utils::format_timestamp(entry.timestamp),
            action,
            entry.address.as_deref().unwrap_or("-"),
            serde_json::Value::Object(entry.details.clone())
        );
    }
    println!("{} of {} entries", entries.len() - start, entries.len());
    Ok(())
}

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}
