use chrono::DateTime;
use colored::Colorize;
use std::io::{self, Write};

use crate::solana::rent::RentCalculator;

/// Format lamports as SOL string with color
pub fn format_sol(lamports: u64) -> String {
    RentCalculator::format_sol(lamports).yellow().to_string()
}

/// Format pubkey truncated for display
pub fn format_pubkey(pubkey: &str) -> String {
    if pubkey.len() <= 12 {
        pubkey.to_string()
    } else {
        format!("{}...{}", &pubkey[..6], &pubkey[pubkey.len() - 6..])
    }
}

/// Format a unix timestamp in human-readable form
pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Prompt user for yes/no confirmation
pub fn confirm_action(prompt: &str) -> io::Result<bool> {
    print!("{} (y/N): ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Print a formatted table border
pub fn print_table_border(width: usize) {
    println!("{}", "=".repeat(width));
}

/// Print a table row with columns
pub fn print_table_row(columns: &[&str], widths: &[usize]) {
    let mut row = String::new();
    for (col, width) in columns.iter().zip(widths) {
        row.push_str(&format!("{:<width$}  ", col, width = *width));
    }
    println!("{}", row.trim_end());
}
