/// Lamports per SOL constant
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

pub struct RentCalculator;

impl RentCalculator {
    /// Check if a balance covers the rent-exempt minimum
    pub fn is_rent_exempt(balance: u64, minimum_balance: u64) -> bool {
        balance >= minimum_balance
    }

    /// Lamports held above the rent-exempt minimum
    pub fn excess_over_minimum(balance: u64, minimum_balance: u64) -> u64 {
        balance.saturating_sub(minimum_balance)
    }

    /// Convert lamports to SOL (as f64)
    pub fn lamports_to_sol(lamports: u64) -> f64 {
        lamports as f64 / LAMPORTS_PER_SOL as f64
    }

    /// Format lamports as SOL string with decimals
    pub fn format_sol(lamports: u64) -> String {
        format!("{:.9} SOL", Self::lamports_to_sol(lamports))
    }
}
