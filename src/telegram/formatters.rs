use crate::{
    events::PipelineEvent,
    reclaim::{batch::BatchSummary, engine::ReclaimStatus},
    solana::rent::RentCalculator,
};

/// Format SOL for Telegram (no ANSI colors)
pub fn format_sol_tg(lamports: u64) -> String {
    format!("{:.9} SOL", RentCalculator::lamports_to_sol(lamports))
}

/// Format pubkey for Telegram with monospace
pub fn format_pubkey_tg(pubkey: &str) -> String {
    if pubkey.len() <= 16 {
        format!("`{}`", pubkey)
    } else {
        format!("`{}...{}`", &pubkey[..8], &pubkey[pubkey.len() - 8..])
    }
}

/// Message for an event worth alerting on. Intermediate transitions
/// (`submitted`) are not forwarded.
pub fn format_event(event: &PipelineEvent) -> Option<String> {
    match event {
        PipelineEvent::Transition {
            address,
            to,
            amount,
            signature,
            error_detail,
            ..
        } => match to {
            ReclaimStatus::Confirmed => Some(format!(
                "✅ *Reclaim Successful*\n\n\
                Account: {}\n\
                Amount: *{}*\n\
                Tx: {}",
                format_pubkey_tg(&address.to_string()),
                format_sol_tg(*amount),
                signature.as_deref().map(format_pubkey_tg).unwrap_or_default()
            )),
            ReclaimStatus::Failed => Some(format!(
                "❌ *Reclaim Failed*\n\n\
                Account: {}\n\
                Amount: {}\n\
                Error: {}\n\n\
                _Check the audit log for details_",
                format_pubkey_tg(&address.to_string()),
                format_sol_tg(*amount),
                error_detail.as_deref().unwrap_or("unknown")
            )),
            ReclaimStatus::Simulated => Some(format!(
                "🧪 *Dry Run*\n\nAccount: {}\nWould reclaim: {}",
                format_pubkey_tg(&address.to_string()),
                format_sol_tg(*amount)
            )),
            ReclaimStatus::Pending | ReclaimStatus::Submitted => None,
        },
        PipelineEvent::Rejected {
            address,
            balance,
            reason,
        } => Some(format!(
            "🛑 *Reclaim Rejected*\n\n\
            Account: {}\n\
            Balance: *{}*\n\
            Reason: {}",
            format_pubkey_tg(&address.to_string()),
            format_sol_tg(*balance),
            reason
        )),
    }
}

pub fn format_summary(summary: &BatchSummary) -> String {
    let emoji = if summary.failed == 0 { "🎉" } else { "📦" };
    format!(
        "{} *Batch Complete*\n\n\
        Accounts: {}\n\
        ✅ Approved: {}\n\
        🛑 Rejected: {}\n\
        🧪 Simulated: {}\n\
        ✔️ Confirmed: {}\n\
        ❌ Failed: {}\n\
        ⏭ Skipped: {}\n\
        💰 Reclaimed: *{}*",
        emoji,
        summary.total_accounts,
        summary.approved,
        summary.rejected,
        summary.simulated,
        summary.confirmed,
        summary.failed,
        summary.skipped,
        format_sol_tg(summary.total_reclaimed)
    )
}
