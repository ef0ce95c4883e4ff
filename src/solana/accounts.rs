use chrono::Utc;
use serde_json::Value;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, EncodedTransaction, UiInstruction, UiMessage,
    UiParsedInstruction,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    error::Result,
    solana::{
        client::ChainConnection,
        retry::{retry_with_backoff, RetryPolicy},
    },
    storage::models::TrackedAccountRecord,
};

/// Max signatures per `getSignaturesForAddress` call
const PAGE_SIZE: usize = 1000;

/// Finds accounts created in transactions paid for by the operator
pub struct AccountDiscovery {
    chain: Arc<dyn ChainConnection>,
    fee_payer: Pubkey,
    policy: RetryPolicy,
}

impl AccountDiscovery {
    pub fn new(chain: Arc<dyn ChainConnection>, fee_payer: Pubkey, policy: RetryPolicy) -> Self {
        Self {
            chain,
            fee_payer,
            policy,
        }
    }

    /// Walks the fee payer's history newest first, up to `max_signatures`.
    pub async fn discover(&self, max_signatures: usize) -> Result<Vec<TrackedAccountRecord>> {
        info!(fee_payer = %self.fee_payer, max_signatures, "Discovering sponsored accounts");

        let mut records = Vec::new();
        let mut before: Option<Signature> = None;
        let mut fetched = 0;

        while fetched < max_signatures {
            let limit = PAGE_SIZE.min(max_signatures - fetched);
            let page = retry_with_backoff("get_signatures_for_address", &self.policy, || {
                self.chain.get_signatures_for_address(&self.fee_payer, before, limit)
            })
            .await
            .map_err(|e| e.last_error)?;

            if page.is_empty() {
                break;
            }
            debug!(signatures = page.len(), "Processing signature page");

            for info in page.iter().filter(|s| !s.failed) {
                let signature = match Signature::from_str(&info.signature) {
                    Ok(signature) => signature,
                    Err(e) => {
                        warn!(signature = %info.signature, error = %e, "Unparseable signature");
                        continue;
                    }
                };

                let tx = match retry_with_backoff("get_transaction", &self.policy, || {
                    self.chain.get_transaction(&signature)
                })
                .await
                {
                    Ok(tx) => tx,
                    Err(exhausted) => {
                        warn!(
                            signature = %info.signature,
                            attempts = exhausted.attempts,
                            error = %exhausted.last_error,
                            "Transaction unavailable, skipping"
                        );
                        continue;
                    }
                };

                if let Some(tx) = tx {
                    records.extend(parse_transaction(&tx, &info.signature, &self.fee_payer));
                }
            }

            fetched += page.len();
            before = page.last().and_then(|s| Signature::from_str(&s.signature).ok());
            if page.len() < limit || before.is_none() {
                break;
            }
        }

        info!(discovered = records.len(), "Discovery complete");
        Ok(records)
    }
}

/// Creation records from every top-level parsed instruction in `tx`.
/// Transactions not paid for by `fee_payer` yield nothing.
pub fn parse_transaction(
    tx: &EncodedConfirmedTransactionWithStatusMeta,
    signature: &str,
    fee_payer: &Pubkey,
) -> Vec<TrackedAccountRecord> {
    if tx
        .transaction
        .meta
        .as_ref()
        .map(|m| m.err.is_some())
        .unwrap_or(false)
    {
        return Vec::new();
    }

    let message = match &tx.transaction.transaction {
        EncodedTransaction::Json(ui_tx) => &ui_tx.message,
        _ => return Vec::new(),
    };
    let parsed = match message {
        UiMessage::Parsed(parsed) => parsed,
        UiMessage::Raw(_) => return Vec::new(),
    };

    let payer = parsed
        .account_keys
        .first()
        .and_then(|key| Pubkey::from_str(&key.pubkey).ok());
    if payer.as_ref() != Some(fee_payer) {
        debug!(signature, "Not paid by the operator, ignoring");
        return Vec::new();
    }

    parsed
        .instructions
        .iter()
        .filter_map(|instruction| match instruction {
            UiInstruction::Parsed(UiParsedInstruction::Parsed(parsed)) => parse_creation(
                &parsed.program,
                &parsed.parsed,
                signature,
                tx.slot,
                tx.block_time,
            ),
            _ => None,
        })
        .collect()
}

/// Recognises account creation in one `jsonParsed` instruction.
///
/// `system` createAccount / createAccountWithSeed claim the instruction's
/// `owner`; `spl-token` initializeAccount variants claim the token program.
pub fn parse_creation(
    program: &str,
    parsed: &Value,
    signature: &str,
    slot: u64,
    block_time: Option<i64>,
) -> Option<TrackedAccountRecord> {
    let kind = parsed.get("type")?.as_str()?;
    let info = parsed.get("info")?;
    let pubkey_field = |name: &str| info.get(name).and_then(Value::as_str).and_then(|s| Pubkey::from_str(s).ok());

    let (address, claimed_owner_program, rent) = match (program, kind) {
        ("system", "createAccount") | ("system", "createAccountWithSeed") => (
            pubkey_field("newAccount")?,
            pubkey_field("owner")?,
            info.get("lamports").and_then(Value::as_u64).unwrap_or(0),
        ),
        ("spl-token", "initializeAccount")
        | ("spl-token", "initializeAccount2")
        | ("spl-token", "initializeAccount3") => (pubkey_field("account")?, spl_token::id(), 0),
        _ => return None,
    };

    Some(TrackedAccountRecord {
        address,
        claimed_owner_program,
        rent_paid_at_creation: rent,
        creation_height: slot,
        creation_proof_ref: signature.to_string(),
        created_at: block_time.unwrap_or_else(|| Utc::now().timestamp()),
        last_checked_at: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReclaimError;
    use crate::solana::client::{MockChainConnection, SignatureInfo};
    use serde_json::json;
    use solana_sdk::system_program;

    fn signature_info(signature: Signature) -> SignatureInfo {
        SignatureInfo {
            signature: signature.to_string(),
            slot: 1,
            block_time: None,
            failed: false,
        }
    }

    #[tokio::test]
    async fn test_unfetchable_transaction_does_not_abort_discovery() {
        let broken = Signature::new_unique();
        let fine = Signature::new_unique();

        let mut mock = MockChainConnection::new();
        mock.expect_get_signatures_for_address()
            .times(1)
            .returning(move |_, _, _| Ok(vec![signature_info(broken), signature_info(fine)]));
        mock.expect_get_transaction()
            .withf(move |s| *s == broken)
            .times(2)
            .returning(|_| Err(ReclaimError::Timeout("getTransaction".into())));
        mock.expect_get_transaction()
            .withf(move |s| *s == fine)
            .times(1)
            .returning(|_| Ok(None));

        let discovery = AccountDiscovery::new(Arc::new(mock), Pubkey::new_unique(), RetryPolicy::immediate(2));
        let records = discovery.discover(10).await.unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_system_create_account_claims_instruction_owner() {
        let new_account = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let parsed = json!({
            "type": "createAccount",
            "info": {
                "source": Pubkey::new_unique().to_string(),
                "newAccount": new_account.to_string(),
                "lamports": 890_880,
                "space": 0,
                "owner": owner.to_string()
            }
        });

        let record = parse_creation("system", &parsed, "sig1", 42, Some(1_700_000_000)).unwrap();
        assert_eq!(record.address, new_account);
        assert_eq!(record.claimed_owner_program, owner);
        assert_eq!(record.rent_paid_at_creation, 890_880);
        assert_eq!(record.creation_height, 42);
        assert_eq!(record.creation_proof_ref, "sig1");
        assert_eq!(record.created_at, 1_700_000_000);
    }

    #[test]
    fn test_token_initialize_claims_token_program() {
        let account = Pubkey::new_unique();
        let parsed = json!({
            "type": "initializeAccount3",
            "info": { "account": account.to_string(), "mint": Pubkey::new_unique().to_string() }
        });

        let record = parse_creation("spl-token", &parsed, "sig2", 7, None).unwrap();
        assert_eq!(record.address, account);
        assert_eq!(record.claimed_owner_program, spl_token::id());
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_other_instructions_are_ignored() {
        let transfer = json!({
            "type": "transfer",
            "info": { "source": system_program::id().to_string(), "lamports": 5 }
        });
        assert!(parse_creation("system", &transfer, "sig", 1, None).is_none());

        let missing_owner = json!({
            "type": "createAccount",
            "info": { "newAccount": Pubkey::new_unique().to_string() }
        });
        assert!(parse_creation("system", &missing_owner, "sig", 1, None).is_none());
        assert!(parse_creation("memo", &json!("hello"), "sig", 1, None).is_none());
    }
}
