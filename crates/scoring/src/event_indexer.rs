//! Accumulate `IncentivesProcessed` payouts per day, validator and token.
use alloy::sol_types::SolEvent;
use alloy_rpc_types_eth::{Filter, Log};
use chainio::IRewardVault::IncentivesProcessed;
use extractor::ChainReader;
use primitives::{ledger::IncentiveLedger, pipeline::MultiProvider, window::DayRanges};
use tracing::{info, warn};

use crate::logs::{IdentityIndex, scan_chunks, tracked_validator};

fn fold_chunk(logs: Vec<Log>, index: &IdentityIndex, days: &DayRanges) -> IncentiveLedger {
    let mut ledger = IncentiveLedger::new();
    for log in logs {
        let Some(pubkey) = tracked_validator(&log, index) else {
            continue;
        };
        let Some(date) = log.block_number.and_then(|block| days.date_of(block)) else {
            continue;
        };
        match log.log_decode::<IncentivesProcessed>() {
            Ok(decoded) => {
                let event = decoded.inner.data;
                ledger.add(date, *pubkey, event.token, event.amount);
            }
            Err(e) => {
                warn!(tx = ?log.transaction_hash, block = ?log.block_number, error = %e, "skipping malformed incentive log");
            }
        }
    }
    ledger
}

/// Scan the whole window for incentive payouts to `index`'s validators.
///
/// Each chunk builds its own ledger; ledgers are merged once every chunk finished. A chunk
/// that fails contributes nothing.
pub async fn index_incentives(
    providers: &MultiProvider<dyn ChainReader>,
    index: &IdentityIndex,
    days: &DayRanges,
    chunk_size: u64,
) -> IncentiveLedger {
    let Some(span) = days.span() else {
        return IncentiveLedger::new();
    };
    let filter = Filter::new().event_signature(IncentivesProcessed::SIGNATURE_HASH);
    let chunks =
        scan_chunks(providers, &filter, span, chunk_size, |logs| fold_chunk(logs, index, days))
            .await;

    let failed = chunks.iter().filter(|c| c.is_none()).count();
    let mut ledger = IncentiveLedger::new();
    for chunk in chunks.into_iter().flatten() {
        ledger.merge(chunk);
    }
    info!(failed_chunks = failed, tokens = ledger.tokens().len(), "incentive scan complete");
    ledger
}
