//! Reward-allocation participation: weekly activations and default-allocation detection.
use std::{collections::HashMap, sync::Arc};

use alloy::{
    primitives::{Address, BlockNumber},
    sol_types::SolEvent,
};
use alloy_rpc_types_eth::{Filter, Log};
use chainio::{IBeraChef::ActivateRewardAllocation, same_allocation};
use chrono::{Datelike, IsoWeek, NaiveDate};
use extractor::{ChainReader, contracts};
use primitives::{
    pipeline::MultiProvider,
    validator::{Pubkey, Validator},
    window::DayRanges,
};
use tracing::{info, warn};

use crate::logs::{IdentityIndex, scan_chunks, tracked_validator};

/// Score of a validator that activated an allocation every week and does not use the default.
pub const MAX_PARTICIPATION: f64 = 100.0;
/// Lost for every window week without an activation.
pub const WEEKLY_PENALTY: f64 = 10.0;
/// Lost for running the network default allocation.
pub const DEFAULT_ALLOCATION_PENALTY: f64 = 40.0;

/// Whether a validator's active allocation equals the network default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultAllocation {
    /// Same receivers and weights as the default
    Matches,
    /// A custom allocation
    Differs,
    /// The comparison could not be made
    Unknown,
}

/// Participation outcome of one validator.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipationScore {
    /// Final score in `[0, 100]`
    pub score: f64,
    /// Window weeks without any activation
    pub weeks_without_activation: u32,
    /// Activations seen in the window
    pub activation_count: usize,
    /// Result of the default-allocation check
    pub default_allocation: DefaultAllocation,
    /// Whether the default-allocation penalty was applied
    pub penalty_applied: bool,
    /// Whether the penalty was applied without a successful check
    pub penalty_assumed: bool,
}

/// Dates of every activation per validator.
#[derive(Debug, Clone, Default)]
pub struct ActivationRecord {
    activations: HashMap<Pubkey, Vec<NaiveDate>>,
}

impl ActivationRecord {
    /// Record an activation of `pubkey` on `date`.
    pub fn push(&mut self, pubkey: Pubkey, date: NaiveDate) {
        self.activations.entry(pubkey).or_default().push(date);
    }

    /// Activation dates of `pubkey`.
    pub fn dates(&self, pubkey: &Pubkey) -> &[NaiveDate] {
        self.activations.get(pubkey).map(Vec::as_slice).unwrap_or_default()
    }

    fn merge(&mut self, other: Self) {
        for (pubkey, dates) in other.activations {
            self.activations.entry(pubkey).or_default().extend(dates);
        }
    }
}

fn fold_chunk(logs: Vec<Log>, index: &IdentityIndex, days: &DayRanges) -> ActivationRecord {
    let mut record = ActivationRecord::default();
    for log in logs {
        let Some(pubkey) = tracked_validator(&log, index) else {
            continue;
        };
        let Some(date) = log.block_number.and_then(|block| days.date_of(block)) else {
            continue;
        };
        record.push(*pubkey, date);
    }
    record
}

/// Scan `ActivateRewardAllocation` events emitted by `berachef` over the window.
pub async fn scan_activations(
    providers: &MultiProvider<dyn ChainReader>,
    berachef: Address,
    index: &IdentityIndex,
    days: &DayRanges,
    chunk_size: u64,
) -> ActivationRecord {
    let Some(span) = days.span() else {
        return ActivationRecord::default();
    };
    let filter =
        Filter::new().address(berachef).event_signature(ActivateRewardAllocation::SIGNATURE_HASH);
    let chunks =
        scan_chunks(providers, &filter, span, chunk_size, |logs| fold_chunk(logs, index, days))
            .await;

    let mut record = ActivationRecord::default();
    for chunk in chunks.into_iter().flatten() {
        record.merge(chunk);
    }
    info!(validators = record.activations.len(), "activation scan complete");
    record
}

/// Compare each validator's active allocation at `block` with the network default.
pub async fn check_default_allocations(
    providers: &MultiProvider<dyn ChainReader>,
    berachef: Address,
    validators: &[Validator],
    block: BlockNumber,
) -> HashMap<Pubkey, DefaultAllocation> {
    let default = match contracts::default_allocation(providers.primary().as_ref(), berachef, block)
        .await
    {
        Ok(default) => default,
        Err(e) => {
            warn!(block, error = %e, "could not read default allocation");
            return validators.iter().map(|v| (v.pubkey, DefaultAllocation::Unknown)).collect();
        }
    };

    let pubkeys: Vec<Pubkey> = validators.iter().map(|v| v.pubkey).collect();
    let default = &default;
    let results = providers
        .process(pubkeys.clone(), |chain: Arc<dyn ChainReader>, pubkey| async move {
            let active = contracts::active_allocation(chain.as_ref(), berachef, &pubkey, block).await?;
            Ok::<_, primitives::retries::RpcError>(if same_allocation(&active, default) {
                DefaultAllocation::Matches
            } else {
                DefaultAllocation::Differs
            })
        })
        .await;

    pubkeys
        .into_iter()
        .zip(results)
        .map(|(pubkey, result)| (pubkey, result.unwrap_or(DefaultAllocation::Unknown)))
        .collect()
}

/// Score participation from the window's ISO weeks, the activation dates and the
/// default-allocation check.
///
/// A validator whose check failed and that never activated an allocation in the window is
/// assumed to run the default allocation.
pub fn participation_score(
    weeks: &[IsoWeek],
    activations: &[NaiveDate],
    default_allocation: DefaultAllocation,
) -> ParticipationScore {
    let weeks_without_activation = weeks
        .iter()
        .filter(|week| !activations.iter().any(|date| date.iso_week() == **week))
        .count() as u32;

    let penalty_assumed =
        default_allocation == DefaultAllocation::Unknown && activations.is_empty();
    let penalty_applied = default_allocation == DefaultAllocation::Matches || penalty_assumed;

    let mut score = MAX_PARTICIPATION - WEEKLY_PENALTY * weeks_without_activation as f64;
    if penalty_applied {
        score -= DEFAULT_ALLOCATION_PENALTY;
    }

    ParticipationScore {
        score: score.max(0.0),
        weeks_without_activation,
        activation_count: activations.len(),
        default_allocation,
        penalty_applied,
        penalty_assumed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{
        primitives::{Bytes, aliases::U96},
        sol_types::SolValue,
    };
    use chainio::IBeraChef::{
        RewardAllocation, Weight, getActiveRewardAllocationCall, getDefaultRewardAllocationCall,
    };
    use extractor::mock::MockChain;
    use primitives::{
        validator::{ConsensusAddress, identity_hash},
        window::DayRange,
    };

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, n).unwrap()
    }

    fn weeks(from: u32, to: u32) -> Vec<IsoWeek> {
        let mut out: Vec<IsoWeek> = Vec::new();
        for d in from..=to {
            let week = day(d).iso_week();
            if out.last() != Some(&week) {
                out.push(week);
            }
        }
        out
    }

    fn validator(byte: u8) -> Validator {
        Validator {
            name: format!("v{byte}"),
            pubkey: Pubkey::repeat_byte(byte),
            proposer_address: ConsensusAddress::repeat_byte(byte),
            operator: Address::repeat_byte(byte),
            voting_power: 0,
        }
    }

    fn allocation(pairs: &[(u8, u64)]) -> RewardAllocation {
        RewardAllocation {
            startBlock: 1,
            weights: pairs
                .iter()
                .map(|(r, p)| Weight {
                    receiver: Address::repeat_byte(*r),
                    percentageNumerator: U96::from(*p),
                })
                .collect(),
        }
    }

    fn active_call(v: &Validator) -> getActiveRewardAllocationCall {
        getActiveRewardAllocationCall { valPubkey: Bytes::copy_from_slice(v.pubkey.as_slice()) }
    }

    #[test]
    fn activation_every_week_scores_full() {
        // 2025-03-03 .. 2025-03-16 spans ISO weeks 10 and 11
        let window = weeks(3, 16);
        let score = participation_score(&window, &[day(4), day(12)], DefaultAllocation::Differs);
        assert_eq!(score.score, 100.0);
        assert_eq!(score.weeks_without_activation, 0);
        assert!(!score.penalty_applied);
    }

    #[test]
    fn missing_weeks_cost_ten_each() {
        let window = weeks(3, 23);
        let score = participation_score(&window, &[day(5)], DefaultAllocation::Differs);
        assert_eq!(score.weeks_without_activation, 2);
        assert_eq!(score.score, 80.0);
    }

    #[test]
    fn default_allocation_is_penalized() {
        let window = weeks(3, 9);
        let score = participation_score(&window, &[day(3)], DefaultAllocation::Matches);
        assert_eq!(score.score, 60.0);
        assert!(score.penalty_applied);
        assert!(!score.penalty_assumed);
    }

    #[test]
    fn failed_check_without_activations_assumes_default() {
        // one-week window, no activations, check errored: 100 - 10 - 40
        let window = weeks(3, 9);
        let score = participation_score(&window, &[], DefaultAllocation::Unknown);
        assert_eq!(score.score, 50.0);
        assert!(score.penalty_applied);
        assert!(score.penalty_assumed);
    }

    #[test]
    fn failed_check_with_activations_is_not_penalized() {
        let window = weeks(3, 9);
        let score = participation_score(&window, &[day(6)], DefaultAllocation::Unknown);
        assert_eq!(score.score, 100.0);
        assert!(!score.penalty_applied);
    }

    #[test]
    fn score_never_goes_negative() {
        let window = weeks(1, 31);
        let score = participation_score(&window, &[], DefaultAllocation::Matches);
        assert_eq!(score.weeks_without_activation, 6);
        assert_eq!(score.score, 0.0);
    }

    #[tokio::test]
    async fn scans_and_checks_against_chain() {
        let berachef = Address::repeat_byte(0xbe);
        let a = validator(1);
        let b = validator(2);
        let c = validator(3);

        let mut chain = MockChain::with_block_time(0, 2, 3_000);
        let default = allocation(&[(1, 5_000), (2, 5_000)]);
        chain.respond(berachef, &getDefaultRewardAllocationCall {}, default);
        // a runs the default in a different order, b has its own, c's read reverts
        chain.respond(berachef, &active_call(&a), allocation(&[(2, 5_000), (1, 5_000)]));
        chain.respond(berachef, &active_call(&b), allocation(&[(9, 10_000)]));

        let data = (1u64, Vec::<Weight>::new()).abi_encode_params();
        chain.push_log(
            berachef,
            1_500,
            vec![ActivateRewardAllocation::SIGNATURE_HASH, identity_hash(&b.pubkey)],
            Bytes::from(data.clone()),
        );
        // emitted by another contract, ignored
        chain.push_log(
            Address::repeat_byte(0x01),
            1_600,
            vec![ActivateRewardAllocation::SIGNATURE_HASH, identity_hash(&a.pubkey)],
            Bytes::from(data),
        );

        let chain: Arc<dyn ChainReader> = Arc::new(chain);
        let providers = MultiProvider::single(chain, 4);
        let days = DayRanges::new(vec![
            DayRange { date: day(3), start_block: 1, end_block: 1_000 },
            DayRange { date: day(4), start_block: 1_001, end_block: 2_000 },
        ])
        .unwrap();
        let index: IdentityIndex =
            [&a, &b, &c].iter().map(|v| (identity_hash(&v.pubkey), v.pubkey)).collect();

        let record = scan_activations(&providers, berachef, &index, &days, 500).await;
        assert_eq!(record.dates(&b.pubkey), &[day(4)]);
        assert!(record.dates(&a.pubkey).is_empty());

        let checks =
            check_default_allocations(&providers, berachef, &[a.clone(), b.clone(), c.clone()], 2_000)
                .await;
        assert_eq!(checks[&a.pubkey], DefaultAllocation::Matches);
        assert_eq!(checks[&b.pubkey], DefaultAllocation::Differs);
        assert_eq!(checks[&c.pubkey], DefaultAllocation::Unknown);
    }
}
