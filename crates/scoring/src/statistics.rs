//! Per-day normalization and window ranking. Everything here is pure.
use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use primitives::validator::{Pubkey, Validator};

use crate::{participation::ParticipationScore, valuation::UsdValuation};

/// Raw measurements of one validator on one day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayInput {
    /// Blocks proposed
    pub total_blocks: u64,
    /// Empty blocks proposed
    pub empty_blocks: u64,
    /// Native tokens staked
    pub stake: f64,
    /// BGT boosting the validator
    pub boost: f64,
    /// USD value of incentives received
    pub usd: UsdValuation,
}

/// Normalized statistics of one validator on one day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyStats {
    /// Blocks proposed
    pub total_blocks: u64,
    /// Empty blocks proposed
    pub empty_blocks: u64,
    /// `100 - 100 * empty / total`
    pub uptime_score: f64,
    /// Boost ratio relative to the day's best
    pub pol_score: f64,
    /// USD yield per staked token relative to the day's best
    pub stake_scaled_booster_score: f64,
    /// Native tokens staked
    pub stake: f64,
    /// BGT boosting the validator
    pub boost: f64,
    /// `boost / stake`
    pub pol_ratio: f64,
    /// USD value per token name
    pub usd_values: BTreeMap<String, f64>,
    /// Total USD value
    pub usd_total: f64,
}

/// `date -> validator -> statistics`.
pub type DailyStatistics = BTreeMap<NaiveDate, BTreeMap<Pubkey, DailyStats>>;

/// Share of non-empty blocks, as a percentage. A validator with no blocks scores 100.
pub fn uptime_score(total_blocks: u64, empty_blocks: u64) -> f64 {
    if total_blocks == 0 {
        return 100.0;
    }
    100.0 - 100.0 * empty_blocks as f64 / total_blocks as f64
}

/// `numerator / stake`, zero without stake.
pub fn per_stake(numerator: f64, stake: f64) -> f64 {
    if stake > 0.0 { numerator / stake } else { 0.0 }
}

/// `100 * value / max`, zero when the maximum is not positive.
pub fn normalize(value: f64, max: f64) -> f64 {
    if max <= 0.0 {
        0.0
    } else if value >= max {
        100.0
    } else {
        100.0 * value / max
    }
}

fn day_max<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    values.copied().fold(0.0, f64::max)
}

/// Turn raw inputs into normalized daily statistics. Normalization is per day.
pub fn daily_statistics(inputs: &BTreeMap<NaiveDate, BTreeMap<Pubkey, DayInput>>) -> DailyStatistics {
    inputs
        .iter()
        .map(|(date, validators)| {
            let ratios: BTreeMap<Pubkey, (f64, f64)> = validators
                .iter()
                .map(|(pubkey, input)| {
                    let pol_ratio = per_stake(input.boost, input.stake);
                    let yield_ratio = per_stake(input.usd.total_f64(), input.stake);
                    (*pubkey, (pol_ratio, yield_ratio))
                })
                .collect();
            let max_pol = day_max(ratios.values().map(|(pol, _)| pol));
            let max_yield = day_max(ratios.values().map(|(_, y)| y));

            let stats = validators
                .iter()
                .map(|(pubkey, input)| {
                    let (pol_ratio, yield_ratio) = ratios[pubkey];
                    let stats = DailyStats {
                        total_blocks: input.total_blocks,
                        empty_blocks: input.empty_blocks,
                        uptime_score: uptime_score(input.total_blocks, input.empty_blocks),
                        pol_score: normalize(pol_ratio, max_pol),
                        stake_scaled_booster_score: normalize(yield_ratio, max_yield),
                        stake: input.stake,
                        boost: input.boost,
                        pol_ratio,
                        usd_values: input.usd.per_token.clone(),
                        usd_total: input.usd.total_f64(),
                    };
                    (*pubkey, stats)
                })
                .collect();
            (*date, stats)
        })
        .collect()
}

/// Window result of one validator.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorRanking {
    /// The validator
    pub validator: Validator,
    /// Mean daily uptime score
    pub uptime_score: f64,
    /// Mean daily boost score
    pub pol_score: f64,
    /// Mean daily yield score
    pub stake_scaled_booster_score: f64,
    /// Participation outcome
    pub participation: ParticipationScore,
    /// Mean of the four dimensions
    pub total_score: f64,
    /// Stake on the latest day
    pub stake: f64,
    /// Anomalies observed for this validator
    pub notes: Vec<String>,
    /// Daily breakdown
    pub daily: BTreeMap<NaiveDate, DailyStats>,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Everything needed to rank one validator besides its daily statistics.
#[derive(Debug, Clone)]
pub struct RankingInput {
    /// The validator
    pub validator: Validator,
    /// Participation outcome
    pub participation: ParticipationScore,
    /// Stake on the latest day
    pub stake: f64,
    /// Anomalies observed for this validator
    pub notes: Vec<String>,
}

/// Average each validator's daily scores over the window and sort by total score, best first.
pub fn rank(inputs: Vec<RankingInput>, daily: &DailyStatistics) -> Vec<ValidatorRanking> {
    let mut rankings: Vec<ValidatorRanking> = inputs
        .into_iter()
        .map(|input| {
            let pubkey = input.validator.pubkey;
            let days: BTreeMap<NaiveDate, DailyStats> = daily
                .iter()
                .filter_map(|(date, validators)| Some((*date, validators.get(&pubkey)?.clone())))
                .collect();

            let uptime_score = mean(days.values().map(|d| d.uptime_score));
            let pol_score = mean(days.values().map(|d| d.pol_score));
            let stake_scaled_booster_score =
                mean(days.values().map(|d| d.stake_scaled_booster_score));
            let total_score = mean(
                [uptime_score, pol_score, stake_scaled_booster_score, input.participation.score]
                    .into_iter(),
            );

            ValidatorRanking {
                validator: input.validator,
                uptime_score,
                pol_score,
                stake_scaled_booster_score,
                participation: input.participation,
                total_score,
                stake: input.stake,
                notes: input.notes,
                daily: days,
            }
        })
        .collect();

    rankings.sort_by(|a, b| {
        b.total_score.total_cmp(&a.total_score).then_with(|| a.validator.name.cmp(&b.validator.name))
    });
    rankings
}

/// Group notes by validator.
pub fn collect_notes(
    notes: impl IntoIterator<Item = (Pubkey, String)>,
) -> HashMap<Pubkey, Vec<String>> {
    let mut out: HashMap<Pubkey, Vec<String>> = HashMap::new();
    for (pubkey, note) in notes {
        out.entry(pubkey).or_default().push(note);
    }
    out
}
