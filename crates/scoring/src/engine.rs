//! Runs every stage of a scoring window, in order.
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use alloy::primitives::Address;
use chrono::{Days, NaiveDate};
use derive_more::Debug;
use extractor::ChainReader;
use eyre::{Context, Result, ensure, eyre};
use pricing::PriceSource;
use primitives::{
    pipeline::MultiProvider,
    validator::{Pubkey, Validator, identity_hash},
    window::DayRanges,
};
use tracing::{info, warn};

use crate::{
    block_scanner::{BlockScanConfig, scan_blocks},
    day_boundary::{BoundarySearch, DayBoundaryResolver},
    event_indexer::index_incentives,
    logs::IdentityIndex,
    participation::{
        DefaultAllocation, check_default_allocations, participation_score, scan_activations,
    },
    report::Report,
    stake::snapshot_stakes,
    statistics::{DayInput, RankingInput, collect_notes, daily_statistics, rank},
    valuation::{PricingTokens, TokenCache},
};

/// Contract and token addresses the engine reads.
#[derive(Debug, Clone, Copy)]
pub struct Contracts {
    /// BeraChef
    pub berachef: Address,
    /// BGT
    pub bgt: Address,
    /// USD-pegged quote token
    pub honey: Address,
    /// Wrapped native token
    pub wbera: Address,
}

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Contract addresses
    pub contracts: Contracts,
    /// In-flight requests per pipeline
    pub max_concurrency: usize,
    /// Block scan chunking and empty threshold
    pub block_scan: BlockScanConfig,
    /// Blocks per log query
    pub log_chunk_size: u64,
    /// Day boundary search budget
    pub boundary: BoundarySearch,
}

/// The scoring engine.
#[derive(Debug)]
pub struct ScoringEngine {
    providers: MultiProvider<dyn ChainReader>,
    #[debug(skip)]
    prices: Arc<dyn PriceSource>,
    config: EngineConfig,
}

/// The `days` dates ending the day before `end_date`, followed by `end_date` itself, whose
/// boundary closes the last day.
pub fn window_dates(end_date: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..=days)
        .rev()
        .filter_map(|back| end_date.checked_sub_days(Days::new(back as u64)))
        .collect()
}

/// Per-validator, per-day block counts as `(total, empty)`.
type BlockCounts = HashMap<(Pubkey, NaiveDate), (u64, u64)>;

impl ScoringEngine {
    /// Create a new engine.
    pub fn new(
        providers: MultiProvider<dyn ChainReader>,
        prices: Arc<dyn PriceSource>,
        config: EngineConfig,
    ) -> Self {
        Self { providers, prices, config }
    }

    async fn resolve_days(&self, end_date: NaiveDate, days: u32) -> Result<DayRanges> {
        let dates = window_dates(end_date, days);
        let primary = self.providers.primary();
        let mut resolver = DayBoundaryResolver::new(primary.as_ref(), self.config.boundary)
            .await
            .wrap_err("failed to read chain head")?;
        let boundaries = resolver.resolve(&dates).await.wrap_err("failed to resolve day boundaries")?;
        DayRanges::from_boundaries(&boundaries).wrap_err("window has days without blocks")
    }

    /// Score `validators` over the `days` days before `end_date`.
    pub async fn run(
        &self,
        validators: &[Validator],
        end_date: NaiveDate,
        days: u32,
    ) -> Result<Report> {
        ensure!(!validators.is_empty(), "no validators to score");
        ensure!(days > 0, "window must cover at least one day");

        let ranges = self.resolve_days(end_date, days).await?;
        let span = ranges.span().ok_or_else(|| eyre!("empty window"))?;
        let last_block = span.1;
        info!(days = ranges.len(), start = span.0, end = last_block, "window resolved");

        // Block production
        let tracked: HashSet<_> = validators.iter().map(|v| v.proposer_address).collect();
        let scan = scan_blocks(&self.providers, &tracked, span, self.config.block_scan).await;
        let mut counts = BlockCounts::new();
        for validator in validators {
            let Some(record) = scan.records.get(&validator.proposer_address) else {
                continue;
            };
            for block in &record.proposed {
                if let Some(date) = ranges.date_of(*block) {
                    counts.entry((validator.pubkey, date)).or_default().0 += 1;
                }
            }
            for block in &record.empty {
                if let Some(date) = ranges.date_of(*block) {
                    counts.entry((validator.pubkey, date)).or_default().1 += 1;
                }
            }
        }

        // Stake and boost
        let (stakes, inactive) =
            snapshot_stakes(&self.providers, validators, &ranges, self.config.contracts.bgt).await;

        // Incentives
        let index: IdentityIndex =
            validators.iter().map(|v| (identity_hash(&v.pubkey), v.pubkey)).collect();
        let ledger =
            index_incentives(&self.providers, &index, &ranges, self.config.log_chunk_size).await;

        // Participation
        let berachef = self.config.contracts.berachef;
        let activations = scan_activations(
            &self.providers,
            berachef,
            &index,
            &ranges,
            self.config.log_chunk_size,
        )
        .await;
        let defaults =
            check_default_allocations(&self.providers, berachef, validators, last_block).await;

        // Valuation
        let tokens = TokenCache::new(
            self.providers.primary(),
            Arc::clone(&self.prices),
            PricingTokens {
                honey: self.config.contracts.honey,
                bgt: self.config.contracts.bgt,
                wbera: self.config.contracts.wbera,
            },
            last_block,
        );
        tokens.load_all(ledger.tokens(), self.config.max_concurrency).await;

        // Statistics
        let mut inputs: BTreeMap<NaiveDate, BTreeMap<Pubkey, DayInput>> = BTreeMap::new();
        for day in &ranges {
            let day_inputs = inputs.entry(day.date).or_default();
            for validator in validators {
                let (total_blocks, empty_blocks) =
                    counts.get(&(validator.pubkey, day.date)).copied().unwrap_or_default();
                let stake = stakes.get(day.date, &validator.pubkey);
                let usd = ledger
                    .get(day.date, &validator.pubkey)
                    .map(|totals| tokens.value(totals))
                    .unwrap_or_default();
                day_inputs.insert(
                    validator.pubkey,
                    DayInput { total_blocks, empty_blocks, stake: stake.stake, boost: stake.boost, usd },
                );
            }
        }
        let daily = daily_statistics(&inputs);

        let weeks = ranges.iso_weeks();
        let mut notes = Vec::new();
        let ranking_inputs: Vec<RankingInput> = validators
            .iter()
            .map(|validator| {
                let pubkey = validator.pubkey;
                let default =
                    defaults.get(&pubkey).copied().unwrap_or(DefaultAllocation::Unknown);
                let participation =
                    participation_score(&weeks, activations.dates(&pubkey), default);

                if participation.penalty_assumed {
                    warn!(name = %validator.name, "default allocation check failed, assuming default");
                    notes.push((pubkey, "default allocation assumed after failed check".to_owned()));
                }
                if let Some(days) = inactive.get(&pubkey) {
                    notes.push((pubkey, format!("not in validator set on {} day(s)", days.len())));
                }
                if !counts.keys().any(|(pk, _)| *pk == pubkey) {
                    notes.push((pubkey, "no blocks proposed".to_owned()));
                }

                RankingInput {
                    validator: validator.clone(),
                    participation,
                    stake: stakes.latest_stake(&pubkey),
                    notes: Vec::new(),
                }
            })
            .collect();

        let mut notes = collect_notes(notes);
        let ranking_inputs = ranking_inputs
            .into_iter()
            .map(|mut input| {
                input.notes = notes.remove(&input.validator.pubkey).unwrap_or_default();
                input
            })
            .collect();
        let rankings = rank(ranking_inputs, &daily);

        if !scan.unscanned.is_empty() {
            warn!(count = scan.unscanned.len(), "some blocks could not be scanned");
        }
        info!(validators = rankings.len(), "scoring complete");

        Ok(Report { days: ranges, rankings, unscanned_blocks: scan.unscanned })
    }
}
