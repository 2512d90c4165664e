//! Resolve UTC midnights to the first block produced at or after them.
use std::collections::{BTreeMap, HashMap};

use alloy::primitives::BlockNumber;
use chrono::NaiveDate;
use extractor::ChainReader;
use eyre::{Result, bail};
use primitives::window::{SECONDS_PER_DAY, midnight_timestamp};
use tracing::{debug, info, warn};

/// First block considered by the search. Block 0 carries no meaningful timestamp.
pub const GENESIS_BLOCK: BlockNumber = 1;

/// Binary search budget per date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundarySearch {
    /// Search steps before falling back to a linear scan of what is left.
    pub max_steps: u32,
}

impl Default for BoundarySearch {
    fn default() -> Self {
        Self { max_steps: 64 }
    }
}

/// Maps dates to block heights against a monotonic `block -> timestamp` function.
///
/// The boundary `b` of a date satisfies `ts(b) >= midnight` and `ts(b - 1) < midnight`.
#[derive(Debug)]
pub struct DayBoundaryResolver<'a> {
    chain: &'a dyn ChainReader,
    search: BoundarySearch,
    timestamps: HashMap<BlockNumber, u64>,
    head: BlockNumber,
    head_ts: u64,
    genesis_ts: u64,
    avg_block_time: f64,
}

impl<'a> DayBoundaryResolver<'a> {
    /// Read the chain head and genesis and derive the average block time.
    pub async fn new(chain: &'a dyn ChainReader, search: BoundarySearch) -> Result<Self> {
        let head = chain.latest_block_number().await?.max(GENESIS_BLOCK);
        let mut resolver = Self {
            chain,
            search,
            timestamps: HashMap::new(),
            head,
            head_ts: 0,
            genesis_ts: 0,
            avg_block_time: 1.0,
        };
        resolver.head_ts = resolver.timestamp(head).await?;
        resolver.genesis_ts = resolver.timestamp(GENESIS_BLOCK).await?;

        let blocks = head - GENESIS_BLOCK;
        let elapsed = resolver.head_ts.saturating_sub(resolver.genesis_ts);
        if blocks > 0 && elapsed > 0 {
            resolver.avg_block_time = elapsed as f64 / blocks as f64;
        }
        debug!(head, avg_block_time = resolver.avg_block_time, "day boundary resolver ready");
        Ok(resolver)
    }

    /// Average seconds per block between genesis and head.
    pub const fn avg_block_time(&self) -> f64 {
        self.avg_block_time
    }

    /// Chain head the resolver was created at.
    pub const fn head(&self) -> BlockNumber {
        self.head
    }

    async fn timestamp(&mut self, block: BlockNumber) -> Result<u64> {
        if let Some(ts) = self.timestamps.get(&block) {
            return Ok(*ts);
        }
        let ts = self.chain.block_timestamp(block).await?;
        self.timestamps.insert(block, ts);
        Ok(ts)
    }

    /// Whether `block` is the boundary for `target`.
    async fn is_boundary(&mut self, block: BlockNumber, target: u64) -> Result<bool> {
        if self.timestamp(block).await? < target {
            return Ok(false);
        }
        Ok(block == GENESIS_BLOCK || self.timestamp(block - 1).await? < target)
    }

    /// Resolve every date, in order. Dates must be ascending.
    pub async fn resolve(&mut self, dates: &[NaiveDate]) -> Result<BTreeMap<NaiveDate, BlockNumber>> {
        let mut out = BTreeMap::new();
        let mut previous: Option<BlockNumber> = None;
        for date in dates {
            let block = self.resolve_date(*date, previous).await?;
            info!(%date, block, "resolved day boundary");
            out.insert(*date, block);
            previous = Some(block);
        }
        Ok(out)
    }

    async fn resolve_date(
        &mut self,
        date: NaiveDate,
        previous: Option<BlockNumber>,
    ) -> Result<BlockNumber> {
        let target = midnight_timestamp(date);
        if target <= self.genesis_ts {
            return Ok(GENESIS_BLOCK);
        }
        // Past the head, the boundary is the next block to be produced, so the head itself
        // still belongs to the previous day.
        if target > self.head_ts {
            warn!(%date, head = self.head, head_ts = self.head_ts, "date is past the chain head");
            return Ok(self.head + 1);
        }

        let estimate = self.estimate(target, previous);
        let mut low = previous.unwrap_or(GENESIS_BLOCK).clamp(GENESIS_BLOCK, self.head);
        let mut high = self.head;
        let mut guess = estimate.clamp(low, high);

        for step in 0..self.search.max_steps {
            if low > high {
                break;
            }
            if self.timestamp(guess).await? >= target {
                if self.is_boundary(guess, target).await? {
                    debug!(%date, block = guess, steps = step + 1, "boundary found");
                    return Ok(guess);
                }
                high = guess - 1;
            } else {
                low = guess + 1;
            }
            guess = low + (high.saturating_sub(low)) / 2;
        }

        debug!(%date, low, high, "search budget exhausted, scanning linearly");
        for block in low..=high {
            if self.is_boundary(block, target).await? {
                return Ok(block);
            }
        }
        bail!("no block found for {date} (target {target}) between {low} and {high}")
    }

    fn estimate(&self, target: u64, previous: Option<BlockNumber>) -> BlockNumber {
        let blocks_per_day = (SECONDS_PER_DAY as f64 / self.avg_block_time) as u64;
        let estimate = match previous {
            Some(prev) => prev.saturating_add(blocks_per_day),
            None => {
                let elapsed = target.saturating_sub(self.genesis_ts) as f64;
                GENESIS_BLOCK.saturating_add((elapsed / self.avg_block_time) as u64)
            }
        };
        if estimate > self.head {
            let behind = (self.head_ts.saturating_sub(target) as f64 / self.avg_block_time) as u64;
            return self.head.saturating_sub(behind).max(GENESIS_BLOCK);
        }
        estimate.max(GENESIS_BLOCK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extractor::mock::MockChain;
    use primitives::window::DayRanges;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    /// Irregular block times between 1 and 5 seconds, starting an hour before 2025-03-01.
    fn irregular_chain(blocks: usize) -> MockChain {
        let mut ts = midnight_timestamp(date(1)) - 3_600;
        let mut timestamps = Vec::with_capacity(blocks + 1);
        for n in 0..=blocks {
            timestamps.push(ts);
            ts += 1 + (n as u64 * 7) % 5;
        }
        MockChain::new(timestamps)
    }

    async fn brute_force(chain: &MockChain, target: u64) -> BlockNumber {
        for block in GENESIS_BLOCK..=chain.head() {
            if chain.block_timestamp(block).await.unwrap() >= target {
                return block;
            }
        }
        chain.head()
    }

    #[tokio::test]
    async fn uniform_chain_boundaries() {
        let genesis = midnight_timestamp(date(1)) - 1_000;
        let chain = MockChain::with_block_time(genesis, 2, 200_000);
        let mut resolver = DayBoundaryResolver::new(&chain, BoundarySearch::default()).await.unwrap();

        let got = resolver.resolve(&[date(1), date(2), date(3)]).await.unwrap();
        assert_eq!(got[&date(1)], 500);
        assert_eq!(got[&date(2)], 500 + 43_200);
        assert_eq!(got[&date(3)], 500 + 2 * 43_200);
    }

    #[tokio::test]
    async fn irregular_chain_matches_linear_scan() {
        let chain = irregular_chain(120_000);
        let dates = [date(1), date(2), date(3), date(4)];
        let mut resolver = DayBoundaryResolver::new(&chain, BoundarySearch::default()).await.unwrap();
        let got = resolver.resolve(&dates).await.unwrap();

        for d in dates {
            let expected = brute_force(&chain, midnight_timestamp(d)).await;
            assert_eq!(got[&d], expected, "boundary of {d}");
        }
    }

    #[tokio::test]
    async fn exhausted_budget_falls_back_to_linear_scan() {
        let chain = irregular_chain(60_000);
        let dates = [date(1), date(2)];
        let mut searching = DayBoundaryResolver::new(&chain, BoundarySearch::default()).await.unwrap();
        let mut scanning =
            DayBoundaryResolver::new(&chain, BoundarySearch { max_steps: 3 }).await.unwrap();

        assert_eq!(
            searching.resolve(&dates).await.unwrap(),
            scanning.resolve(&dates).await.unwrap()
        );
    }

    #[tokio::test]
    async fn target_before_genesis_is_first_block() {
        let chain = MockChain::with_block_time(midnight_timestamp(date(10)), 2, 1_000);
        let mut resolver = DayBoundaryResolver::new(&chain, BoundarySearch::default()).await.unwrap();
        let got = resolver.resolve(&[date(9)]).await.unwrap();
        assert_eq!(got[&date(9)], GENESIS_BLOCK);
    }

    #[tokio::test]
    async fn target_after_head_is_next_block() {
        let chain = MockChain::with_block_time(midnight_timestamp(date(1)), 2, 1_000);
        let mut resolver = DayBoundaryResolver::new(&chain, BoundarySearch::default()).await.unwrap();
        let got = resolver.resolve(&[date(5)]).await.unwrap();
        assert_eq!(got[&date(5)], 1_001);
    }

    #[tokio::test]
    async fn last_day_includes_head_when_closing_date_is_ahead() {
        let chain = MockChain::with_block_time(midnight_timestamp(date(1)), 2, 1_000);
        let mut resolver = DayBoundaryResolver::new(&chain, BoundarySearch::default()).await.unwrap();
        let boundaries = resolver.resolve(&[date(1), date(2)]).await.unwrap();

        let ranges = DayRanges::from_boundaries(&boundaries).unwrap();
        let last = ranges.iter().last().copied().unwrap();
        assert_eq!(last.date, date(1));
        assert_eq!(last.end_block, chain.head());
        assert!(last.contains(chain.head()));
    }

    #[tokio::test]
    async fn repeated_resolution_is_memoized() {
        let chain = irregular_chain(60_000);
        let dates = [date(1), date(2)];
        let mut resolver = DayBoundaryResolver::new(&chain, BoundarySearch::default()).await.unwrap();

        let first = resolver.resolve(&dates).await.unwrap();
        let reads = chain.timestamp_reads();
        let second = resolver.resolve(&dates).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(chain.timestamp_reads(), reads);
    }
}
