//! Per-proposer block production over a block window.
use std::{
    collections::{HashMap, HashSet},
    convert::Infallible,
    sync::Arc,
};

use alloy::primitives::BlockNumber;
use extractor::ChainReader;
use primitives::{
    pipeline::MultiProvider, validator::ConsensusAddress, window::chunk_range,
};
use tracing::{info, warn};

/// Block scan tuning.
#[derive(Debug, Clone, Copy)]
pub struct BlockScanConfig {
    /// Blocks per chunk
    pub chunk_size: u64,
    /// A block with at most this many transactions is empty
    pub empty_threshold: u64,
}

impl Default for BlockScanConfig {
    fn default() -> Self {
        Self { chunk_size: 100, empty_threshold: 1 }
    }
}

/// Blocks proposed by one validator, in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockProductionRecord {
    /// Every proposed block
    pub proposed: Vec<BlockNumber>,
    /// The subset with at most `empty_threshold` transactions
    pub empty: Vec<BlockNumber>,
}

impl BlockProductionRecord {
    fn extend(&mut self, other: Self) {
        self.proposed.extend(other.proposed);
        self.empty.extend(other.empty);
    }
}

/// Outcome of a block scan.
#[derive(Debug, Default)]
pub struct BlockScan {
    /// Records of tracked proposers
    pub records: HashMap<ConsensusAddress, BlockProductionRecord>,
    /// Blocks whose proposer or body could not be read
    pub unscanned: Vec<BlockNumber>,
}

#[derive(Debug, Default)]
struct ChunkScan {
    records: HashMap<ConsensusAddress, BlockProductionRecord>,
    unscanned: Vec<BlockNumber>,
}

async fn scan_chunk(
    chain: Arc<dyn ChainReader>,
    (from, to): (BlockNumber, BlockNumber),
    tracked: &HashSet<ConsensusAddress>,
    empty_threshold: u64,
) -> Result<ChunkScan, Infallible> {
    let mut out = ChunkScan::default();
    for block in from..=to {
        let proposer = match chain.block_proposer(block).await {
            Ok(proposer) => proposer,
            Err(e) => {
                warn!(block, error = %e, transient = e.is_transient(), "could not read block proposer");
                out.unscanned.push(block);
                continue;
            }
        };
        if !tracked.contains(&proposer) {
            continue;
        }

        let tx_count = match chain.block_transaction_count(block).await {
            Ok(count) => count,
            Err(e) => {
                warn!(block, %proposer, error = %e, transient = e.is_transient(), "could not read block body");
                out.unscanned.push(block);
                continue;
            }
        };

        let record = out.records.entry(proposer).or_default();
        record.proposed.push(block);
        if tx_count <= empty_threshold {
            record.empty.push(block);
        }
    }
    Ok(out)
}

/// Scan `[start, end]` for blocks proposed by `tracked` validators.
///
/// Chunks are dispatched across both providers. A block whose proposer or body cannot be
/// read is reported as unscanned and the rest of its chunk is still counted.
pub async fn scan_blocks(
    providers: &MultiProvider<dyn ChainReader>,
    tracked: &HashSet<ConsensusAddress>,
    (start, end): (BlockNumber, BlockNumber),
    config: BlockScanConfig,
) -> BlockScan {
    let chunks = chunk_range(start, end, config.chunk_size);
    info!(start, end, chunks = chunks.len(), "scanning blocks");

    let results = providers
        .process(chunks.clone(), |chain, range| scan_chunk(chain, range, tracked, config.empty_threshold))
        .await;

    let mut scan = BlockScan::default();
    for (result, (from, to)) in results.into_iter().zip(chunks) {
        match result {
            Some(chunk) => {
                for (proposer, record) in chunk.records {
                    scan.records.entry(proposer).or_default().extend(record);
                }
                scan.unscanned.extend(chunk.unscanned);
            }
            None => scan.unscanned.extend(from..=to),
        }
    }

    for record in scan.records.values_mut() {
        record.proposed.sort_unstable();
        record.empty.sort_unstable();
    }
    scan.unscanned.sort_unstable();

    let proposed: usize = scan.records.values().map(|r| r.proposed.len()).sum();
    info!(proposed, unscanned = scan.unscanned.len(), "block scan complete");
    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::NaiveDate;
    use extractor::mock::MockChain;
    use primitives::validator::Pubkey;

    use crate::statistics::{DayInput, daily_statistics};

    fn providers(chain: MockChain, concurrency: usize) -> MultiProvider<dyn ChainReader> {
        let chain: Arc<dyn ChainReader> = Arc::new(chain);
        MultiProvider::single(chain, concurrency)
    }

    #[tokio::test]
    async fn classifies_empty_blocks_per_proposer() {
        let alice = ConsensusAddress::repeat_byte(0xa);
        let bob = ConsensusAddress::repeat_byte(0xb);
        let stranger = ConsensusAddress::repeat_byte(0xc);

        let mut chain = MockChain::with_block_time(0, 2, 300);
        for block in 1..=300 {
            let proposer = match block % 3 {
                0 => alice,
                1 => bob,
                _ => stranger,
            };
            chain.set_block(block, proposer, if block % 10 == 0 { 0 } else { 5 });
        }

        let tracked = HashSet::from([alice, bob]);
        let scan = scan_blocks(
            &providers(chain, 4),
            &tracked,
            (1, 300),
            BlockScanConfig { chunk_size: 7, empty_threshold: 1 },
        )
        .await;

        let a = &scan.records[&alice];
        assert_eq!(a.proposed.len(), 100);
        assert_eq!(a.proposed, (1..=100).map(|n| n * 3).collect::<Vec<_>>());
        // multiples of 30
        assert_eq!(a.empty, (1..=10).map(|n| n * 30).collect::<Vec<_>>());
        assert_eq!(scan.records[&bob].proposed.len(), 100);
        assert!(!scan.records.contains_key(&stranger));
        assert!(scan.unscanned.is_empty());
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let alice = ConsensusAddress::repeat_byte(0xa);
        let mut chain = MockChain::with_block_time(0, 2, 3);
        chain.set_block(1, alice, 0);
        chain.set_block(2, alice, 1);
        chain.set_block(3, alice, 2);

        let scan = scan_blocks(
            &providers(chain, 2),
            &HashSet::from([alice]),
            (1, 3),
            BlockScanConfig::default(),
        )
        .await;
        assert_eq!(scan.records[&alice].empty, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_block_is_reported_and_chunk_continues() {
        let alice = ConsensusAddress::repeat_byte(0xa);
        let mut chain = MockChain::with_block_time(0, 2, 20);
        for block in 1..=20 {
            chain.set_block(block, alice, 3);
        }
        chain.fail_block(7);

        let scan = scan_blocks(
            &providers(chain, 2),
            &HashSet::from([alice]),
            (1, 20),
            BlockScanConfig { chunk_size: 10, empty_threshold: 1 },
        )
        .await;

        assert_eq!(scan.unscanned, vec![7]);
        assert_eq!(scan.records[&alice].proposed.len(), 19);
    }

    #[tokio::test]
    async fn fatal_block_only_loses_that_block() {
        let alice = ConsensusAddress::repeat_byte(0xa);
        let mut chain = MockChain::with_block_time(0, 2, 20);
        for block in 1..=20 {
            chain.set_block(block, alice, 3);
        }
        chain.prune_block(7);

        let scan = scan_blocks(
            &providers(chain, 2),
            &HashSet::from([alice]),
            (1, 20),
            BlockScanConfig { chunk_size: 10, empty_threshold: 1 },
        )
        .await;

        assert_eq!(scan.unscanned, vec![7]);
        let expected: Vec<_> = (1..=20).filter(|b| *b != 7).collect();
        assert_eq!(scan.records[&alice].proposed, expected);
    }

    #[tokio::test]
    async fn blocks_past_head_are_unscanned() {
        let alice = ConsensusAddress::repeat_byte(0xa);
        let mut chain = MockChain::with_block_time(0, 2, 15);
        for block in 1..=15 {
            chain.set_block(block, alice, 3);
        }

        let scan = scan_blocks(
            &providers(chain, 2),
            &HashSet::from([alice]),
            (1, 20),
            BlockScanConfig { chunk_size: 10, empty_threshold: 1 },
        )
        .await;

        assert_eq!(scan.records[&alice].proposed, (1..=15).collect::<Vec<_>>());
        assert_eq!(scan.unscanned, (16..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn day_with_one_empty_block_of_three() {
        let alice = ConsensusAddress::repeat_byte(0xa);
        let mut chain = MockChain::with_block_time(0, 2, 130);
        chain.set_block(100, alice, 5);
        chain.set_block(105, alice, 0);
        chain.set_block(110, alice, 5);

        let scan = scan_blocks(
            &providers(chain, 3),
            &HashSet::from([alice]),
            (100, 120),
            BlockScanConfig { chunk_size: 7, empty_threshold: 1 },
        )
        .await;
        let record = &scan.records[&alice];
        assert_eq!(record.proposed, vec![100, 105, 110]);
        assert_eq!(record.empty, vec![105]);

        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let pubkey = Pubkey::repeat_byte(0xa);
        let input = DayInput {
            total_blocks: record.proposed.len() as u64,
            empty_blocks: record.empty.len() as u64,
            ..Default::default()
        };
        let stats = daily_statistics(&BTreeMap::from([(date, BTreeMap::from([(pubkey, input)]))]));
        let day = &stats[&date][&pubkey];
        assert_eq!((day.total_blocks, day.empty_blocks), (3, 1));
        assert!((day.uptime_score - 66.67).abs() < 0.01);
    }
}
