//! In-memory [`ChainReader`] for tests.
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use alloy::{
    primitives::{Address, B256, BlockNumber, Bytes, LogData},
    sol_types::{SolCall, SolValue},
};
use alloy_rpc_types_eth::{Filter, Log};
use async_trait::async_trait;
use primitives::{retries::RpcError, validator::ConsensusAddress};

use crate::{ChainReader, ConsensusValidator};

/// A fake chain: block `n` has timestamp `timestamps[n]`, the head is the last index.
#[derive(Debug, Default)]
pub struct MockChain {
    timestamps: Vec<u64>,
    proposers: HashMap<BlockNumber, ConsensusAddress>,
    tx_counts: HashMap<BlockNumber, u64>,
    validator_sets: BTreeMap<BlockNumber, Vec<ConsensusValidator>>,
    logs: Vec<Log>,
    calls: HashMap<(Address, Bytes), Bytes>,
    failing_blocks: HashSet<BlockNumber>,
    pruned_blocks: HashSet<BlockNumber>,
    failing_log_ranges: Vec<(BlockNumber, BlockNumber)>,
    timestamp_reads: AtomicUsize,
    log_requests: AtomicUsize,
    call_targets: Mutex<Vec<Address>>,
}

impl MockChain {
    /// A chain with the given per-block timestamps (index 0 is genesis).
    pub fn new(timestamps: Vec<u64>) -> Self {
        Self { timestamps, ..Default::default() }
    }

    /// A chain of `blocks + 1` blocks, `block_time` seconds apart, starting at `genesis`.
    pub fn with_block_time(genesis: u64, block_time: u64, blocks: u64) -> Self {
        Self::new((0..=blocks).map(|n| genesis + n * block_time).collect())
    }

    /// Head block number.
    pub fn head(&self) -> BlockNumber {
        self.timestamps.len().saturating_sub(1) as BlockNumber
    }

    /// Set the proposer and transaction count of `block`.
    pub fn set_block(&mut self, block: BlockNumber, proposer: ConsensusAddress, tx_count: u64) {
        self.proposers.insert(block, proposer);
        self.tx_counts.insert(block, tx_count);
    }

    /// Set the validator set in effect from `block` onwards.
    pub fn set_validator_set(&mut self, block: BlockNumber, set: Vec<ConsensusValidator>) {
        self.validator_sets.insert(block, set);
    }

    /// Emit a log from `address` at `block`.
    pub fn push_log(&mut self, address: Address, block: BlockNumber, topics: Vec<B256>, data: Bytes) {
        let index = self.logs.len() as u64;
        self.logs.push(Log {
            inner: alloy::primitives::Log { address, data: LogData::new_unchecked(topics, data) },
            block_number: Some(block),
            log_index: Some(index),
            ..Default::default()
        });
    }

    /// Answer `call` against `to` with the ABI encoding of `value`.
    pub fn respond<C: SolCall, V: SolValue>(&mut self, to: Address, call: &C, value: V) {
        self.calls.insert((to, Bytes::from(call.abi_encode())), Bytes::from(value.abi_encode()));
    }

    /// Make every header and proposer read of `block` fail transiently.
    pub fn fail_block(&mut self, block: BlockNumber) {
        self.failing_blocks.insert(block);
    }

    /// Make every header and proposer read of `block` fail fatally.
    pub fn prune_block(&mut self, block: BlockNumber) {
        self.pruned_blocks.insert(block);
    }

    /// Make log queries overlapping `[from, to]` fail transiently.
    pub fn fail_logs(&mut self, from: BlockNumber, to: BlockNumber) {
        self.failing_log_ranges.push((from, to));
    }

    /// How many timestamps have been read so far.
    pub fn timestamp_reads(&self) -> usize {
        self.timestamp_reads.load(Ordering::Relaxed)
    }

    /// How many log queries have been issued so far.
    pub fn log_requests(&self) -> usize {
        self.log_requests.load(Ordering::Relaxed)
    }

    /// How many `eth_call`s have been sent to `to` so far.
    pub fn calls_to(&self, to: Address) -> usize {
        self.call_targets
            .lock()
            .map(|targets| targets.iter().filter(|t| **t == to).count())
            .unwrap_or_default()
    }

    fn check_block(&self, number: BlockNumber) -> Result<(), RpcError> {
        if self.failing_blocks.contains(&number) {
            return Err(RpcError::Transient(format!("block {number} unavailable")));
        }
        if self.pruned_blocks.contains(&number) {
            return Err(RpcError::Fatal(format!("height {number} is pruned")));
        }
        if number > self.head() {
            return Err(RpcError::Fatal(format!("block {number} beyond head {}", self.head())));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn latest_block_number(&self) -> Result<BlockNumber, RpcError> {
        Ok(self.head())
    }

    async fn block_timestamp(&self, number: BlockNumber) -> Result<u64, RpcError> {
        self.timestamp_reads.fetch_add(1, Ordering::Relaxed);
        self.check_block(number)?;
        Ok(self.timestamps[number as usize])
    }

    async fn block_transaction_count(&self, number: BlockNumber) -> Result<u64, RpcError> {
        self.check_block(number)?;
        Ok(self.tx_counts.get(&number).copied().unwrap_or_default())
    }

    async fn block_proposer(&self, number: BlockNumber) -> Result<ConsensusAddress, RpcError> {
        self.check_block(number)?;
        Ok(self.proposers.get(&number).copied().unwrap_or_default())
    }

    async fn validator_set(
        &self,
        number: BlockNumber,
    ) -> Result<Vec<ConsensusValidator>, RpcError> {
        Ok(self
            .validator_sets
            .range(..=number)
            .next_back()
            .map(|(_, set)| set.clone())
            .unwrap_or_default())
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError> {
        self.log_requests.fetch_add(1, Ordering::Relaxed);
        let from = filter.get_from_block().unwrap_or_default();
        let to = filter.get_to_block().unwrap_or(u64::MAX);
        if self.failing_log_ranges.iter().any(|(f, t)| *f <= to && from <= *t) {
            return Err(RpcError::Transient(format!("logs {from}..={to} unavailable")));
        }

        Ok(self
            .logs
            .iter()
            .filter(|log| log.block_number.is_some_and(|b| b >= from && b <= to))
            .filter(|log| filter.address.matches(&log.address()))
            .filter(|log| {
                let topics = log.topics();
                filter.topics.iter().enumerate().all(|(i, set)| {
                    set.is_empty() || topics.get(i).is_some_and(|topic| set.matches(topic))
                })
            })
            .cloned()
            .collect())
    }

    async fn call(&self, to: Address, data: Bytes, _number: BlockNumber) -> Result<Bytes, RpcError> {
        if let Ok(mut targets) = self.call_targets.lock() {
            targets.push(to);
        }
        self.calls
            .get(&(to, data))
            .cloned()
            .ok_or_else(|| RpcError::fatal("execution reverted"))
    }
}
