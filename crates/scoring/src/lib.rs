//! Valscope scoring engine.
//!
//! Turns a validator registry and a window of calendar days into ranked 0-100 scores for
//! block production, boost efficiency, incentive yield and reward-allocation participation.

/// Per-proposer block production
pub mod block_scanner;
/// Calendar day to block height resolution
pub mod day_boundary;
/// End-to-end orchestration
pub mod engine;
/// Incentive event accumulation
pub mod event_indexer;
/// Chunked log queries
pub mod logs;
/// Reward allocation participation
pub mod participation;
/// CSV and score store output
pub mod report;
/// Daily stake and boost
pub mod stake;
/// Normalization and ranking
pub mod statistics;
/// Token metadata and USD conversion
pub mod valuation;

pub use engine::{Contracts, EngineConfig, ScoringEngine};
pub use report::Report;
