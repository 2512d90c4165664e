//! Core primitives for valscope.
/// Per-day incentive ledger
pub mod ledger;
/// Bounded concurrency pipelines
pub mod pipeline;
/// RPC retry and error classification
pub mod retries;
/// Fixed-point USD helpers
pub mod units;
/// Validator identity types
pub mod validator;
/// Day ranges and block range chunking
pub mod window;
