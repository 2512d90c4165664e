//! Valscope configuration
use std::{path::PathBuf, time::Duration};

use alloy_primitives::Address;
use chrono::NaiveDate;
use clap::Parser;
use primitives::retries::RetryPolicy;
use url::Url;

/// Clickhouse database configuration options
#[derive(Debug, Clone, Parser)]
pub struct ClickhouseOpts {
    /// Clickhouse URL
    #[clap(id = "clickhouse_url", long = "clickhouse-url", env = "CLICKHOUSE_URL")]
    pub url: Url,
    /// Clickhouse database
    #[clap(long = "clickhouse-db", env = "CLICKHOUSE_DB", default_value = "valscope")]
    pub db: String,
    /// Clickhouse username
    #[clap(long = "clickhouse-username", env = "CLICKHOUSE_USERNAME", default_value = "default")]
    pub username: String,
    /// Clickhouse password
    #[clap(long = "clickhouse-password", env = "CLICKHOUSE_PASSWORD", default_value = "")]
    pub password: String,
}

/// RPC endpoint configuration options
#[derive(Debug, Clone, Parser)]
pub struct RpcOpts {
    /// Execution layer RPC URL
    #[clap(long, env = "EL_RPC_URL")]
    pub el_url: Url,
    /// Second execution layer RPC URL, sharing the scan load with the first
    #[clap(long, env = "EL_ALTERNATE_RPC_URL")]
    pub el_alternate_url: Option<Url>,
    /// Consensus layer (CometBFT) RPC URL
    #[clap(long, env = "CL_RPC_URL")]
    pub cl_url: Url,
    /// Second consensus layer RPC URL
    #[clap(long, env = "CL_ALTERNATE_RPC_URL")]
    pub cl_alternate_url: Option<Url>,
}

/// Proof-of-Liquidity contract and token addresses
#[derive(Debug, Clone, Parser)]
pub struct ContractOpts {
    /// BeraChef address
    #[clap(long, env = "BERACHEF_ADDRESS", default_value = "0xdf960E8F3F19C481dDE769edEDD439ea1a63426a")]
    pub berachef: Address,
    /// BGT token address
    #[clap(long, env = "BGT_ADDRESS", default_value = "0x656b95E550C07a9ffe548bd4085c72418Ceb1dba")]
    pub bgt: Address,
    /// USD-pegged token used as the quote currency
    #[clap(long, env = "HONEY_ADDRESS", default_value = "0xFCBD14DC51f0A4d49d5E53C2E0950e0bC26d0Dce")]
    pub honey: Address,
    /// Wrapped native token, used to price BGT
    #[clap(long, env = "WBERA_ADDRESS", default_value = "0x6969696969696969696969696969696969696969")]
    pub wbera: Address,
}

/// Swap quote API configuration
#[derive(Debug, Clone, Parser)]
pub struct PricingOpts {
    /// Base URL of the swap quote API
    #[clap(id = "pricing_url", long = "pricing-url", env = "PRICING_API_URL")]
    pub url: Url,
    /// Bearer token for the swap quote API
    #[clap(id = "pricing_api_key", long = "pricing-api-key", env = "PRICING_API_KEY")]
    pub api_key: Option<String>,
}

/// Analysis window
#[derive(Debug, Clone, Parser)]
pub struct WindowOpts {
    /// Number of days to score
    #[clap(long, env = "WINDOW_DAYS", default_value = "7", value_parser = clap::value_parser!(u32).range(1..=366))]
    pub days: u32,
    /// Day after the last scored day (YYYY-MM-DD). Defaults to today in UTC.
    #[clap(long, env = "WINDOW_END_DATE")]
    pub end_date: Option<NaiveDate>,
}

/// Scan tuning
#[derive(Debug, Clone, Parser)]
pub struct ScanOpts {
    /// Maximum in-flight requests per pipeline
    #[clap(long, env = "MAX_CONCURRENCY", default_value = "32")]
    pub max_concurrency: usize,
    /// Blocks per block-scan chunk
    #[clap(long, env = "BLOCK_CHUNK_SIZE", default_value = "100")]
    pub block_chunk_size: u64,
    /// Blocks per log query
    #[clap(long, env = "LOG_CHUNK_SIZE", default_value = "2000")]
    pub log_chunk_size: u64,
    /// A block with at most this many transactions counts as empty
    #[clap(long, env = "EMPTY_BLOCK_THRESHOLD", default_value = "1")]
    pub empty_block_threshold: u64,
    /// Binary search steps per day boundary before falling back to a linear scan
    #[clap(long, env = "BOUNDARY_SEARCH_STEPS", default_value = "64")]
    pub boundary_search_steps: u32,
    /// Retries per RPC call after the first attempt
    #[clap(long, env = "RPC_MAX_RETRIES", default_value = "5")]
    pub rpc_max_retries: u32,
    /// Delay before the first retry, in milliseconds
    #[clap(long, env = "RPC_INITIAL_DELAY_MS", default_value = "500")]
    pub rpc_initial_delay_ms: u64,
    /// Timeout of a single RPC attempt, in seconds
    #[clap(long, env = "RPC_TIMEOUT_SECS", default_value = "30")]
    pub rpc_timeout_secs: u64,
}

impl ScanOpts {
    /// Retry policy applied to every network call.
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.rpc_max_retries,
            initial_delay: Duration::from_millis(self.rpc_initial_delay_ms),
            timeout: Duration::from_secs(self.rpc_timeout_secs),
        }
    }
}

/// Report output
#[derive(Debug, Clone, Parser)]
pub struct OutputOpts {
    /// Summary CSV path
    #[clap(long, env = "OUTPUT_CSV", default_value = "validator_scores.csv")]
    pub output: PathBuf,
    /// Also write a per-day CSV next to the summary
    #[clap(long)]
    pub verbose: bool,
    /// Skip writing scores to the score store
    #[clap(long)]
    pub dry_run: bool,
    /// If set, drop & re-create the score tables (local/dev only)
    #[clap(long)]
    pub reset_db: bool,
}

/// CLI options for valscope
#[derive(Debug, Clone, Parser)]
#[clap(name = "valscope", about = "Score validator performance over a window of days")]
pub struct Opts {
    /// Clickhouse database configuration
    #[clap(flatten)]
    pub clickhouse: ClickhouseOpts,

    /// RPC endpoint configuration
    #[clap(flatten)]
    pub rpc: RpcOpts,

    /// Contract addresses
    #[clap(flatten)]
    pub contracts: ContractOpts,

    /// Pricing API configuration
    #[clap(flatten)]
    pub pricing: PricingOpts,

    /// Analysis window
    #[clap(flatten)]
    pub window: WindowOpts,

    /// Scan tuning
    #[clap(flatten)]
    pub scan: ScanOpts,

    /// Report output
    #[clap(flatten)]
    pub output: OutputOpts,
}
