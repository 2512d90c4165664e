//! Row types stored in `ClickHouse`.
use alloy_primitives::Address;
use clickhouse::Row;
use eyre::{Context, Result};
use primitives::validator::{ConsensusAddress, Pubkey, Validator};
use serde::{Deserialize, Serialize};

/// Registry row. Keys and addresses are stored as hex strings.
#[derive(Debug, Clone, Row, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatorRow {
    /// Display name
    pub name: String,
    /// Consensus public key
    pub pubkey: String,
    /// CometBFT proposer address
    pub proposer_address: String,
    /// Operator address
    pub operator: String,
    /// Last-known voting power
    pub voting_power: u64,
}

impl TryFrom<ValidatorRow> for Validator {
    type Error = eyre::Error;

    fn try_from(row: ValidatorRow) -> Result<Self, Self::Error> {
        let pubkey: Pubkey =
            row.pubkey.parse().wrap_err_with(|| format!("invalid pubkey {}", row.pubkey))?;
        let proposer_address: ConsensusAddress = row
            .proposer_address
            .parse()
            .wrap_err_with(|| format!("invalid proposer address {}", row.proposer_address))?;
        let operator: Address =
            row.operator.parse().wrap_err_with(|| format!("invalid operator {}", row.operator))?;

        Ok(Self {
            name: row.name,
            pubkey,
            proposer_address,
            operator,
            voting_power: row.voting_power,
        })
    }
}

/// Latest score of one validator.
#[derive(Debug, Clone, Row, Serialize, Deserialize, PartialEq)]
pub struct ValidatorScoreRow {
    /// Consensus public key (hex)
    pub pubkey: String,
    /// Display name
    pub name: String,
    /// 1-based rank by total score
    pub rank: u32,
    /// Block production uptime
    pub uptime_score: f64,
    /// Boost efficiency
    pub pol_score: f64,
    /// Stake-scaled incentive yield
    pub stake_scaled_booster_score: f64,
    /// Reward allocation participation
    pub participation_score: f64,
    /// Mean of the four scores
    pub total_score: f64,
    /// Stake on the last day of the window
    pub stake: f64,
    /// Anomalies observed while scoring
    pub notes: String,
    /// First day of the window
    pub window_start: String,
    /// Last day of the window
    pub window_end: String,
}

/// Description of one scoring run.
#[derive(Debug, Clone, Row, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreMetadataRow {
    /// First day of the window
    pub window_start: String,
    /// Last day of the window
    pub window_end: String,
    /// Number of days
    pub days: u32,
    /// First block of the window
    pub start_block: u64,
    /// Last block of the window
    pub end_block: u64,
    /// Validators scored
    pub validator_count: u32,
    /// Blocks whose proposer could not be resolved
    pub unscanned_blocks: u64,
}
