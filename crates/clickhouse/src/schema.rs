//! Schema definitions for `ClickHouse` tables

/// Table schema definition
#[derive(Debug)]
pub struct TableSchema {
    /// Table name
    pub name: &'static str,
    /// Column definitions
    pub columns: &'static str,
    /// Table engine
    pub engine: &'static str,
    /// Sorting key
    pub order_by: &'static str,
}

/// Names of all tables
pub const TABLES: &[&str] = &["validators", "validator_scores", "score_metadata"];

/// Schema definitions for tables
pub const TABLE_SCHEMAS: &[TableSchema] = &[
    TableSchema {
        name: "validators",
        columns: "name String,
                 pubkey String,
                 proposer_address String,
                 operator String,
                 voting_power UInt64,
                 inserted_at DateTime64(3) DEFAULT now64()",
        engine: "ReplacingMergeTree(inserted_at)",
        order_by: "pubkey",
    },
    TableSchema {
        name: "validator_scores",
        columns: "pubkey String,
                 name String,
                 rank UInt32,
                 uptime_score Float64,
                 pol_score Float64,
                 stake_scaled_booster_score Float64,
                 participation_score Float64,
                 total_score Float64,
                 stake Float64,
                 notes String,
                 window_start String,
                 window_end String,
                 updated_at DateTime64(3) DEFAULT now64()",
        engine: "ReplacingMergeTree(updated_at)",
        order_by: "pubkey",
    },
    TableSchema {
        name: "score_metadata",
        columns: "window_start String,
                 window_end String,
                 days UInt32,
                 start_block UInt64,
                 end_block UInt64,
                 validator_count UInt32,
                 unscanned_blocks UInt64,
                 computed_at DateTime64(3) DEFAULT now64()",
        engine: "MergeTree()",
        order_by: "computed_at",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_has_a_schema() {
        let names: Vec<_> = TABLE_SCHEMAS.iter().map(|s| s.name).collect();
        assert_eq!(names, TABLES);
    }

    #[test]
    fn scores_are_deduplicated_by_pubkey() {
        let scores = TABLE_SCHEMAS.iter().find(|s| s.name == "validator_scores").unwrap();
        assert!(scores.engine.starts_with("ReplacingMergeTree"));
        assert_eq!(scores.order_by, "pubkey");
    }
}
