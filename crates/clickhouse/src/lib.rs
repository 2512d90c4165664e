//! Valscope `ClickHouse` storage: validator registry reads and score upserts.

/// Row types
pub mod models;
/// Registry reader
pub mod reader;
/// Table definitions
pub mod schema;
/// Score writer
pub mod writer;

pub use models::{ScoreMetadataRow, ValidatorRow, ValidatorScoreRow};
pub use reader::ClickhouseReader;
pub use schema::{TABLE_SCHEMAS, TABLES, TableSchema};
pub use writer::ClickhouseWriter;
