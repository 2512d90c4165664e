//! `ClickHouse` writer for valscope
//! Handles database initialization and score upserts

use clickhouse::Client;
use derive_more::Debug;
use eyre::{Context, Result};
use tracing::info;
use url::Url;

use crate::{
    models::{ScoreMetadataRow, ValidatorScoreRow},
    schema::{TABLE_SCHEMAS, TABLES, TableSchema},
};

/// `ClickHouse` writer client
#[derive(Clone, Debug)]
pub struct ClickhouseWriter {
    /// Base client
    #[debug(skip)]
    base: Client,
    /// Database name
    db_name: String,
}

impl ClickhouseWriter {
    /// Create a new `ClickHouse` writer client
    pub fn new(url: Url, db_name: String, username: String, password: String) -> Result<Self> {
        let client = Client::default()
            .with_url(url)
            .with_database(db_name.clone())
            .with_user(username)
            .with_password(password);

        Ok(Self { base: client, db_name })
    }

    /// Create a table with the given schema
    async fn create_table(&self, schema: &TableSchema) -> Result<()> {
        let query = format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (
                {}
            ) ENGINE = {}
            ORDER BY ({})",
            self.db_name, schema.name, schema.columns, schema.engine, schema.order_by
        );

        self.base
            .query(&query)
            .execute()
            .await
            .wrap_err_with(|| format!("Failed to create {} table", schema.name))
    }

    /// Drop a table if it exists
    async fn drop_table(&self, table_name: &str) -> Result<()> {
        self.base
            .query(&format!("DROP TABLE IF EXISTS {}.{}", self.db_name, table_name))
            .execute()
            .await
            .wrap_err_with(|| format!("Failed to drop {table_name} table"))
    }

    /// Create the database and tables, dropping the score tables first if `reset` is set.
    ///
    /// The registry table is never dropped.
    pub async fn init_db(&self, reset: bool) -> Result<()> {
        self.base
            .query(&format!("CREATE DATABASE IF NOT EXISTS {}", self.db_name))
            .execute()
            .await?;

        if reset {
            for table in TABLES.iter().filter(|t| **t != "validators") {
                self.drop_table(table).await?;
            }
            info!(db_name = %self.db_name, "Score tables reset");
        }

        for schema in TABLE_SCHEMAS {
            self.create_table(schema).await?;
        }
        Ok(())
    }

    /// Upsert the latest score of every validator. Older rows with the same pubkey are
    /// collapsed by the table engine.
    pub async fn upsert_scores(&self, rows: &[ValidatorScoreRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut insert = self.base.insert("validator_scores")?;
        for row in rows {
            insert.write(row).await?;
        }
        insert.end().await.wrap_err("Failed to upsert validator scores")?;
        info!(count = rows.len(), "Upserted validator scores");
        Ok(())
    }

    /// Record the window a run covered.
    pub async fn insert_metadata(&self, row: &ScoreMetadataRow) -> Result<()> {
        let mut insert = self.base.insert("score_metadata")?;
        insert.write(row).await?;
        insert.end().await.wrap_err("Failed to insert score metadata")?;
        Ok(())
    }
}
