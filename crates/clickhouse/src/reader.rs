//! `ClickHouse` reader for the validator registry

use std::time::Instant;

use clickhouse::{Client, Row};
use derive_more::Debug;
use eyre::Result;
use primitives::validator::Validator;
use serde::Deserialize;
use tracing::{debug, error, warn};
use url::Url;

use crate::models::ValidatorRow;

/// `ClickHouse` reader client (read-only operations)
#[derive(Clone, Debug)]
pub struct ClickhouseReader {
    /// Base client
    #[debug(skip)]
    base: Client,
    /// Database name
    db_name: String,
}

impl ClickhouseReader {
    /// Create a new `ClickHouse` reader client
    pub fn new(url: Url, db_name: String, username: String, password: String) -> Result<Self> {
        let client = Client::default().with_url(url).with_user(username).with_password(password);

        Ok(Self { base: client, db_name })
    }

    async fn execute<R>(&self, query: &str) -> Result<Vec<R>>
    where
        R: Row + for<'b> Deserialize<'b>,
    {
        let start = Instant::now();
        let result = self.base.query(query).fetch_all::<R>().await;

        let duration_ms = start.elapsed().as_millis();
        match &result {
            Ok(rows) => {
                debug!(query = %query, duration_ms, rows = rows.len(), "ClickHouse query executed")
            }
            Err(e) => error!(query = %query, duration_ms, error = %e, "ClickHouse query failed"),
        }
        result.map_err(Into::into)
    }

    /// Every validator in the registry, ordered by name. Rows with malformed keys are
    /// skipped with a warning.
    pub async fn get_all_validators(&self) -> Result<Vec<Validator>> {
        let query = format!(
            "SELECT name, pubkey, proposer_address, operator, voting_power \
             FROM {}.validators FINAL \
             ORDER BY name",
            self.db_name
        );
        let rows: Vec<ValidatorRow> = self.execute(&query).await?;

        let validators = rows
            .into_iter()
            .filter_map(|row| {
                let name = row.name.clone();
                Validator::try_from(row)
                    .inspect_err(|e| warn!(name, error = %e, "skipping malformed registry row"))
                    .ok()
            })
            .collect();
        Ok(validators)
    }
}
