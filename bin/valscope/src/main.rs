//! Entrypoint.

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use clap::Parser;
use clickhouse::{ClickhouseReader, ClickhouseWriter};
use config::Opts;
use dotenvy::dotenv;
use extractor::{ChainReader, RpcChainClient};
use eyre::{Context, Result};
use pricing::PricingClient;
use primitives::pipeline::MultiProvider;
use scoring::{
    Contracts, EngineConfig, Report, ScoringEngine, block_scanner::BlockScanConfig,
    day_boundary::BoundarySearch,
};
use tracing::{info, warn};
use tracing_subscriber::filter::EnvFilter;

fn providers(opts: &Opts) -> MultiProvider<dyn ChainReader> {
    let retry = opts.scan.retry_policy();
    let rpc = &opts.rpc;
    let primary: Arc<dyn ChainReader> =
        Arc::new(RpcChainClient::new(rpc.el_url.clone(), rpc.cl_url.clone(), retry));

    let alternate: Arc<dyn ChainReader> =
        if rpc.el_alternate_url.is_none() && rpc.cl_alternate_url.is_none() {
            Arc::clone(&primary)
        } else {
            let el = rpc.el_alternate_url.clone().unwrap_or_else(|| rpc.el_url.clone());
            let cl = rpc.cl_alternate_url.clone().unwrap_or_else(|| rpc.cl_url.clone());
            info!(el = %el, cl = %cl, "using alternate endpoints");
            Arc::new(RpcChainClient::new(el, cl, retry))
        };

    MultiProvider::new(primary, alternate, opts.scan.max_concurrency)
}

fn engine_config(opts: &Opts) -> EngineConfig {
    EngineConfig {
        contracts: Contracts {
            berachef: opts.contracts.berachef,
            bgt: opts.contracts.bgt,
            honey: opts.contracts.honey,
            wbera: opts.contracts.wbera,
        },
        max_concurrency: opts.scan.max_concurrency,
        block_scan: BlockScanConfig {
            chunk_size: opts.scan.block_chunk_size,
            empty_threshold: opts.scan.empty_block_threshold,
        },
        log_chunk_size: opts.scan.log_chunk_size,
        boundary: BoundarySearch { max_steps: opts.scan.boundary_search_steps },
    }
}

/// `scores.csv` -> `scores_daily.csv`
fn daily_path(output: &Path) -> PathBuf {
    let stem = output.file_stem().and_then(|s| s.to_str()).unwrap_or("validator_scores");
    let file = match output.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_daily.{ext}"),
        None => format!("{stem}_daily"),
    };
    output.with_file_name(file)
}

fn write_csv(report: &Report, opts: &Opts) -> Result<()> {
    let path = &opts.output.output;
    let file = File::create(path).wrap_err_with(|| format!("failed to create {}", path.display()))?;
    report.write_summary_csv(BufWriter::new(file))?;
    info!(path = %path.display(), "summary written");

    if opts.output.verbose {
        let path = daily_path(path);
        let file =
            File::create(&path).wrap_err_with(|| format!("failed to create {}", path.display()))?;
        report.write_daily_csv(BufWriter::new(file))?;
        info!(path = %path.display(), "daily breakdown written");
    }
    Ok(())
}

async fn store(report: &Report, opts: &Opts) -> Result<()> {
    let writer = ClickhouseWriter::new(
        opts.clickhouse.url.clone(),
        opts.clickhouse.db.clone(),
        opts.clickhouse.username.clone(),
        opts.clickhouse.password.clone(),
    )?;
    writer.init_db(opts.output.reset_db).await?;
    writer.upsert_scores(&report.score_rows()).await?;
    writer.insert_metadata(&report.metadata_row()).await?;
    info!(rows = report.rankings.len(), "scores stored");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Ok(custom_env_file) = std::env::var("ENV_FILE") {
        dotenvy::from_filename(custom_env_file)?;
    } else {
        // Try the default .env file, and ignore if it doesn't exist.
        dotenv().ok();
    }

    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    info!("🔭 Valscope scoring starting...");

    let end_date = opts.window.end_date.unwrap_or_else(|| Utc::now().date_naive());

    let reader = ClickhouseReader::new(
        opts.clickhouse.url.clone(),
        opts.clickhouse.db.clone(),
        opts.clickhouse.username.clone(),
        opts.clickhouse.password.clone(),
    )?;
    let validators =
        reader.get_all_validators().await.wrap_err("failed to load validator registry")?;
    info!(count = validators.len(), "validators loaded");

    let prices = Arc::new(PricingClient::new(
        opts.pricing.url.clone(),
        opts.pricing.api_key.clone(),
        opts.scan.retry_policy(),
    ));
    let engine = ScoringEngine::new(providers(&opts), prices, engine_config(&opts));
    let report = engine.run(&validators, end_date, opts.window.days).await?;

    for (rank, r) in report.rankings.iter().enumerate().take(10) {
        info!(
            rank = rank + 1,
            name = %r.validator.name,
            total = %format!("{:.2}", r.total_score),
            "ranked"
        );
    }
    if !report.unscanned_blocks.is_empty() {
        warn!(count = report.unscanned_blocks.len(), "scores exclude unscanned blocks");
    }

    write_csv(&report, &opts)?;

    if opts.output.dry_run {
        info!("dry run, score store left untouched");
    } else {
        store(&report, &opts).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_path_keeps_extension() {
        assert_eq!(daily_path(Path::new("out/scores.csv")), PathBuf::from("out/scores_daily.csv"));
        assert_eq!(daily_path(Path::new("scores")), PathBuf::from("scores_daily"));
    }
}
