//! Scoring output: CSV files and score store rows.
use std::io::Write;

use clickhouse::{ScoreMetadataRow, ValidatorScoreRow};
use eyre::{Context, Result};
use primitives::window::DayRanges;

use crate::statistics::ValidatorRanking;

/// Result of one scoring run.
#[derive(Debug, Clone)]
pub struct Report {
    /// Scored days
    pub days: DayRanges,
    /// Validators, best first
    pub rankings: Vec<ValidatorRanking>,
    /// Blocks whose proposer could not be determined
    pub unscanned_blocks: Vec<u64>,
}

impl Report {
    fn window(&self) -> (String, String) {
        let dates = self.days.dates();
        let first = dates.first().map(ToString::to_string).unwrap_or_default();
        let last = dates.last().map(ToString::to_string).unwrap_or_default();
        (first, last)
    }

    /// Rows for the `validator_scores` table.
    pub fn score_rows(&self) -> Vec<ValidatorScoreRow> {
        let (window_start, window_end) = self.window();
        self.rankings
            .iter()
            .enumerate()
            .map(|(i, r)| ValidatorScoreRow {
                pubkey: r.validator.pubkey.to_string(),
                name: r.validator.name.clone(),
                rank: i as u32 + 1,
                uptime_score: r.uptime_score,
                pol_score: r.pol_score,
                stake_scaled_booster_score: r.stake_scaled_booster_score,
                participation_score: r.participation.score,
                total_score: r.total_score,
                stake: r.stake,
                notes: r.notes.join("; "),
                window_start: window_start.clone(),
                window_end: window_end.clone(),
            })
            .collect()
    }

    /// Row for the `score_metadata` table.
    pub fn metadata_row(&self) -> ScoreMetadataRow {
        let (window_start, window_end) = self.window();
        let (start_block, end_block) = self.days.span().unwrap_or_default();
        ScoreMetadataRow {
            window_start,
            window_end,
            days: self.days.len() as u32,
            start_block,
            end_block,
            validator_count: self.rankings.len() as u32,
            unscanned_blocks: self.unscanned_blocks.len() as u64,
        }
    }

    /// One row per validator.
    pub fn write_summary_csv<W: Write>(&self, mut out: W) -> Result<()> {
        writeln!(
            out,
            "rank,name,pubkey,uptime_score,pol_score,stake_scaled_booster_score,participation_score,total_score,stake,notes"
        )?;
        for (i, r) in self.rankings.iter().enumerate() {
            writeln!(
                out,
                "{},{},{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{}",
                i + 1,
                escape(&r.validator.name),
                r.validator.pubkey,
                r.uptime_score,
                r.pol_score,
                r.stake_scaled_booster_score,
                r.participation.score,
                r.total_score,
                r.stake,
                escape(&r.notes.join("; ")),
            )?;
        }
        out.flush().wrap_err("failed to write summary csv")
    }

    /// One row per validator and day.
    pub fn write_daily_csv<W: Write>(&self, mut out: W) -> Result<()> {
        writeln!(
            out,
            "date,name,pubkey,total_blocks,empty_blocks,uptime_score,pol_score,stake_scaled_booster_score,stake,boost,pol_ratio,usd_total,usd_values"
        )?;
        for day in &self.days {
            for r in &self.rankings {
                let Some(s) = r.daily.get(&day.date) else {
                    continue;
                };
                let usd_values = s
                    .usd_values
                    .iter()
                    .map(|(token, usd)| format!("{token}={usd:.2}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                writeln!(
                    out,
                    "{},{},{},{},{},{:.2},{:.2},{:.2},{:.2},{:.4},{:.6},{:.2},{}",
                    day.date,
                    escape(&r.validator.name),
                    r.validator.pubkey,
                    s.total_blocks,
                    s.empty_blocks,
                    s.uptime_score,
                    s.pol_score,
                    s.stake_scaled_booster_score,
                    s.stake,
                    s.boost,
                    s.pol_ratio,
                    s.usd_total,
                    escape(&usd_values),
                )?;
            }
        }
        out.flush().wrap_err("failed to write daily csv")
    }
}

/// Quote a CSV field when it contains a separator, quote or newline.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}
