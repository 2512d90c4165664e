//! Day ranges and block range partitioning.
use std::collections::BTreeMap;

use alloy_primitives::BlockNumber;
use chrono::{Datelike, IsoWeek, NaiveDate, NaiveTime};
use eyre::{Result, bail};
use serde::{Deserialize, Serialize};

/// Seconds in a UTC day.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// UNIX timestamp of `date` at 00:00 UTC.
pub fn midnight_timestamp(date: NaiveDate) -> u64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp().max(0) as u64
}

/// A calendar date mapped to an inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRange {
    /// The UTC date
    pub date: NaiveDate,
    /// First block with a timestamp on or after midnight
    pub start_block: BlockNumber,
    /// Last block before the next day's boundary
    pub end_block: BlockNumber,
}

impl DayRange {
    /// Whether `block` falls inside this day.
    pub const fn contains(&self, block: BlockNumber) -> bool {
        block >= self.start_block && block <= self.end_block
    }

    /// Number of blocks in the day.
    pub const fn len(&self) -> u64 {
        self.end_block - self.start_block + 1
    }

    /// A day range always holds at least one block.
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// ISO week of the date.
    pub fn iso_week(&self) -> IsoWeek {
        self.date.iso_week()
    }
}

/// Contiguous, ordered day ranges covering the analysis window.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DayRanges {
    ranges: Vec<DayRange>,
}

impl DayRanges {
    /// Build ranges from resolved boundaries.
    ///
    /// `boundaries` holds one entry per window date plus a trailing sentinel date whose
    /// boundary closes the last day. Day `d` spans `[b(d), b(d + 1) - 1]`.
    pub fn from_boundaries(boundaries: &BTreeMap<NaiveDate, BlockNumber>) -> Result<Self> {
        if boundaries.len() < 2 {
            bail!("need at least one day and a closing boundary, got {}", boundaries.len());
        }

        let entries: Vec<_> = boundaries.iter().map(|(d, b)| (*d, *b)).collect();
        let mut ranges = Vec::with_capacity(entries.len() - 1);
        for pair in entries.windows(2) {
            let (date, start_block) = pair[0];
            let (next_date, next_start) = pair[1];
            if next_date.pred_opt() != Some(date) {
                bail!("day range for {date} is not followed by {}", date.succ_opt().unwrap_or(date));
            }
            if next_start <= start_block {
                bail!("missing day range for {date}: no blocks between {start_block} and {next_start}");
            }
            ranges.push(DayRange { date, start_block, end_block: next_start - 1 });
        }

        Ok(Self { ranges })
    }

    /// Wrap already-built ranges, checking contiguity.
    pub fn new(ranges: Vec<DayRange>) -> Result<Self> {
        for pair in ranges.windows(2) {
            if pair[0].end_block + 1 != pair[1].start_block {
                bail!("day ranges {} and {} are not contiguous", pair[0].date, pair[1].date);
            }
        }
        Ok(Self { ranges })
    }

    /// The day containing `block`, if any.
    pub fn date_of(&self, block: BlockNumber) -> Option<NaiveDate> {
        let idx = self.ranges.partition_point(|r| r.end_block < block);
        self.ranges.get(idx).filter(|r| r.contains(block)).map(|r| r.date)
    }

    /// Iterate over all days in order.
    pub fn iter(&self) -> std::slice::Iter<'_, DayRange> {
        self.ranges.iter()
    }

    /// All window dates in order.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.ranges.iter().map(|r| r.date).collect()
    }

    /// Distinct ISO weeks touched by the window, in order.
    pub fn iso_weeks(&self) -> Vec<IsoWeek> {
        let mut weeks: Vec<IsoWeek> = Vec::new();
        for range in &self.ranges {
            let week = range.iso_week();
            if weeks.last() != Some(&week) {
                weeks.push(week);
            }
        }
        weeks
    }

    /// The whole window as `(first start, last end)`.
    pub fn span(&self) -> Option<(BlockNumber, BlockNumber)> {
        Some((self.ranges.first()?.start_block, self.ranges.last()?.end_block))
    }

    /// Number of days.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether there are no days.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl<'a> IntoIterator for &'a DayRanges {
    type Item = &'a DayRange;
    type IntoIter = std::slice::Iter<'a, DayRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

/// Partition `[start, end]` into contiguous inclusive chunks of at most `size` blocks.
pub fn chunk_range(start: BlockNumber, end: BlockNumber, size: u64) -> Vec<(BlockNumber, BlockNumber)> {
    if start > end {
        return Vec::new();
    }
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(((end - start) / size + 1) as usize);
    let mut from = start;
    loop {
        let to = from.saturating_add(size - 1).min(end);
        chunks.push((from, to));
        if to == end {
            break;
        }
        from = to + 1;
    }
    chunks
}
