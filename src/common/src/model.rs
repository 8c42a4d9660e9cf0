use std::fmt;

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Identifies one logical partition across the primary claims table and the
/// secondary duplicate-check table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    pub payer_key: i64,
    pub member_key: i64,
}

impl PartitionKey {
    pub fn new(payer_key: i64, member_key: i64) -> Self {
        Self {
            payer_key,
            member_key,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "payer={} member={}", self.payer_key, self.member_key)
    }
}

/// A half-open `[from, to)` service-date range. Constructed only through
/// [`DeleteWindow::new`], which enforces `from < to` before any store call
/// can see the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteWindow {
    from: NaiveDate,
    to: NaiveDate,
}

impl DeleteWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, ValidationError> {
        if from >= to {
            return Err(ValidationError::EmptyWindow {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Ok(Self { from, to })
    }

    /// The erasure horizon `[start, today + 1 day)`. The exclusive upper
    /// bound sits one day past `today` so rows written up to call time are
    /// included.
    pub fn horizon(start: NaiveDate, today: NaiveDate) -> Result<Self, ValidationError> {
        let end = today.checked_add_days(Days::new(1)).unwrap_or(today);
        Self::new(start, end)
    }

    pub fn from_inclusive(&self) -> NaiveDate {
        self.from
    }

    pub fn to_exclusive(&self) -> NaiveDate {
        self.to
    }

    /// Tile this window into consecutive chunks of `months` width. A window
    /// no wider than `months` yields itself as the single chunk. The
    /// trailing chunk is clamped to `to`; chunks never overlap and never
    /// leave a gap: each chunk's exclusive end is the next chunk's start.
    pub fn tile_months(&self, months: u32) -> Vec<DeleteWindow> {
        if months == 0 {
            return vec![*self];
        }
        let mut chunks = Vec::new();
        let mut cursor = self.from;
        while cursor < self.to {
            let next = match cursor.checked_add_months(Months::new(months)) {
                Some(date) => date.min(self.to),
                None => self.to,
            };
            chunks.push(DeleteWindow {
                from: cursor,
                to: next,
            });
            cursor = next;
        }
        chunks
    }
}

impl fmt::Display for DeleteWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

/// Month-width used to subdivide a window once it exceeds the store's
/// per-statement quota. Shrinks 12 → 6 → 3 → 1 and never widens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Twelve,
    Six,
    Three,
    One,
}

impl Granularity {
    pub fn months(&self) -> u32 {
        match self {
            Granularity::Twelve => 12,
            Granularity::Six => 6,
            Granularity::Three => 3,
            Granularity::One => 1,
        }
    }

    /// The next narrower step, or `None` once at one month.
    pub fn shrink(&self) -> Option<Granularity> {
        match self {
            Granularity::Twelve => Some(Granularity::Six),
            Granularity::Six => Some(Granularity::Three),
            Granularity::Three => Some(Granularity::One),
            Granularity::One => None,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} month(s)", self.months())
    }
}

/// One unit of work for the orchestrator: a partition, optionally scoped to
/// an explicit window. Jobs carry no persisted state; a failed job is
/// resubmitted whole.
#[derive(Debug, Clone, Copy)]
pub struct ErasureJob {
    pub key: PartitionKey,
    pub window: Option<DeleteWindow>,
}

impl ErasureJob {
    pub fn full_partition(key: PartitionKey) -> Self {
        Self { key, window: None }
    }

    pub fn windowed(key: PartitionKey, window: DeleteWindow) -> Self {
        Self {
            key,
            window: Some(window),
        }
    }
}
