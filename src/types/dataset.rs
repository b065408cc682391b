//! Pages, datasets and reporting windows.

use serde::{Deserialize, Serialize};
use time::Date;

use crate::error::AdsError;
use crate::types::record::{Record, RecordKind};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Longest reporting window accepted in one logical request.
pub const MAX_WINDOW_DAYS: i64 = 366;

/// Inclusive reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// First day (inclusive)
    #[serde(with = "iso_date")]
    pub start: Date,
    /// Last day (inclusive)
    #[serde(with = "iso_date")]
    pub end: Date,
}

impl DateRange {
    /// Create a validated reporting window.
    pub fn new(start: Date, end: Date) -> Result<Self, AdsError> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    /// Check ordering and maximum span.
    pub fn validate(&self) -> Result<(), AdsError> {
        if self.start > self.end {
            return Err(AdsError::InvalidRequest(
                "date range start is after end".to_string(),
            ));
        }
        if (self.end - self.start).whole_days() >= MAX_WINDOW_DAYS {
            return Err(AdsError::InvalidRequest(format!(
                "date range spans more than {} days",
                MAX_WINDOW_DAYS
            )));
        }
        Ok(())
    }

    /// Number of days covered, inclusive.
    pub fn days(&self) -> i64 {
        (self.end - self.start).whole_days() + 1
    }
}

/// One paginated batch of records plus continuation state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Records in upstream order
    pub records: Vec<Record>,
    /// Cursor for the next page, if any
    pub next_cursor: Option<String>,
    /// Whether the upstream reports more pages
    pub has_more: bool,
}

/// The complete, frozen record set of one logical request.
///
/// Built through [`DatasetBuilder`]; once frozen, records can only be read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    records: Vec<Record>,
}

impl Dataset {
    /// Create an empty dataset.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Records in fetch order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Records of one kind, in fetch order.
    pub fn of_kind(&self, kind: RecordKind) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(move |r| r.kind == kind)
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Concatenate frozen datasets in the given order.
    pub fn merge(parts: impl IntoIterator<Item = Dataset>) -> Dataset {
        let mut builder = DatasetBuilder::new();
        for part in parts {
            builder.extend(part.records);
        }
        builder.freeze()
    }
}

impl FromIterator<Record> for Dataset {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut builder = DatasetBuilder::new();
        builder.extend(iter);
        builder.freeze()
    }
}

/// Append-only accumulator for a [`Dataset`].
#[derive(Debug, Default)]
pub struct DatasetBuilder {
    records: Vec<Record>,
    pages: usize,
}

impl DatasetBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one page's records.
    pub fn push_page(&mut self, page: Page) {
        self.pages += 1;
        self.records.extend(page.records);
    }

    /// Append records.
    pub fn extend(&mut self, records: impl IntoIterator<Item = Record>) {
        self.records.extend(records);
    }

    /// Pages appended so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Records appended so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Freeze into an immutable dataset.
    pub fn freeze(self) -> Dataset {
        Dataset {
            records: self.records,
        }
    }
}
