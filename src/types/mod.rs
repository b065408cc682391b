//! Common types used across the client library.

pub mod dataset;
pub mod record;
pub mod serde_helpers;

pub use dataset::{DateRange, Dataset, DatasetBuilder, Page};
pub use record::{ChannelType, MatchType, Metrics, Record, RecordKind, RecordStatus};
