//! Cleaning pipeline for bipartite worker-firm panels.
//!
//! A [`BipartiteFrame`] wraps a polars `DataFrame` in one of four formats and
//! tracks which invariants hold. [`BipartiteFrame::clean`] sorts, dedupes,
//! makes ids contiguous and restricts the panel to its largest connected set
//! of firms.

mod clean;
pub mod cluster;
pub mod collapse;
mod connectivity;
pub mod contiguity;
pub mod convert;
pub mod duplicates;
pub mod error;
pub mod format;
pub mod frame;
pub mod graph;
pub mod movers;
pub mod params;
pub mod records;
pub mod schema;
pub mod summary;

#[cfg(feature = "python")]
mod python;

pub use cluster::{ClusterParams, FirmFeatures, FirmGrouping, FirmMeanOutcome, FirmMeasure};
pub use contiguity::{IdReference, OriginalId};
pub use error::{BipartiteError, Result};
pub use format::Format;
pub use frame::{BipartiteFrame, Contiguity, Invariants};
pub use params::{CleanParams, ComponentSize, Connectedness, DuplicateHow, FixedPointPolicy};
pub use schema::{ColumnMap, Logical};
pub use summary::{OutcomeStats, Summary};
