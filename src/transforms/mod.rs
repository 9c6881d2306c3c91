//! Transformation nodes.
//!
//! Streaming, one row at a time:
//! - [`RowTransformation`] -- 1:1 mapping with an optional one-time init hook.
//! - [`Multicast`] -- independent copies to every branch.
//! - [`LookupTransformation`] -- enrichment from a fully buffered side source.
//! - [`MergeJoin`] -- positional pairing of two ordered streams.
//!
//! Buffer-then-flush (nothing leaves until the input completes):
//! - [`BlockTransformation`] -- whole-set function.
//! - [`Sort`] -- stable comparator sort.
//! - [`Aggregation`] -- grouping with Sum/Min/Max/Count.

mod aggregation;
mod block;
mod lookup;
mod merge_join;
mod multicast;
mod row;
mod sort;

pub use aggregation::{AggregateField, Aggregation, AggregationMethod, AggregationSchema, GroupKey};
pub use block::BlockTransformation;
pub use lookup::{LookupSchema, LookupTransformation};
pub use merge_join::MergeJoin;
pub use multicast::Multicast;
pub use row::RowTransformation;
pub use sort::Sort;
