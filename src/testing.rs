//! Test support for pipelines.
//!
//! - **Assertions** over collected rows: [`assert_collections_equal`],
//!   [`assert_collections_unordered_equal`], [`assert_all`]
//! - **Fixtures**: [`sample_orders`], [`Order`], [`map_row`]
//! - **[`MemoryDatabase`]**: an in-memory [`ConnectionManager`](crate::db::ConnectionManager)
//!   with a statement log and injectable open failures, for exercising the
//!   database nodes and table merge
//! - **[`CollectingLogSink`]**: captures task log events
//!
//! ```
//! use ironetl::*;
//! use ironetl::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let p = Pipeline::default();
//! let source = MemorySource::new(&p, sample_orders());
//! let dest = MemoryDestination::new(&p);
//! source.link_to(&dest)?;
//! p.run()?;
//! assert_collections_equal(&dest.data(), &sample_orders());
//! # Ok(())
//! # }
//! ```

mod assertions;
mod database;
mod fixtures;
mod log;

pub use assertions::*;
pub use database::MemoryDatabase;
pub use fixtures::*;
pub use log::CollectingLogSink;
