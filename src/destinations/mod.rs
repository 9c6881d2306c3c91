//! Terminal nodes.

mod custom;
pub(crate) mod db;
mod json;
#[cfg(feature = "io-jsonl")]
mod jsonl;
#[cfg(feature = "io-csv")]
mod csv;
mod memory;
mod void;

pub use custom::CustomDestination;
pub use db::DbDestination;
pub use json::JsonDestination;
#[cfg(feature = "io-jsonl")]
pub use jsonl::JsonlDestination;
#[cfg(feature = "io-csv")]
pub use self::csv::CsvDestination;
pub use memory::MemoryDestination;
pub use void::VoidDestination;
