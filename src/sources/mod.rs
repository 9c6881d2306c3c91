//! Nodes that produce rows: in-memory collections, callbacks, databases and
//! files.

mod custom;
pub(crate) mod db;
mod json;
#[cfg(feature = "io-jsonl")]
mod jsonl;
#[cfg(feature = "io-csv")]
mod csv;
mod memory;

pub use custom::CustomSource;
pub use db::DbSource;
pub use json::JsonSource;
#[cfg(feature = "io-jsonl")]
pub use jsonl::JsonlSource;
#[cfg(feature = "io-csv")]
pub use self::csv::CsvSource;
pub use memory::MemorySource;
