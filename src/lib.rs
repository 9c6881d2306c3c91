//! # ironetl
//!
//! An embeddable **dataflow ETL engine**. A pipeline is a graph of nodes
//! (sources, transformations, destinations) connected by links; every node
//! runs on its own thread and rows travel between nodes over bounded
//! channels, so a slow consumer throttles its producers.
//!
//! ## Key Features
//!
//! - **Completion propagation** - a node completes once all its predecessors
//!   have; a fault anywhere upstream faults everything downstream
//! - **Predicate links** - route each row to the first link that accepts it,
//!   or to a [`VoidDestination`] so filtered branches still complete
//! - **Error routing** - divert failing rows into an error sink as
//!   [`ErrorRecord`]s instead of faulting the node
//! - **Transformations** - row and block transforms, sort, multicast,
//!   aggregation, lookup and merge join
//! - **Table merge** - synchronize a database table with a stream and emit
//!   the insert/update/delete delta
//! - **Adapters** - memory, callbacks, databases, JSON, JSON Lines and CSV
//!   (compressed transparently with gzip or zstd)
//!
//! ## Quick Start
//!
//! ```
//! use ironetl::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let p = Pipeline::default();
//! let source = MemorySource::new(&p, vec![1, 2, 3]);
//! let plus_ten = RowTransformation::map(&p, |x: i32| x + 10);
//! let dest = MemoryDestination::new(&p);
//!
//! source.link_to(&plus_ten)?;
//! plus_ten.link_to(&dest)?;
//! p.run()?;
//!
//! assert_eq!(dest.data(), vec![11, 12, 13]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Pipeline
//!
//! A [`Pipeline`] owns the graph and a [`PipelineContext`] (configuration,
//! log sink, default connection manager and cancellation token). Nodes are
//! created against a pipeline, linked, and then the pipeline is run once
//! with [`Pipeline::run`] or started in the background with
//! [`Pipeline::start`].
//!
//! ### Rows
//!
//! Anything `Clone + Serialize + Send + Sync + 'static` can travel along a
//! link. Nodes that address individual fields (aggregation, lookup, merge,
//! database adapters) additionally need [`Row`], which exposes a
//! [`RowAccessor`] for one of three shapes: `Vec<Value>` arrays, [`MapRow`]
//! maps, or structs described with [`struct_shape!`].
//!
//! ### Errors
//!
//! User closures return [`anyhow::Result`]; engine APIs return
//! [`EtlError`]. [`Pipeline::run`] reports the first fault that originated
//! in a node rather than one merely propagated from a predecessor.
//!
//! ## Feature Flags
//!
//! - `io-jsonl` (default): JSON Lines source and destination
//! - `io-csv` (default): CSV source and destination
//! - `io-http`: read resources over HTTP(S)
//! - `compression-gzip`, `compression-zstd` (default): transparent compression

pub mod batch;
pub mod combiners;
pub mod completion;
pub mod config;
pub mod db;
pub mod destinations;
pub mod error;
pub mod error_router;
pub mod io;
pub mod link;
pub mod logging;
pub mod merge;
pub mod node;
pub mod node_id;
pub mod pipeline;
pub mod port;
pub mod row;
pub mod sources;
pub mod testing;
pub mod transforms;
mod utils;
pub mod value;

// General re-exports
pub use batch::{BatchDestination, BatchHook, Batcher};
pub use completion::Completion;
pub use config::{CancellationToken, EtlConfig, PipelineContext, RetryPolicy};
pub use db::{
    ColumnMapping, Connection, ConnectionKind, ConnectionManager, ReadVisitor, RowCursor, TableColumn, TableData,
    TableDefinition, connect_with_retry,
};
pub use destinations::{CustomDestination, DbDestination, JsonDestination, MemoryDestination, VoidDestination};
pub use error::{ErrorRecord, EtlError};
pub use error_router::{ErrorRouter, ErrorSource};
pub use io::Resource;
pub use link::{FanOut, Output};
pub use logging::{LogAction, LogEvent, LogSink, TracingLogSink, init_tracing, task_hash};
pub use merge::{DeltaMode, MergeRow, MergeSchema, MergeTag, TableMerge};
pub use node::{DataFlowNode, LinkSource, LinkTarget, PortTarget};
pub use node_id::NodeId;
pub use pipeline::{Pipeline, RunHandle};
pub use port::InputPort;
pub use row::{FieldRef, MapRow, Row, RowAccessor, ShapeKind, StructShape, fields};
pub use sources::{CustomSource, DbSource, JsonSource, MemorySource};
pub use transforms::*;
pub use value::Value;

// Gated re-exports
#[cfg(feature = "io-jsonl")]
pub use destinations::JsonlDestination;
#[cfg(feature = "io-jsonl")]
pub use sources::JsonlSource;

#[cfg(feature = "io-csv")]
pub use destinations::CsvDestination;
#[cfg(feature = "io-csv")]
pub use sources::CsvSource;
