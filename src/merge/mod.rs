//! Table merge: synchronize a destination table with an incoming stream.
//!
//! [`TableMerge`] reads the current destination rows through an internal
//! [`DbSource`], tags every incoming row as `Insert`, `Update`, `Existing`
//! or `Delete`, writes the changes in batches and finally emits the delta
//! (every tagged row plus the destination rows it removed).
//!
//! Two write strategies exist:
//!
//! - **Delete by id** (id fields declared): updated and deleted rows are
//!   removed with `DELETE ... WHERE <id> IN (...)`, then inserted and updated
//!   rows are bulk-loaded.
//! - **Truncate once** (no id fields, or [`TableMerge::use_truncate`]): the
//!   table is emptied once per run and every surviving row is reloaded.
//!   Without id fields nothing can match, so under `Full` mode the table ends
//!   up holding exactly the incoming rows.
//!
//! Writes are not transactional: a failure midway leaves earlier batches
//! applied.

mod classify;

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::batch::Batcher;
use crate::db::{ConnectionManager, delete_ids_sql, truncate_sql};
use crate::destinations::db::TableWriter;
use crate::error::EtlError;
use crate::link::{Emitter, FanOut, Output};
use crate::node::{LinkSource, NodeCore, impl_node, impl_source, impl_target};
use crate::pipeline::Pipeline;
use crate::port::InputPort;
use crate::row::{FieldRef, Row, RowAccessor};
use crate::sources::DbSource;
use crate::utils::lock;
use crate::value::Value;

use classify::Snapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum MergeTag {
    Insert,
    Update,
    Delete,
    Existing,
}

impl fmt::Display for MergeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MergeTag::Insert => "I",
            MergeTag::Update => "U",
            MergeTag::Delete => "D",
            MergeTag::Existing => "E",
        };
        f.write_str(s)
    }
}

/// A row of the merge delta.
#[derive(Clone, Debug, Serialize)]
pub struct MergeRow<T> {
    pub row: T,
    pub tag: MergeTag,
    pub change_date: DateTime<Utc>,
}

impl<T> MergeRow<T> {
    fn new(row: T, tag: MergeTag) -> Self {
        Self {
            row,
            tag,
            change_date: Utc::now(),
        }
    }
}

/// Which destination rows a merge may remove.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeltaMode {
    /// Destination rows absent from the input are deleted.
    #[default]
    Full,
    /// Nothing is deleted.
    NoDeletions,
    /// Only input rows carrying a delete marker delete their destination row.
    Delta,
}

/// Field roles for a merge.
#[derive(Clone, Debug, Default)]
pub struct MergeSchema {
    /// Concatenated into the unique id that matches incoming and destination rows.
    pub id_fields: Vec<FieldRef>,
    /// Decide between `Existing` and `Update` for matched rows.
    pub compare_fields: Vec<FieldRef>,
    /// `(field, value)` pairs; a row matching all of them is a deletion in
    /// `Delta` mode.
    pub delete_markers: Vec<(FieldRef, Value)>,
}

impl MergeSchema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id(mut self, field: impl Into<FieldRef>) -> Self {
        self.id_fields.push(field.into());
        self
    }

    #[must_use]
    pub fn compare(mut self, field: impl Into<FieldRef>) -> Self {
        self.compare_fields.push(field.into());
        self
    }

    #[must_use]
    pub fn delete_when(mut self, field: impl Into<FieldRef>, value: impl Into<Value>) -> Self {
        self.delete_markers.push((field.into(), value.into()));
        self
    }

    /// Without markers nothing is a deletion.
    pub(crate) fn is_deletion<T>(&self, acc: &dyn RowAccessor<T>, row: &T) -> Result<bool, EtlError> {
        if self.delete_markers.is_empty() {
            return Ok(false);
        }
        for (field, marker) in &self.delete_markers {
            if acc.require(row, field)? != *marker {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Id field names as destination column names.
    fn id_columns(&self) -> Vec<String> {
        self.id_fields.iter().map(ToString::to_string).collect()
    }
}

/// Merges incoming rows into a destination table and emits the delta.
///
/// The destination is read completely before the first incoming row is
/// classified, and every incoming row is classified before the first write,
/// so a missing declared field faults the node with the table untouched. A
/// write failure also faults the node; there is no per-row routing.
pub struct TableMerge<T: Row> {
    core: NodeCore,
    input: InputPort<T>,
    output: Output<MergeRow<T>>,
    force_truncate: Arc<Mutex<bool>>,
}

impl<T: Row> TableMerge<T> {
    pub fn new(
        pipeline: &Pipeline,
        manager: Arc<dyn ConnectionManager>,
        table: impl Into<String>,
        schema: MergeSchema,
        mode: DeltaMode,
    ) -> Result<Self, EtlError> {
        let table = table.into();
        let core = NodeCore::new(pipeline, "TableMerge");
        let (input, mut inbox) = core.input::<T>("input");
        let (side, mut side_inbox) = core.input::<T>("destination");
        let output = core.output::<MergeRow<T>>(FanOut::Distribute);
        let force_truncate = Arc::new(Mutex::new(false));

        let snapshot_source = DbSource::<T>::table(pipeline, table.clone())
            .with_connection(Arc::clone(&manager))
            .with_name(format!("{table} snapshot"));
        snapshot_source.link_to(&core.target(&side))?;

        let out = output.clone();
        let forced = Arc::clone(&force_truncate);
        core.launch(move |mut task| {
            task.logger.start();
            let acc = T::accessor();
            let batch_size = task.ctx.config().default_batch_size;
            let mut batcher = Batcher::new(batch_size)
                .map_err(|_| EtlError::configuration(&task.name, "batch size must be greater than zero"))?;

            let existing = side_inbox.collect_all()?;
            let mut snapshot = Snapshot::build(acc.as_ref(), existing, &schema)?;
            tracing::debug!(node = %task.name, rows = snapshot.len(), "destination snapshot loaded");

            // Classify everything before touching the destination.
            let mut classified = Vec::new();
            while let Some(row) = inbox.recv()? {
                task.logger.row();
                let c = snapshot.classify(&acc, &row, &schema, mode)?;
                classified.push((c.id, MergeRow::new(row, c.tag)));
            }

            let truncate = *lock(&forced) || schema.id_fields.is_empty();
            if truncate && !*lock(&forced) {
                tracing::warn!(node = %task.name, table = %table, "no id fields declared; merge will truncate the table");
            }
            let writer = TableWriter::<T>::open(
                manager.as_ref(),
                task.ctx.config().retry_policy(),
                &task.name,
                &table,
                None,
            )?;
            let mut sink = MergeWriter {
                writer,
                mode,
                truncate,
                truncated: false,
                id_columns: schema.id_columns(),
                delta: Vec::new(),
            };

            for entry in classified {
                if let Some(batch) = batcher.push(entry) {
                    sink.write(batch)?;
                }
            }
            if let Some(batch) = batcher.flush() {
                sink.write(batch)?;
            }
            sink.finish(snapshot.take_deletions(mode))?;

            tracing::debug!(node = %task.name, delta = sink.delta.len(), "merge applied");
            let emit: Emitter<MergeRow<T>> = out.emitter();
            emit.send_all(sink.delta);
            task.logger.end();
            Ok(())
        });

        Ok(Self {
            core,
            input,
            output,
            force_truncate,
        })
    }

    /// Always truncate instead of deleting by id.
    ///
    /// Truncation removes every destination row, including rows the merge
    /// would have kept; they survive only because they are reloaded.
    /// `NoDeletions` skips the truncate, so `Existing` rows are then
    /// inserted a second time.
    #[must_use]
    pub fn use_truncate(self, enabled: bool) -> Self {
        *lock(&self.force_truncate) = enabled;
        self
    }
}

struct MergeWriter<T> {
    writer: TableWriter<T>,
    mode: DeltaMode,
    truncate: bool,
    truncated: bool,
    id_columns: Vec<String>,
    delta: Vec<MergeRow<T>>,
}

impl<T: Row> MergeWriter<T> {
    fn truncate_once(&mut self) -> Result<(), EtlError> {
        if self.truncated || self.mode == DeltaMode::NoDeletions {
            return Ok(());
        }
        let sql = truncate_sql(self.writer.conn.kind(), &self.writer.table);
        self.writer.conn.execute_non_query(&sql, &[])?;
        self.truncated = true;
        Ok(())
    }

    fn delete_ids<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> Result<u64, EtlError> {
        let ids: Vec<&str> = ids.into_iter().collect();
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = delete_ids_sql(self.writer.conn.kind(), &self.writer.table, &self.id_columns, ids);
        self.writer.conn.execute_non_query(&sql, &[])
    }

    fn write(&mut self, batch: Vec<(String, MergeRow<T>)>) -> Result<(), EtlError> {
        let to_insert: Vec<T> = if self.truncate {
            self.truncate_once()?;
            batch
                .iter()
                .filter(|(_, m)| m.tag != MergeTag::Delete)
                .map(|(_, m)| m.row.clone())
                .collect()
        } else {
            let stale = batch
                .iter()
                .filter(|(_, m)| matches!(m.tag, MergeTag::Update | MergeTag::Delete))
                .map(|(id, _)| id.as_str());
            let stale: Vec<&str> = stale.collect();
            self.delete_ids(stale)?;
            batch
                .iter()
                .filter(|(_, m)| matches!(m.tag, MergeTag::Insert | MergeTag::Update))
                .map(|(_, m)| m.row.clone())
                .collect()
        };
        self.writer.insert(&to_insert)?;

        let mode = self.mode;
        self.delta.extend(
            batch
                .into_iter()
                .map(|(_, m)| m)
                .filter(|m| !(mode == DeltaMode::Delta && m.tag == MergeTag::Delete)),
        );
        Ok(())
    }

    /// Remove destination rows the mode marks for deletion and record them in
    /// the delta.
    fn finish(&mut self, removed: Vec<(String, T)>) -> Result<(), EtlError> {
        if self.truncate {
            self.truncate_once()?;
        } else if self.mode == DeltaMode::Full {
            // Delta-mode deletions were already issued with their batch.
            let ids: Vec<String> = removed.iter().map(|(id, _)| id.clone()).collect();
            self.delete_ids(ids.iter().map(String::as_str))?;
        }
        self.delta
            .extend(removed.into_iter().map(|(_, row)| MergeRow::new(row, MergeTag::Delete)));
        Ok(())
    }
}

impl_node!([T: Row] TableMerge<T>);
impl_target!([T: Row] TableMerge<T>, T);
impl_source!([T: Row] TableMerge<T>, MergeRow<T>);
