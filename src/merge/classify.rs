use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::EtlError;
use crate::merge::{DeltaMode, MergeSchema, MergeTag};
use crate::row::{FieldRef, RowAccessor};
use crate::value::Value;

fn same(a: &Value, b: &Value) -> bool {
    a == b || a.compare(b) == Some(Ordering::Equal)
}

/// Concatenated id field values, matching what `CONCAT(...)` yields in SQL.
pub(crate) fn unique_id<T>(acc: &dyn RowAccessor<T>, row: &T, id_fields: &[FieldRef]) -> Result<String, EtlError> {
    let mut id = String::new();
    for f in id_fields {
        id.push_str(&acc.require(row, f)?.to_string());
    }
    Ok(id)
}

struct Entry<T> {
    row: T,
    id: String,
    tag: Option<MergeTag>,
}

/// Destination rows as read before the merge, indexed by unique id.
pub(crate) struct Snapshot<T> {
    entries: Vec<Entry<T>>,
    by_id: HashMap<String, usize>,
}

/// Outcome for one incoming row.
pub(crate) struct Classified {
    pub(crate) tag: MergeTag,
    pub(crate) id: String,
}

impl<T> Snapshot<T> {
    pub(crate) fn build(acc: &dyn RowAccessor<T>, rows: Vec<T>, schema: &MergeSchema) -> Result<Self, EtlError> {
        let mut by_id = HashMap::with_capacity(rows.len());
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let id = if schema.id_fields.is_empty() {
                String::new()
            } else {
                let id = unique_id(acc, &row, &schema.id_fields)?;
                by_id.insert(id.clone(), entries.len());
                id
            };
            entries.push(Entry { row, id, tag: None });
        }
        Ok(Self { entries, by_id })
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Tag `row` against the snapshot and record the match on the
    /// destination side.
    pub(crate) fn classify(
        &mut self,
        acc: &Arc<dyn RowAccessor<T>>,
        row: &T,
        schema: &MergeSchema,
        mode: DeltaMode,
    ) -> Result<Classified, EtlError> {
        let id = if schema.id_fields.is_empty() {
            String::new()
        } else {
            unique_id(acc.as_ref(), row, &schema.id_fields)?
        };
        let matched = if schema.id_fields.is_empty() {
            None
        } else {
            self.by_id.get(&id).copied()
        };

        if mode == DeltaMode::Delta && schema.is_deletion(acc.as_ref(), row)? {
            if let Some(i) = matched {
                self.entries[i].tag = Some(MergeTag::Delete);
            }
            return Ok(Classified { tag: MergeTag::Delete, id });
        }

        let Some(i) = matched else {
            return Ok(Classified { tag: MergeTag::Insert, id });
        };
        let mut equal = true;
        for f in &schema.compare_fields {
            let incoming = acc.require(row, f)?;
            let existing = acc.require(&self.entries[i].row, f)?;
            if !same(&incoming, &existing) {
                equal = false;
                break;
            }
        }
        let tag = if equal { MergeTag::Existing } else { MergeTag::Update };
        self.entries[i].tag = Some(tag);
        Ok(Classified { tag, id })
    }

    /// Destination rows the mode wants removed: never matched under `Full`,
    /// marked for deletion under `Delta`.
    pub(crate) fn take_deletions(self, mode: DeltaMode) -> Vec<(String, T)> {
        self.entries
            .into_iter()
            .filter(|e| match mode {
                DeltaMode::Full => e.tag.is_none(),
                DeltaMode::Delta => e.tag == Some(MergeTag::Delete),
                DeltaMode::NoDeletions => false,
            })
            .map(|e| (e.id, e.row))
            .collect()
    }
}
