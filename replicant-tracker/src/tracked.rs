//! The observable container mirrors edit through.

use crate::error::{OpError, OpResult};
use crate::ops::{apply_batch, apply_operation};
use replicant_types::{OpArgs, OpPath, Operation};
use serde_json::Value;
use std::cmp::Ordering;

/// A value whose structural edits are captured as operations.
///
/// Every mutator validates its target, performs the edit in place, and
/// records one operation in a pending batch. Edits made synchronously
/// between two [`take_batch`](Self::take_batch) calls coalesce into a
/// single batch rather than being emitted one at a time.
///
/// Each mutator builds its operation first and then commits it through
/// [`apply_operation`], so the recorded batch performs exactly the same
/// edit when replayed against another copy of the pre-edit value.
#[derive(Debug, Clone, Default)]
pub struct TrackedValue {
    value: Value,
    pending: Vec<Operation>,
}

impl TrackedValue {
    /// Starts observing a value.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self {
            value,
            pending: Vec::new(),
        }
    }

    /// The current value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Detaches observation and returns the value.
    #[must_use]
    pub fn into_inner(self) -> Value {
        self.value
    }

    /// Whether any operations are waiting to be drained.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Drains the operations recorded since the previous drain.
    ///
    /// This is the tick boundary: everything recorded between two drains is
    /// one atomic batch.
    pub fn take_batch(&mut self) -> Vec<Operation> {
        std::mem::take(&mut self.pending)
    }

    // ── Unobserved installs ──────────────────────────────────────

    /// Installs an authoritative value without recording an operation.
    ///
    /// Used when the store overwrites the mirror (assign broadcasts,
    /// resyncs). Any pending batch is discarded — it described edits to the
    /// value being replaced.
    pub fn overwrite(&mut self, value: Value) {
        self.value = value;
        self.pending.clear();
    }

    /// Replays a remote batch without re-recording it.
    pub fn apply_remote(&mut self, ops: &[Operation]) -> OpResult<()> {
        apply_batch(&mut self.value, ops)
    }

    // ── Object mutators ──────────────────────────────────────────

    /// Sets a property on the object at `path`, recording an `add` for a
    /// new property or an `update` (with the old value) for an existing
    /// one. Setting a property to its current value records nothing.
    pub fn set(&mut self, path: &OpPath, prop: &str, value: Value) -> OpResult<()> {
        let target = self.resolve(path)?;
        let map = target
            .as_object()
            .ok_or_else(|| OpError::NotAnObject(path.clone()))?;

        let args = match map.get(prop) {
            Some(old) if *old == value => return Ok(()),
            Some(old) => OpArgs::Update {
                prop: prop.to_string(),
                old_value: old.clone(),
                new_value: value,
            },
            None => OpArgs::Add {
                prop: prop.to_string(),
                new_value: value,
            },
        };
        self.commit(Operation::new(path.clone(), args))
    }

    /// Deletes a property from the object at `path`. Deleting a property
    /// that does not exist records nothing.
    pub fn delete(&mut self, path: &OpPath, prop: &str) -> OpResult<()> {
        let target = self.resolve(path)?;
        let map = target
            .as_object()
            .ok_or_else(|| OpError::NotAnObject(path.clone()))?;

        let Some(old) = map.get(prop) else {
            return Ok(());
        };
        let args = OpArgs::Delete {
            prop: prop.to_string(),
            old_value: old.clone(),
        };
        self.commit(Operation::new(path.clone(), args))
    }

    // ── Array mutators ───────────────────────────────────────────

    /// Removes `delete_count` elements at `index` and inserts `inserted` in
    /// their place. Returns the removed elements.
    pub fn splice(
        &mut self,
        path: &OpPath,
        index: usize,
        delete_count: usize,
        inserted: Vec<Value>,
    ) -> OpResult<Vec<Value>> {
        let arr = self.array(path)?;
        let end = index + delete_count;
        if end > arr.len() {
            return Err(OpError::IndexOutOfBounds {
                path: path.clone(),
                index: end,
                len: arr.len(),
            });
        }
        let removed: Vec<Value> = arr[index..end].to_vec();
        if removed.is_empty() && inserted.is_empty() {
            return Ok(removed);
        }
        let args = OpArgs::ArraySplice {
            index,
            removed: removed.clone(),
            inserted,
        };
        self.commit(Operation::new(path.clone(), args))?;
        Ok(removed)
    }

    /// Appends values to the end of the array at `path`.
    pub fn push(&mut self, path: &OpPath, values: Vec<Value>) -> OpResult<()> {
        self.array(path)?;
        if values.is_empty() {
            return Ok(());
        }
        self.commit(Operation::new(path.clone(), OpArgs::ArrayPush { values }))
    }

    /// Removes and returns the last element of the array at `path`.
    pub fn pop(&mut self, path: &OpPath) -> OpResult<Option<Value>> {
        let arr = self.array(path)?;
        let Some(last) = arr.last().cloned() else {
            return Ok(None);
        };
        let args = OpArgs::ArrayPop {
            removed: Some(last.clone()),
        };
        self.commit(Operation::new(path.clone(), args))?;
        Ok(Some(last))
    }

    /// Removes and returns the first element of the array at `path`.
    pub fn shift(&mut self, path: &OpPath) -> OpResult<Option<Value>> {
        let arr = self.array(path)?;
        let Some(first) = arr.first().cloned() else {
            return Ok(None);
        };
        let args = OpArgs::ArrayShift {
            removed: Some(first.clone()),
        };
        self.commit(Operation::new(path.clone(), args))?;
        Ok(Some(first))
    }

    /// Inserts values at the front of the array at `path`.
    pub fn unshift(&mut self, path: &OpPath, values: Vec<Value>) -> OpResult<()> {
        self.array(path)?;
        if values.is_empty() {
            return Ok(());
        }
        self.commit(Operation::new(path.clone(), OpArgs::ArrayUnshift { values }))
    }

    /// Sorts the array at `path` by a comparator, recording the permutation
    /// so the reorder replays and inverts exactly. A comparator that leaves
    /// the array unchanged records nothing.
    pub fn sort_by<F>(&mut self, path: &OpPath, mut compare: F) -> OpResult<()>
    where
        F: FnMut(&Value, &Value) -> Ordering,
    {
        let arr = self.array(path)?;
        let mut indices: Vec<usize> = (0..arr.len()).collect();
        indices.sort_by(|&a, &b| compare(&arr[a], &arr[b]));
        if indices.iter().enumerate().all(|(pos, &src)| pos == src) {
            return Ok(());
        }
        self.commit(Operation::new(path.clone(), OpArgs::ArraySort { indices }))
    }

    /// Reverses the array at `path`.
    pub fn reverse(&mut self, path: &OpPath) -> OpResult<()> {
        let arr = self.array(path)?;
        if arr.len() < 2 {
            return Ok(());
        }
        self.commit(Operation::new(path.clone(), OpArgs::ArrayReverse))
    }

    /// Sets every element in `start..end` of the array at `path` to `value`.
    pub fn fill(&mut self, path: &OpPath, value: Value, start: usize, end: usize) -> OpResult<()> {
        let arr = self.array(path)?;
        if start > end || end > arr.len() {
            return Err(OpError::IndexOutOfBounds {
                path: path.clone(),
                index: end,
                len: arr.len(),
            });
        }
        if start == end {
            return Ok(());
        }
        let args = OpArgs::ArrayFill {
            value,
            start,
            end,
            overwritten: arr[start..end].to_vec(),
        };
        self.commit(Operation::new(path.clone(), args))
    }

    /// Copies the slice `start..end` of the array at `path` to position
    /// `target`, clamped at the array end.
    pub fn copy_within(
        &mut self,
        path: &OpPath,
        target: usize,
        start: usize,
        end: usize,
    ) -> OpResult<()> {
        let arr = self.array(path)?;
        if start > end || end > arr.len() {
            return Err(OpError::IndexOutOfBounds {
                path: path.clone(),
                index: end,
                len: arr.len(),
            });
        }
        let copied = end - start;
        let stop = (target + copied).min(arr.len());
        if target >= arr.len() || copied == 0 || stop <= target {
            return Ok(());
        }
        let args = OpArgs::ArrayCopyWithin {
            target,
            start,
            end,
            overwritten: arr[target..stop].to_vec(),
        };
        self.commit(Operation::new(path.clone(), args))
    }

    // ── Internals ────────────────────────────────────────────────

    fn commit(&mut self, op: Operation) -> OpResult<()> {
        apply_operation(&mut self.value, &op)?;
        self.pending.push(op);
        Ok(())
    }

    fn resolve(&self, path: &OpPath) -> OpResult<&Value> {
        let mut current = &self.value;
        for segment in path.segments() {
            current = match current {
                Value::Object(map) => map
                    .get(&segment)
                    .ok_or_else(|| OpError::PathNotFound(path.clone()))?,
                Value::Array(arr) => {
                    let index: usize = segment
                        .parse()
                        .map_err(|_| OpError::PathNotFound(path.clone()))?;
                    arr.get(index).ok_or(OpError::IndexOutOfBounds {
                        path: path.clone(),
                        index,
                        len: arr.len(),
                    })?
                }
                _ => return Err(OpError::PathNotFound(path.clone())),
            };
        }
        Ok(current)
    }

    fn array(&self, path: &OpPath) -> OpResult<&Vec<Value>> {
        self.resolve(path)?
            .as_array()
            .ok_or_else(|| OpError::NotAnArray(path.clone()))
    }
}
