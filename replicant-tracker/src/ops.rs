//! Pure operation replay and inversion.
//!
//! These functions are the single source of truth for what each operation
//! method does to a value. The tracked container, the authoritative store
//! and remote mirrors all mutate through them, which is what makes a
//! recorded batch exactly replayable on any copy of the pre-edit value.

use crate::error::{OpError, OpResult};
use replicant_types::{OpArgs, OpPath, Operation};
use serde_json::{Map, Value};

/// Applies one operation to a value in place.
pub fn apply_operation(root: &mut Value, op: &Operation) -> OpResult<()> {
    let target = resolve_mut(root, &op.path)?;

    match &op.args {
        OpArgs::Overwrite { new_value } => {
            *target = new_value.clone();
        }
        OpArgs::Add { prop, new_value } | OpArgs::Update { prop, new_value, .. } => {
            as_object_mut(target, &op.path)?.insert(prop.clone(), new_value.clone());
        }
        OpArgs::Delete { prop, .. } => {
            as_object_mut(target, &op.path)?.remove(prop);
        }
        OpArgs::ArraySplice {
            index,
            removed,
            inserted,
        } => {
            let arr = as_array_mut(target, &op.path)?;
            let end = splice_end(*index, removed.len(), arr.len(), &op.path)?;
            arr.splice(*index..end, inserted.iter().cloned());
        }
        OpArgs::ArrayPush { values } => {
            as_array_mut(target, &op.path)?.extend(values.iter().cloned());
        }
        OpArgs::ArrayPop { removed } => {
            let arr = as_array_mut(target, &op.path)?;
            if removed.is_some() {
                arr.pop();
            }
        }
        OpArgs::ArrayShift { removed } => {
            let arr = as_array_mut(target, &op.path)?;
            if removed.is_some() && !arr.is_empty() {
                arr.remove(0);
            }
        }
        OpArgs::ArrayUnshift { values } => {
            let arr = as_array_mut(target, &op.path)?;
            arr.splice(0..0, values.iter().cloned());
        }
        OpArgs::ArraySort { indices } => {
            let arr = as_array_mut(target, &op.path)?;
            check_permutation(indices, arr.len(), &op.path)?;
            let sorted: Vec<Value> = indices.iter().map(|&i| arr[i].clone()).collect();
            *arr = sorted;
        }
        OpArgs::ArrayReverse => {
            as_array_mut(target, &op.path)?.reverse();
        }
        OpArgs::ArrayFill {
            value, start, end, ..
        } => {
            let arr = as_array_mut(target, &op.path)?;
            check_range(*start, *end, arr.len(), &op.path)?;
            for slot in &mut arr[*start..*end] {
                *slot = value.clone();
            }
        }
        OpArgs::ArrayCopyWithin {
            target: dest,
            start,
            end,
            ..
        } => {
            let arr = as_array_mut(target, &op.path)?;
            check_range(*start, *end, arr.len(), &op.path)?;
            let src: Vec<Value> = arr[*start..*end].to_vec();
            for (i, val) in src.into_iter().enumerate() {
                // Destinations past the end are dropped, as on copy_within.
                match dest.checked_add(i) {
                    Some(slot) if slot < arr.len() => arr[slot] = val,
                    _ => break,
                }
            }
        }
    }

    Ok(())
}

/// Applies a batch of operations in array order.
pub fn apply_batch(root: &mut Value, ops: &[Operation]) -> OpResult<()> {
    for op in ops {
        apply_operation(root, op)?;
    }
    Ok(())
}

/// Runs one operation backwards on a value that has already had it applied.
pub fn unapply_operation(root: &mut Value, op: &Operation) -> OpResult<()> {
    let target = resolve_mut(root, &op.path)?;

    match &op.args {
        OpArgs::Overwrite { .. } => return Err(OpError::NotInvertible("overwrite")),
        OpArgs::Add { prop, .. } => {
            as_object_mut(target, &op.path)?.remove(prop);
        }
        OpArgs::Update {
            prop, old_value, ..
        }
        | OpArgs::Delete { prop, old_value } => {
            as_object_mut(target, &op.path)?.insert(prop.clone(), old_value.clone());
        }
        OpArgs::ArraySplice {
            index,
            removed,
            inserted,
        } => {
            let arr = as_array_mut(target, &op.path)?;
            let end = splice_end(*index, inserted.len(), arr.len(), &op.path)?;
            arr.splice(*index..end, removed.iter().cloned());
        }
        OpArgs::ArrayPush { values } => {
            let arr = as_array_mut(target, &op.path)?;
            if values.len() > arr.len() {
                return Err(OpError::IndexOutOfBounds {
                    path: op.path.clone(),
                    index: values.len(),
                    len: arr.len(),
                });
            }
            let keep = arr.len() - values.len();
            arr.truncate(keep);
        }
        OpArgs::ArrayPop { removed } => {
            if let Some(value) = removed {
                as_array_mut(target, &op.path)?.push(value.clone());
            }
        }
        OpArgs::ArrayShift { removed } => {
            if let Some(value) = removed {
                as_array_mut(target, &op.path)?.insert(0, value.clone());
            }
        }
        OpArgs::ArrayUnshift { values } => {
            let arr = as_array_mut(target, &op.path)?;
            if values.len() > arr.len() {
                return Err(OpError::IndexOutOfBounds {
                    path: op.path.clone(),
                    index: values.len(),
                    len: arr.len(),
                });
            }
            arr.drain(0..values.len());
        }
        OpArgs::ArraySort { indices } => {
            let arr = as_array_mut(target, &op.path)?;
            check_permutation(indices, arr.len(), &op.path)?;
            let mut original = vec![Value::Null; arr.len()];
            for (pos, &src) in indices.iter().enumerate() {
                original[src] = arr[pos].clone();
            }
            *arr = original;
        }
        OpArgs::ArrayReverse => {
            as_array_mut(target, &op.path)?.reverse();
        }
        OpArgs::ArrayFill {
            start,
            end,
            overwritten,
            ..
        } => {
            let arr = as_array_mut(target, &op.path)?;
            check_range(*start, *end, arr.len(), &op.path)?;
            if end - start != overwritten.len() {
                return Err(OpError::IndexOutOfBounds {
                    path: op.path.clone(),
                    index: start.saturating_add(overwritten.len()),
                    len: arr.len(),
                });
            }
            for (i, val) in overwritten.iter().enumerate() {
                arr[start + i] = val.clone();
            }
        }
        OpArgs::ArrayCopyWithin {
            target: dest,
            overwritten,
            ..
        } => {
            let arr = as_array_mut(target, &op.path)?;
            for (i, val) in overwritten.iter().enumerate() {
                match dest.checked_add(i) {
                    Some(slot) if slot < arr.len() => arr[slot] = val.clone(),
                    _ => break,
                }
            }
        }
    }

    Ok(())
}

/// Reconstructs the pre-edit value from the post-edit value and the batch
/// that produced it, by replaying each operation's inverse in reverse order.
pub fn rewind(new_value: &Value, ops: &[Operation]) -> OpResult<Value> {
    let mut old = new_value.clone();
    for op in ops.iter().rev() {
        unapply_operation(&mut old, op)?;
    }
    Ok(old)
}

// ── Navigation helpers ───────────────────────────────────────────

fn resolve_mut<'a>(root: &'a mut Value, path: &OpPath) -> OpResult<&'a mut Value> {
    let mut current = root;
    for segment in path.segments() {
        current = match current {
            Value::Object(map) => map
                .get_mut(&segment)
                .ok_or_else(|| OpError::PathNotFound(path.clone()))?,
            Value::Array(arr) => {
                let len = arr.len();
                let index: usize = segment
                    .parse()
                    .map_err(|_| OpError::PathNotFound(path.clone()))?;
                arr.get_mut(index).ok_or(OpError::IndexOutOfBounds {
                    path: path.clone(),
                    index,
                    len,
                })?
            }
            _ => return Err(OpError::PathNotFound(path.clone())),
        };
    }
    Ok(current)
}

fn as_object_mut<'a>(value: &'a mut Value, path: &OpPath) -> OpResult<&'a mut Map<String, Value>> {
    value
        .as_object_mut()
        .ok_or_else(|| OpError::NotAnObject(path.clone()))
}

fn as_array_mut<'a>(value: &'a mut Value, path: &OpPath) -> OpResult<&'a mut Vec<Value>> {
    value
        .as_array_mut()
        .ok_or_else(|| OpError::NotAnArray(path.clone()))
}

/// Bounds-checks a splice window, rejecting indices from hostile payloads
/// that would overflow `index + count`.
fn splice_end(index: usize, count: usize, len: usize, path: &OpPath) -> OpResult<usize> {
    match index.checked_add(count) {
        Some(end) if end <= len => Ok(end),
        _ => Err(OpError::IndexOutOfBounds {
            path: path.clone(),
            index,
            len,
        }),
    }
}

fn check_permutation(indices: &[usize], len: usize, path: &OpPath) -> OpResult<()> {
    // A true permutation visits every slot exactly once; duplicates would
    // silently clone elements on apply and leave holes on unapply.
    let mut seen = vec![false; len];
    let bijective = indices.len() == len
        && indices
            .iter()
            .all(|&i| i < len && !std::mem::replace(&mut seen[i], true));
    if !bijective {
        return Err(OpError::BadPermutation {
            path: path.clone(),
            got: indices.len(),
            len,
        });
    }
    Ok(())
}

fn check_range(start: usize, end: usize, len: usize, path: &OpPath) -> OpResult<()> {
    if start > end || end > len {
        return Err(OpError::IndexOutOfBounds {
            path: path.clone(),
            index: end,
            len,
        });
    }
    Ok(())
}
