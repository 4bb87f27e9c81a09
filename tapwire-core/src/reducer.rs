//! State reduction: snapshots and JSON Patch deltas against a thread's
//! state document.
//!
//! Deltas are atomic. Every op in a `STATE_DELTA` is applied to a working
//! copy, and the copy replaces the document only if all ops succeed; a
//! failing op leaves the document exactly as it was before the event.
//!
//! Path policy:
//!
//! - `add` creates missing intermediate objects; `replace`/`remove` against
//!   a missing intermediate fail with [`PatchError::MissingParent`].
//! - `replace` of a missing object key fails (no implicit add).
//! - `add` at the root pointer replaces the whole document; `remove` at the
//!   root fails.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::error::PatchError;
use crate::patch::{parse_index, PatchOp, Pointer};

/// A thread's state document.
#[derive(Debug, Clone, PartialEq)]
pub struct StateDocument {
    value: Value,
    version: u64,
}

impl Default for StateDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl StateDocument {
    /// An empty object at version 0.
    pub fn new() -> Self {
        Self {
            value: Value::Object(Map::new()),
            version: 0,
        }
    }

    /// A document holding `value`, at version 0.
    pub fn with_value(value: Value) -> Self {
        Self { value, version: 0 }
    }

    /// The current document.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Number of successful snapshot/delta applications.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replace the whole document.
    pub fn apply_snapshot(&mut self, snapshot: Value) {
        self.value = snapshot;
        self.version += 1;
    }

    /// Apply `ops` in order, all or nothing.
    ///
    /// On error returns the index of the failing op with its cause; the
    /// document is unchanged.
    pub fn apply_delta(&mut self, ops: &[PatchOp]) -> Result<(), (usize, PatchError)> {
        let mut working = self.value.clone();
        for (index, op) in ops.iter().enumerate() {
            apply_op(&mut working, op).map_err(|err| (index, err))?;
        }
        self.value = working;
        self.version += 1;
        Ok(())
    }
}

/// Apply a single op to `doc` in place.
///
/// A failing op may leave `doc` untouched; callers wanting batch atomicity
/// use [`StateDocument::apply_delta`].
pub fn apply_op(doc: &mut Value, op: &PatchOp) -> Result<(), PatchError> {
    let path = op.path();
    let pointer = Pointer::parse(path)?;

    let Some((last, parents)) = pointer.split_last() else {
        return match op {
            PatchOp::Add { value, .. } | PatchOp::Replace { value, .. } => {
                *doc = value.clone();
                Ok(())
            }
            PatchOp::Remove { .. } => Err(PatchError::RootRemoval),
        };
    };

    let create = matches!(op, PatchOp::Add { .. });
    let parent = walk(doc, parents, path, create)?;

    match op {
        PatchOp::Add { value, .. } => add(parent, parents, last, value.clone(), path),
        PatchOp::Replace { value, .. } => replace(parent, last, value.clone(), path),
        PatchOp::Remove { .. } => remove(parent, last, path),
    }
}

fn prefix(segments: &[String]) -> String {
    Pointer::from_segments(segments.iter().cloned()).to_string()
}

fn walk<'a>(
    doc: &'a mut Value,
    segments: &[String],
    path: &str,
    create: bool,
) -> Result<&'a mut Value, PatchError> {
    let mut current = doc;
    for (depth, segment) in segments.iter().enumerate() {
        current = match current {
            Value::Object(map) => {
                if create {
                    map.entry(segment.clone())
                        .or_insert_with(|| Value::Object(Map::new()))
                } else {
                    map.get_mut(segment)
                        .ok_or_else(|| PatchError::MissingParent {
                            path: path.to_string(),
                            parent: prefix(&segments[..=depth]),
                        })?
                }
            }
            Value::Array(items) => {
                let index = parse_index(segment).ok_or_else(|| PatchError::InvalidIndex {
                    path: path.to_string(),
                    segment: segment.clone(),
                })?;
                let len = items.len();
                items
                    .get_mut(index)
                    .ok_or_else(|| PatchError::IndexOutOfBounds {
                        path: path.to_string(),
                        index,
                        len,
                    })?
            }
            _ => {
                return Err(PatchError::NotAContainer {
                    path: path.to_string(),
                    parent: prefix(&segments[..depth]),
                })
            }
        };
    }
    Ok(current)
}

fn add(
    parent: &mut Value,
    parents: &[String],
    last: &str,
    value: Value,
    path: &str,
) -> Result<(), PatchError> {
    match parent {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
                return Ok(());
            }
            let index = array_index(last, path)?;
            if index > items.len() {
                return Err(PatchError::IndexOutOfBounds {
                    path: path.to_string(),
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(PatchError::NotAContainer {
            path: path.to_string(),
            parent: prefix(parents),
        }),
    }
}

fn replace(parent: &mut Value, last: &str, value: Value, path: &str) -> Result<(), PatchError> {
    let slot = match parent {
        Value::Object(map) => map.get_mut(last),
        Value::Array(items) => {
            let index = array_index(last, path)?;
            let len = items.len();
            Some(items.get_mut(index).ok_or_else(|| PatchError::IndexOutOfBounds {
                path: path.to_string(),
                index,
                len,
            })?)
        }
        _ => None,
    };
    let slot = slot.ok_or_else(|| PatchError::MissingTarget {
        path: path.to_string(),
    })?;
    *slot = value;
    Ok(())
}

fn remove(parent: &mut Value, last: &str, path: &str) -> Result<(), PatchError> {
    match parent {
        Value::Object(map) => map
            .remove(last)
            .map(drop)
            .ok_or_else(|| PatchError::MissingTarget {
                path: path.to_string(),
            }),
        Value::Array(items) => {
            let index = array_index(last, path)?;
            if index >= items.len() {
                return Err(PatchError::IndexOutOfBounds {
                    path: path.to_string(),
                    index,
                    len: items.len(),
                });
            }
            items.remove(index);
            Ok(())
        }
        _ => Err(PatchError::MissingTarget {
            path: path.to_string(),
        }),
    }
}

fn array_index(segment: &str, path: &str) -> Result<usize, PatchError> {
    parse_index(segment).ok_or_else(|| PatchError::InvalidIndex {
        path: path.to_string(),
        segment: segment.to_string(),
    })
}

/// Shared, single-writer handle to a thread's [`StateDocument`].
///
/// Writers hold the lock for the duration of one snapshot or delta;
/// readers get a consistent clone and never observe a half-applied delta.
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<RwLock<StateDocument>>,
}

impl StateHandle {
    /// Wrap a document.
    pub fn new(document: StateDocument) -> Self {
        Self {
            inner: Arc::new(RwLock::new(document)),
        }
    }

    /// A consistent copy of the current document value.
    pub fn snapshot(&self) -> Value {
        self.inner.read().value().clone()
    }

    /// The current version.
    pub fn version(&self) -> u64 {
        self.inner.read().version()
    }

    /// Read the document under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&StateDocument) -> R) -> R {
        f(&self.inner.read())
    }

    /// Replace the document.
    pub fn apply_snapshot(&self, snapshot: Value) {
        self.inner.write().apply_snapshot(snapshot);
    }

    /// Apply a delta atomically. See [`StateDocument::apply_delta`].
    pub fn apply_delta(&self, ops: &[PatchOp]) -> Result<(), (usize, PatchError)> {
        self.inner.write().apply_delta(ops)
    }

    /// Seed the document if it has never been written.
    ///
    /// Returns `true` if the seed was applied.
    pub fn seed(&self, value: Value) -> bool {
        let mut doc = self.inner.write();
        if doc.version() > 0 {
            return false;
        }
        doc.apply_snapshot(value);
        true
    }
}

#[cfg(test)]
#[path = "reducer_tests.rs"]
mod tests;
