//! JSON Patch operations and JSON Pointers.
//!
//! Only the `add`, `replace` and `remove` subset of RFC 6902 is carried by
//! `STATE_DELTA` events. Paths are RFC 6901 pointers.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PatchError;

/// One JSON Patch operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Insert or overwrite the target.
    Add {
        /// JSON Pointer to the target.
        path: String,
        /// Value to insert.
        value: Value,
    },
    /// Overwrite an existing target.
    Replace {
        /// JSON Pointer to the target.
        path: String,
        /// Replacement value.
        value: Value,
    },
    /// Delete an existing target. Carries no value.
    Remove {
        /// JSON Pointer to the target.
        path: String,
    },
}

impl PatchOp {
    /// Shorthand for an `add` op.
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        PatchOp::Add {
            path: path.into(),
            value,
        }
    }

    /// Shorthand for a `replace` op.
    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        PatchOp::Replace {
            path: path.into(),
            value,
        }
    }

    /// Shorthand for a `remove` op.
    pub fn remove(path: impl Into<String>) -> Self {
        PatchOp::Remove { path: path.into() }
    }

    /// The raw pointer string.
    pub fn path(&self) -> &str {
        match self {
            PatchOp::Add { path, .. }
            | PatchOp::Replace { path, .. }
            | PatchOp::Remove { path } => path,
        }
    }

    /// `"add"`, `"replace"` or `"remove"`.
    pub fn name(&self) -> &'static str {
        match self {
            PatchOp::Add { .. } => "add",
            PatchOp::Replace { .. } => "replace",
            PatchOp::Remove { .. } => "remove",
        }
    }
}

/// A parsed RFC 6901 JSON Pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    segments: Vec<String>,
}

impl Pointer {
    /// Parse a pointer string. The empty string addresses the document root.
    pub fn parse(raw: &str) -> Result<Self, PatchError> {
        if raw.is_empty() {
            return Ok(Self::root());
        }
        let Some(rest) = raw.strip_prefix('/') else {
            return Err(PatchError::InvalidPointer {
                path: raw.to_string(),
            });
        };

        let mut segments = Vec::new();
        for token in rest.split('/') {
            segments.push(unescape(token).ok_or_else(|| PatchError::InvalidPointer {
                path: raw.to_string(),
            })?);
        }
        Ok(Self { segments })
    }

    /// The root pointer (`""`).
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Build a pointer from unescaped segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this is the root pointer.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Unescaped segments, root first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Split into parent segments and the final segment.
    pub fn split_last(&self) -> Option<(&String, &[String])> {
        self.segments.split_last()
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", segment.replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}

/// Decode `~1` and `~0`. Any other `~` sequence is invalid.
fn unescape(token: &str) -> Option<String> {
    if !token.contains('~') {
        return Some(token.to_string());
    }
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Parse an array index segment. Rejects signs, leading zeros and `-`.
pub(crate) fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || (segment.len() > 1 && segment.starts_with('0')) {
        return None;
    }
    if !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

pub mod legacy {
    //! Adapter for the pre-RFC 6902 delta shape.
    //!
    //! Early AG-UI demos emitted `STATE_DELTA` payloads as
    //! `[{"path": ["preferences", "theme"], "value": "dark"}]`. This converts
    //! them into `add` ops so the session only ever sees [`PatchOp`]s.

    use serde_json::Value;

    use super::{PatchOp, Pointer};
    use crate::error::PatchError;

    /// Translate a legacy delta (a single entry or an array of entries).
    pub fn translate(delta: &Value) -> Result<Vec<PatchOp>, PatchError> {
        match delta {
            Value::Array(entries) => entries.iter().map(translate_entry).collect(),
            Value::Object(_) => Ok(vec![translate_entry(delta)?]),
            other => Err(PatchError::Legacy(format!(
                "expected an object or array, got {}",
                kind(other)
            ))),
        }
    }

    fn translate_entry(entry: &Value) -> Result<PatchOp, PatchError> {
        let keys = entry
            .get("path")
            .and_then(Value::as_array)
            .ok_or_else(|| PatchError::Legacy("entry has no `path` array".to_string()))?;

        let mut segments = Vec::with_capacity(keys.len());
        for key in keys {
            match key {
                Value::String(s) => segments.push(s.clone()),
                Value::Number(n) => segments.push(n.to_string()),
                other => {
                    return Err(PatchError::Legacy(format!(
                        "path segment must be a string or number, got {}",
                        kind(other)
                    )))
                }
            }
        }

        let value = entry.get("value").cloned().unwrap_or(Value::Null);
        Ok(PatchOp::add(Pointer::from_segments(segments).to_string(), value))
    }

    fn kind(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

#[cfg(test)]
#[path = "patch_tests.rs"]
mod tests;
