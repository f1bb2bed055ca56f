//! Per-render state for dynamic SQL
//!
//! A [`DynamicContext`] is created for every render of a fragment tree. It
//! owns the SQL buffer, the named bindings and the unique-number counter;
//! the tree itself is never mutated.

use crate::value::Value;
use ahash::AHashMap;

/// Binding name under which the parameter object is exposed.
pub const PARAMETER_OBJECT_KEY: &str = "_parameter";
/// Binding name under which the active database id is exposed.
pub const DATABASE_ID_KEY: &str = "_databaseId";

/// Mutable rendering context consumed by [`SqlNode`](super::SqlNode).
#[derive(Debug)]
pub struct DynamicContext {
    parameter: Value,
    bindings: AHashMap<String, Value>,
    /// Buffer stack. Index 0 is the statement buffer; nested entries are
    /// isolated fragment buffers opened by trim/foreach nodes.
    buffers: Vec<Vec<String>>,
    unique_number: usize,
}

impl DynamicContext {
    pub fn new(parameter: Value) -> Self {
        let mut bindings = AHashMap::new();
        bindings.insert(PARAMETER_OBJECT_KEY.to_string(), parameter.clone());
        bindings.insert(DATABASE_ID_KEY.to_string(), Value::Null);
        Self {
            parameter,
            bindings,
            buffers: vec![Vec::new()],
            unique_number: 0,
        }
    }

    pub fn with_database_id(mut self, database_id: Option<&str>) -> Self {
        self.bindings
            .insert(DATABASE_ID_KEY.to_string(), database_id.into());
        self
    }

    pub fn parameter(&self) -> &Value {
        &self.parameter
    }

    pub fn bindings(&self) -> &AHashMap<String, Value> {
        &self.bindings
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn unbind(&mut self, name: &str) -> Option<Value> {
        self.bindings.remove(name)
    }

    /// Resolves a dotted path against the bindings, falling back to the
    /// parameter object. Unknown paths resolve to [`Value::Null`].
    pub fn resolve(&self, path: &str) -> Value {
        resolve_path(&self.bindings, &self.parameter, path)
    }

    /// Appends a fragment to the innermost open buffer.
    ///
    /// Fragments are joined with a single space; blank fragments are dropped.
    pub fn append_sql(&mut self, sql: &str) {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return;
        }
        if let Some(buffer) = self.buffers.last_mut() {
            buffer.push(trimmed.to_string());
        }
    }

    /// The accumulated statement text, trimmed.
    pub fn sql(&self) -> String {
        self.buffers
            .first()
            .map(|parts| parts.join(" "))
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    /// Returns the current counter value and advances it.
    pub fn next_unique_number(&mut self) -> usize {
        let n = self.unique_number;
        self.unique_number += 1;
        n
    }

    /// Opens an isolated buffer; appends go there until [`Self::pop_fragment`].
    pub(crate) fn push_fragment(&mut self) {
        self.buffers.push(Vec::new());
    }

    /// Closes the innermost isolated buffer and returns its text.
    pub(crate) fn pop_fragment(&mut self) -> String {
        if self.buffers.len() <= 1 {
            return String::new();
        }
        self.buffers
            .pop()
            .map(|parts| parts.join(" "))
            .unwrap_or_default()
    }

    /// Consumes the context, returning the statement text and the bindings.
    pub fn into_parts(self) -> (String, AHashMap<String, Value>) {
        let sql = self.sql();
        (sql, self.bindings)
    }
}

/// Shared path resolution used by rendering and by placeholder binding.
///
/// The first path segment is looked up in `bindings`; otherwise the whole
/// path is resolved inside a map parameter. A scalar parameter answers any
/// single-segment name, which lets `#{id}` bind a bare `42`.
pub(crate) fn resolve_path(
    bindings: &AHashMap<String, Value>,
    parameter: &Value,
    path: &str,
) -> Value {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    if let Some(bound) = bindings.get(head) {
        return match rest {
            Some(rest) => bound.lookup(rest).unwrap_or(Value::Null),
            None => bound.clone(),
        };
    }

    match parameter {
        Value::Map(_) => parameter.lookup(path).unwrap_or(Value::Null),
        Value::Null | Value::List(_) => Value::Null,
        scalar if rest.is_none() => scalar.clone(),
        _ => Value::Null,
    }
}
