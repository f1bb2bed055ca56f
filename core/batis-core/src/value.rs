//! Parameter and result values
//!
//! 파라미터 객체, 바인딩, 캐시 값, 결과 행을 모두 표현하는 동적 값 타입

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A result row: column name → value.
pub type Row = BTreeMap<String, Value>;

/// Dynamically typed value used for parameter objects, bindings and cached results.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Builds a map value from `(key, value)` pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by test expressions.
    ///
    /// Null, `false`, zero and empty text are false; containers are true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Bytes(_) | Value::List(_) | Value::Map(_) => true,
        }
    }

    /// Looks up a single property of a map value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.get(name),
            _ => None,
        }
    }

    /// Resolves a dotted path (`user.address.city`) below this value.
    ///
    /// List elements can be addressed by index (`items.0`), and `size`
    /// on a list, map or text yields its length.
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let mut current = self.clone();
        for segment in path.split('.').filter(|s| !s.is_empty()) {
            current = match &current {
                Value::Map(m) => match m.get(segment) {
                    Some(v) => v.clone(),
                    None if segment == "size" => Value::Int(m.len() as i64),
                    None => return None,
                },
                Value::List(items) => {
                    if segment == "size" {
                        Value::Int(items.len() as i64)
                    } else {
                        let idx: usize = segment.parse().ok()?;
                        items.get(idx)?.clone()
                    }
                }
                Value::Text(s) if segment == "size" => Value::Int(s.chars().count() as i64),
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view used by ordered comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn type_tag(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Text(_) => 4,
            Value::Bytes(_) => 5,
            Value::List(_) => 6,
            Value::Map(_) => 7,
        }
    }
}

// Float equality is by bit pattern so that Value can key hash maps.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_tag().hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::List(items) => items.hash(state),
            Value::Map(m) => m.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Packs result rows into a single cacheable value.
pub fn rows_to_value(rows: &[Row]) -> Value {
    Value::List(rows.iter().cloned().map(Value::Map).collect())
}

/// Inverse of [`rows_to_value`]; non-map elements are skipped.
pub fn value_to_rows(value: &Value) -> Vec<Row> {
    match value {
        Value::List(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Map(m) => Some(m.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn lookup_nested_path() {
        let user = Value::map([
            ("name", Value::from("alice")),
            ("address", Value::map([("city", "Seoul")])),
            ("tags", Value::List(vec!["a".into(), "b".into()])),
        ]);

        assert_eq!(user.lookup("address.city"), Some(Value::from("Seoul")));
        assert_eq!(user.lookup("tags.1"), Some(Value::from("b")));
        assert_eq!(user.lookup("tags.size"), Some(Value::Int(2)));
        assert_eq!(user.lookup("missing"), None);
        assert_eq!(user.lookup("name.first"), None);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::List(vec![]).is_truthy());
    }

    #[test]
    fn float_values_hash_by_bits() {
        let mut set = HashSet::new();
        set.insert(Value::Float(1.5));
        assert!(set.contains(&Value::Float(1.5)));
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn rows_survive_value_packing() {
        let mut row = Row::new();
        row.insert("id".to_string(), Value::Int(7));
        let packed = rows_to_value(&[row.clone()]);
        assert_eq!(value_to_rows(&packed), vec![row]);
    }
}
