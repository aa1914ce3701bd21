use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, SecondsFormat};

use crate::model::ModelObject;

/// Canonical runtime value accepted by the converter.
///
/// Closed set of source kinds:
/// - Scalars: `Null`, `Bool`, `Int`, `Float`, `Str`, `Timestamp`
/// - Collections: `List` (ordered), `Tuple` (fixed), `Set` (unique elements), `Map`
/// - `Model`: an already constructed model instance, shared by `Arc`
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(DateTime<FixedOffset>),

    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Elements are unique; order carries no meaning.
    Set(Vec<Value>),
    Map(Mapping),

    Model(Arc<dyn ModelObject>),
}

/// Source kind of a [`Value`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Timestamp,
    List,
    Tuple,
    Set,
    Map,
    Model,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::Timestamp => "datetime",
            ValueKind::List => "list",
            ValueKind::Tuple => "tuple",
            ValueKind::Set => "set",
            ValueKind::Map => "map",
            ValueKind::Model => "model",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::List(_) => ValueKind::List,
            Value::Tuple(_) => ValueKind::Tuple,
            Value::Set(_) => ValueKind::Set,
            Value::Map(_) => ValueKind::Map,
            Value::Model(_) => ValueKind::Model,
        }
    }

    /// Runtime type name used in error messages. Model instances report
    /// their model name instead of the generic `model` kind.
    pub fn type_name(&self) -> String {
        match self {
            Value::Model(object) => object.model_name().to_string(),
            other => other.kind().to_string(),
        }
    }

    pub fn model(object: impl ModelObject) -> Self {
        Value::Model(Arc::new(object))
    }

    /// Build a `Set`, dropping duplicate elements (first occurrence wins).
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Set(dedup(items))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Mapping> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow the concrete model behind a `Model` value.
    pub fn as_model<M: ModelObject>(&self) -> Option<&M> {
        match self {
            Value::Model(object) => object.as_any().downcast_ref::<M>(),
            _ => None,
        }
    }

    /// Render as JSON. Tuples and sets become arrays, timestamps ISO-8601
    /// strings, models objects. Non-finite floats have no JSON form and
    /// become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::json!(i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(ts) => serde_json::Value::String(iso_format(ts)),
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(mapping) => mapping_to_json(mapping),
            Value::Model(object) => mapping_to_json(&object.fields()),
        }
    }
}

fn mapping_to_json(mapping: &Mapping) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = mapping
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_json()))
        .collect();
    serde_json::Value::Object(map)
}

/// ISO-8601 text with sub-second digits only when non-zero.
pub(crate) fn iso_format(ts: &DateTime<FixedOffset>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Hashable identity of a scalar value, agreeing with `Value`'s equality.
///
/// Kinds stay apart (`Int(1)` and `Float(1.0)` are different keys). Floats
/// hash by bit pattern with both zeros folded together. NaN and compound
/// values have no key.
#[derive(PartialEq, Eq, Hash)]
enum ScalarKey<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(&'a str),
    Timestamp(i64, u32),
}

impl<'a> ScalarKey<'a> {
    fn of(value: &'a Value) -> Option<Self> {
        Some(match value {
            Value::Null => ScalarKey::Null,
            Value::Bool(b) => ScalarKey::Bool(*b),
            Value::Int(i) => ScalarKey::Int(*i),
            Value::Float(f) if f.is_nan() => return None,
            Value::Float(f) if *f == 0.0 => ScalarKey::Float(0.0f64.to_bits()),
            Value::Float(f) => ScalarKey::Float(f.to_bits()),
            Value::Str(s) => ScalarKey::Str(s),
            Value::Timestamp(ts) => ScalarKey::Timestamp(ts.timestamp(), ts.timestamp_subsec_nanos()),
            Value::List(_) | Value::Tuple(_) | Value::Set(_) | Value::Map(_) | Value::Model(_) => {
                return None;
            }
        })
    }
}

/// Drop duplicates, keeping the first occurrence. Scalars are found through
/// a hash set; compound values are compared pairwise against the compound
/// values kept so far.
pub(crate) fn dedup(items: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let items: Vec<Value> = items.into_iter().collect();
    let keep: Vec<bool> = {
        let mut seen = HashSet::with_capacity(items.len());
        let mut compound: Vec<usize> = Vec::new();
        items
            .iter()
            .enumerate()
            .map(|(index, item)| match ScalarKey::of(item) {
                Some(key) => seen.insert(key),
                // NaN equals nothing, itself included.
                None if matches!(item, Value::Float(_)) => true,
                None => {
                    let fresh = !compound.iter().any(|&kept| items[kept] == *item);
                    if fresh {
                        compound.push(index);
                    }
                    fresh
                }
            })
            .collect()
    };
    items
        .into_iter()
        .zip(keep)
        .filter_map(|(item, keep)| keep.then_some(item))
        .collect()
}

/// Unordered equality: same size and every element of `a` present in `b`.
fn set_eq(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let scalars: HashSet<ScalarKey<'_>> = b.iter().filter_map(ScalarKey::of).collect();
    let compound: Vec<&Value> = b
        .iter()
        .filter(|item| ScalarKey::of(item).is_none())
        .collect();
    a.iter().all(|item| match ScalarKey::of(item) {
        Some(key) => scalars.contains(&key),
        None => compound.iter().any(|other| *other == item),
    })
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => set_eq(a, b),
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Model(a), Value::Model(b)) => {
                Arc::ptr_eq(a, b) || (a.model_name() == b.model_name() && a.fields() == b.fields())
            }
            _ => false,
        }
    }
}

/// Generic stringify. Strings render bare at the top level and quoted
/// inside collections.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            other => write_repr(other, f),
        }
    }
}

fn write_repr(value: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match value {
        Value::Null => f.write_str("null"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Int(i) => write!(f, "{i}"),
        // `{:?}` keeps the fractional part (`1.0`, not `1`) and parses back exactly.
        Value::Float(x) => write!(f, "{x:?}"),
        Value::Str(s) => write!(f, "{s:?}"),
        Value::Timestamp(ts) => f.write_str(&iso_format(ts)),
        Value::List(items) => write_items(items, "[", "]", f),
        Value::Tuple(items) => write_items(items, "(", ")", f),
        Value::Set(items) => write_items(items, "{", "}", f),
        Value::Map(mapping) => {
            f.write_str("{")?;
            for (i, (key, item)) in mapping.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{key:?}: ")?;
                write_repr(item, f)?;
            }
            f.write_str("}")
        }
        Value::Model(object) => {
            write!(f, "{}(", object.model_name())?;
            for (i, (key, item)) in object.fields().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{key}=")?;
                write_repr(item, f)?;
            }
            f.write_str(")")
        }
    }
}

fn write_items(items: &[Value], open: &str, close: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_repr(item, f)?;
    }
    f.write_str(close)
}

// ---------------------------------------------------------------------------
// From impls
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(ts: DateTime<FixedOffset>) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Mapping> for Value {
    fn from(mapping: Mapping) -> Self {
        Value::Map(mapping)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                // u64 above i64::MAX and all non-integers.
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Insertion-ordered string-keyed map. Keys are unique: inserting an existing
/// key replaces the value in place.
///
/// Models have a handful of fields, so lookups are linear.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
    entries: Vec<(String, Value)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert or replace. Returns the previous value for `key`, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(std::mem::replace(&mut entry.1, value))
        } else {
            self.entries.push((key, value));
            None
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_keys(self) -> impl Iterator<Item = String> {
        self.entries.into_iter().map(|(k, _)| k)
    }
}

/// Order-insensitive, like comparing two dictionaries.
impl PartialEq for Mapping {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.iter().all(|(k, v)| other.get(k).is_some_and(|o| o == v))
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut mapping = Mapping::new();
        for (k, v) in iter {
            mapping.insert(k, v);
        }
        mapping
    }
}

impl IntoIterator for Mapping {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
