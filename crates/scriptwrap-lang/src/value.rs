//! Dynamic values and the host-object seam.
//!
//! [`Value`] is the only type a script ever sees. Lists and maps have
//! reference semantics (like Groovy collections): copying a value shares the
//! underlying storage, so a script that receives a map and mutates it is
//! visible to everyone holding that map. Host objects are opaque
//! [`HostObject`] trait objects supplied by the embedder.

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::HostError;

/// Shared list storage.
pub type ListRef = Arc<Mutex<Vec<Value>>>;

/// Shared map storage. Keys are always strings.
pub type MapRef = Arc<Mutex<BTreeMap<String, Value>>>;

/// Nesting depth past which rendering and comparison stop descending.
///
/// Collections can contain themselves; the cap keeps that from recursing
/// forever.
const MAX_NESTING: usize = 32;

/// Longest string, in bytes, a script operation may produce.
pub const MAX_STRING_LEN: usize = 16 * 1024 * 1024;

/// Most elements a script operation may produce in one list.
pub const MAX_LIST_LEN: usize = 1 << 20;

/// Output units (one per element, plus string bytes) rendering or JSON
/// conversion spends before eliding the rest. Shared collections may form
/// DAGs whose expansion is exponential in their size.
const RENDER_BUDGET: usize = 1 << 20;

/// An embedder-provided object exposed to scripts.
///
/// Every method has a failing default so hosts only implement what they
/// support. Implementations must be thread-safe because the same object may
/// be bound into concurrent script runs.
pub trait HostObject: Send + Sync + fmt::Debug {
    /// Type name used in error messages and result type checks.
    fn type_name(&self) -> &'static str;

    /// Read `object.name`.
    fn get_property(&self, name: &str) -> Result<Value, HostError> {
        Err(HostError::no_property(self.type_name(), name))
    }

    /// Write `object.name = value`.
    fn set_property(&self, name: &str, _value: Value) -> Result<(), HostError> {
        Err(HostError::read_only(self.type_name(), name))
    }

    /// Read `object[key]`. Defaults to property access for string keys.
    fn get_index(&self, key: &Value) -> Result<Value, HostError> {
        match key {
            Value::Str(name) => self.get_property(name),
            other => Err(HostError::new(format!(
                "{} cannot be indexed by {}",
                self.type_name(),
                other.kind()
            ))),
        }
    }

    /// Write `object[key] = value`. Defaults to property assignment.
    fn set_index(&self, key: &Value, value: Value) -> Result<(), HostError> {
        match key {
            Value::Str(name) => self.set_property(name, value),
            other => Err(HostError::new(format!(
                "{} cannot be indexed by {}",
                self.type_name(),
                other.kind()
            ))),
        }
    }

    /// Call `object.name(args...)`.
    fn call_method(&self, name: &str, _args: Vec<Value>) -> Result<Value, HostError> {
        Err(HostError::no_method(self.type_name(), name))
    }

    /// How the object renders inside strings.
    fn describe(&self) -> String {
        format!("<{}>", self.type_name())
    }

    /// Downcasting hook for embedders.
    fn as_any(&self) -> &dyn Any;
}

/// A dynamically-typed script value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Immutable string.
    Str(Arc<str>),
    /// Shared, mutable list.
    List(ListRef),
    /// Shared, mutable string-keyed map.
    Map(MapRef),
    /// Embedder object.
    Object(Arc<dyn HostObject>),
}

/// Runtime type of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// `null`
    Null,
    /// `true` / `false`
    Bool,
    /// Integer.
    Int,
    /// Float.
    Float,
    /// String.
    Str,
    /// List.
    List,
    /// Map.
    Map,
    /// Host object with its type name.
    Object(&'static str),
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Str => write!(f, "string"),
            Self::List => write!(f, "list"),
            Self::Map => write!(f, "map"),
            Self::Object(name) => write!(f, "{name}"),
        }
    }
}

/// A type a caller expects a script result to have.
///
/// Checked against the result's runtime type; `null` never satisfies a
/// type, callers treat it as "no result" before checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Boolean.
    Bool,
    /// Integer.
    Int,
    /// Integer or float.
    Number,
    /// String.
    Str,
    /// List.
    List,
    /// Map.
    Map,
    /// Host object whose [`HostObject::type_name`] equals the given name.
    Host(&'static str),
}

impl ValueType {
    /// Whether `value`'s runtime type is compatible with this type.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value.kind()) {
            (Self::Bool, ValueKind::Bool)
            | (Self::Int, ValueKind::Int)
            | (Self::Number, ValueKind::Int | ValueKind::Float)
            | (Self::Str, ValueKind::Str)
            | (Self::List, ValueKind::List)
            | (Self::Map, ValueKind::Map) => true,
            (Self::Host(expected), ValueKind::Object(actual)) => expected == actual,
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Int => write!(f, "int"),
            Self::Number => write!(f, "number"),
            Self::Str => write!(f, "string"),
            Self::List => write!(f, "list"),
            Self::Map => write!(f, "map"),
            Self::Host(name) => write!(f, "{name}"),
        }
    }
}

impl Value {
    /// String value.
    pub fn string(s: impl Into<String>) -> Self {
        let s: String = s.into();
        Self::Str(Arc::from(s))
    }

    /// New list holding `items`.
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Arc::new(Mutex::new(items)))
    }

    /// New map holding `entries`.
    pub fn map(entries: BTreeMap<String, Value>) -> Self {
        Self::Map(Arc::new(Mutex::new(entries)))
    }

    /// Wrap a host object.
    pub fn object(object: impl HostObject + 'static) -> Self {
        Self::Object(Arc::new(object))
    }

    /// Runtime type.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Str(_) => ValueKind::Str,
            Self::List(_) => ValueKind::List,
            Self::Map(_) => ValueKind::Map,
            Self::Object(o) => ValueKind::Object(o.type_name()),
        }
    }

    /// Whether this is `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Groovy truth: `null`, `false`, zero, and empty strings/collections
    /// are false; everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(x) => *x != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.lock().is_empty(),
            Self::Map(entries) => !entries.lock().is_empty(),
            Self::Object(_) => true,
        }
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer, if this is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    /// Downcast a host object to its concrete type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::Object(o) => o.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Convert to JSON. Host objects render as their description.
    pub fn to_json(&self) -> serde_json::Value {
        let mut budget = RENDER_BUDGET;
        self.to_json_at(0, &mut budget)
    }

    fn to_json_at(&self, depth: usize, budget: &mut usize) -> serde_json::Value {
        use serde_json::Value as Json;
        if depth > MAX_NESTING {
            return Json::Null;
        }
        match self {
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(n) => Json::from(*n),
            Self::Float(x) => serde_json::Number::from_f64(*x).map_or(Json::Null, Json::Number),
            Self::Str(s) => Json::String(s.to_string()),
            Self::List(items) => {
                let (items, _) = take_list(items, budget);
                Json::Array(items.iter().map(|v| v.to_json_at(depth + 1, budget)).collect())
            }
            Self::Map(entries) => {
                let (entries, _) = take_map(entries, budget);
                Json::Object(
                    entries
                        .iter()
                        .map(|(k, v)| (k.clone(), v.to_json_at(depth + 1, budget)))
                        .collect(),
                )
            }
            Self::Object(o) => Json::String(o.describe()),
        }
    }

    /// Convert from JSON. Objects become maps, numbers become ints where
    /// they fit.
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(*b),
            Json::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            Json::String(s) => Self::string(s.as_str()),
            Json::Array(items) => Self::list(items.iter().map(Self::from_json).collect()),
            Json::Object(entries) => Self::map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize, budget: &mut usize) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => {
                if x.fract() == 0.0 && x.is_finite() {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
            Self::Str(s) if depth > 0 && s.len() > *budget => {
                *budget = 0;
                write!(f, "...")
            }
            Self::Str(s) => {
                if depth > 0 {
                    *budget -= s.len();
                }
                write!(f, "{s}")
            }
            Self::List(_) | Self::Map(_) if depth > MAX_NESTING || *budget == 0 => write!(f, "[...]"),
            Self::List(items) => {
                let (items, truncated) = take_list(items, budget);
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    item.render(f, depth + 1, budget)?;
                }
                if truncated {
                    write!(f, ", ...")?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                let (entries, truncated) = take_map(entries, budget);
                if entries.is_empty() && !truncated {
                    return write!(f, "[:]");
                }
                write!(f, "[")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}:")?;
                    value.render(f, depth + 1, budget)?;
                }
                if truncated {
                    write!(f, ", ...")?;
                }
                write!(f, "]")
            }
            Self::Object(o) => write!(f, "{}", o.describe()),
        }
    }

    /// Structural equality. `seen` holds collection pairs already under
    /// comparison; meeting one again counts as equal, which terminates on
    /// cycles and keeps shared substructure from being compared twice.
    #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
    fn equals(&self, other: &Self, depth: usize, seen: &mut HashSet<(usize, usize)>) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                if depth > MAX_NESTING {
                    return false;
                }
                if !seen.insert((Arc::as_ptr(a) as usize, Arc::as_ptr(b) as usize)) {
                    return true;
                }
                let a = a.lock().clone();
                let b = b.lock().clone();
                a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| x.equals(y, depth + 1, seen))
            }
            (Self::Map(a), Self::Map(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                if depth > MAX_NESTING {
                    return false;
                }
                if !seen.insert((Arc::as_ptr(a) as usize, Arc::as_ptr(b) as usize)) {
                    return true;
                }
                let a = a.lock().clone();
                let b = b.lock().clone();
                a.len() == b.len()
                    && a.iter()
                        .zip(&b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.equals(vb, depth + 1, seen))
            }
            (Self::Object(a), Self::Object(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            _ => false,
        }
    }
}

/// Clone at most `budget` leading items, charging them to the budget.
/// Reports whether items were left out.
fn take_list(items: &ListRef, budget: &mut usize) -> (Vec<Value>, bool) {
    let items = items.lock();
    let taken: Vec<Value> = items.iter().take(*budget).cloned().collect();
    *budget -= taken.len();
    let truncated = taken.len() < items.len();
    (taken, truncated)
}

fn take_map(entries: &MapRef, budget: &mut usize) -> (Vec<(String, Value)>, bool) {
    let entries = entries.lock();
    let taken: Vec<(String, Value)> = entries
        .iter()
        .take(*budget)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    *budget -= taken.len();
    let truncated = taken.len() < entries.len();
    (taken, truncated)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other, 0, &mut HashSet::new())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut budget = RENDER_BUDGET;
        self.render(f, 0, &mut budget)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            other => {
                let mut budget = RENDER_BUDGET;
                other.render(f, 0, &mut budget)
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::string(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::list(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self::map(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Oracle;

    impl HostObject for Oracle {
        fn type_name(&self) -> &'static str {
            "Oracle"
        }

        fn get_property(&self, name: &str) -> Result<Value, HostError> {
            match name {
                "answer" => Ok(Value::Int(42)),
                _ => Err(HostError::no_property("Oracle", name)),
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn map_of(pairs: &[(&str, Value)]) -> Value {
        Value::map(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn truthiness_follows_groovy() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::list(vec![]).is_truthy());
        assert!(!map_of(&[]).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::Float(0.5).is_truthy());
        assert!(Value::object(Oracle).is_truthy());
    }

    #[test]
    fn display_matches_groovy_shapes() {
        let list = Value::list(vec![Value::Int(1), Value::from("a"), Value::Null]);
        assert_eq!(list.to_string(), "[1, a, null]");
        assert_eq!(map_of(&[]).to_string(), "[:]");
        assert_eq!(
            map_of(&[("b", Value::Int(2)), ("a", Value::Bool(true))]).to_string(),
            "[a:true, b:2]"
        );
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::object(Oracle).to_string(), "<Oracle>");
    }

    #[test]
    fn lists_share_storage() {
        let a = Value::list(vec![]);
        let b = a.clone();
        if let Value::List(items) = &b {
            items.lock().push(Value::Int(1));
        }
        assert_eq!(a, Value::list(vec![Value::Int(1)]));
    }

    #[test]
    fn numeric_equality_crosses_int_and_float() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::from("2"));
    }

    #[test]
    fn objects_compare_by_identity() {
        let a = Value::object(Oracle);
        let b = Value::object(Oracle);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn self_containing_list_renders_without_hanging() {
        let outer = Value::list(vec![]);
        if let Value::List(items) = &outer {
            items.lock().push(outer.clone());
        }
        assert!(outer.to_string().contains("[...]"));
        assert_eq!(outer, outer.clone());
    }

    /// `[self, self]`: expands to 2^depth nodes if walked naively.
    fn doubly_self_containing() -> Value {
        let outer = Value::list(vec![]);
        if let Value::List(items) = &outer {
            let mut items = items.lock();
            items.push(outer.clone());
            items.push(outer.clone());
        }
        outer
    }

    #[test]
    fn shared_cycles_render_and_compare_in_bounded_time() {
        let a = doubly_self_containing();
        let b = doubly_self_containing();

        let rendered = a.to_string();
        assert!(rendered.len() <= 8 * RENDER_BUDGET);
        assert!(rendered.contains("[...]"));
        assert!(a.to_json().is_array());

        assert_eq!(a, b);
        let c = Value::list(vec![b.clone(), Value::Int(1)]);
        assert_ne!(a, c);
    }

    #[test]
    fn long_collections_render_truncated() {
        let items: Vec<Value> = (0..10).map(|_| Value::from("x".repeat(RENDER_BUDGET / 4))).collect();
        let list = Value::list(items);
        let rendered = list.to_string();
        assert!(rendered.ends_with("...]"));
        assert!(rendered.len() < RENDER_BUDGET + 64);
        assert!(rendered.starts_with("[xxx"));
    }

    #[test]
    fn value_type_checks() {
        assert!(ValueType::Bool.accepts(&Value::Bool(false)));
        assert!(ValueType::Number.accepts(&Value::Int(1)));
        assert!(ValueType::Number.accepts(&Value::Float(1.5)));
        assert!(!ValueType::Int.accepts(&Value::Float(1.5)));
        assert!(ValueType::Host("Oracle").accepts(&Value::object(Oracle)));
        assert!(!ValueType::Host("Launcher").accepts(&Value::object(Oracle)));
        assert!(!ValueType::Str.accepts(&Value::Null));
    }

    #[test]
    fn downcast_reaches_concrete_type() {
        let value = Value::object(Oracle);
        let oracle = value.downcast_ref::<Oracle>().unwrap();
        assert_eq!(oracle.get_property("answer").unwrap(), Value::Int(42));
        assert!(Value::Int(1).downcast_ref::<Oracle>().is_none());
    }

    #[test]
    fn json_conversion_preserves_structure() {
        let json = serde_json::json!({"a": [1, 2.5, "x"], "b": null, "c": true});
        let value = Value::from_json(&json);
        assert_eq!(value.to_json(), json);
        assert_eq!(value.kind(), ValueKind::Map);
    }

    #[test]
    fn default_host_index_uses_properties() {
        let oracle = Oracle;
        assert_eq!(oracle.get_index(&Value::from("answer")).unwrap(), Value::Int(42));
        assert!(oracle.get_index(&Value::Int(0)).is_err());
        assert!(oracle.set_property("answer", Value::Null).is_err());
    }
}
