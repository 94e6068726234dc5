use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

use crate::promise::Outcome;

/// Depth at which plain JSON conversion and debug output stop descending.
const PLAIN_JSON_MAX_DEPTH: usize = 100;
const DEBUG_MAX_DEPTH: usize = 8;

/// Host-environment handles that are never transferred between contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    /// A document node.
    Node,
    /// A window or frame object.
    Window,
    /// A DOM event.
    Event,
    /// An element wrapped by a UI toolkit.
    WrappedElement,
}

/// A dynamic value that can cross a context boundary.
///
/// Arrays and objects are shared references: cloning a `Value` clones the
/// handle, not the contents, so shared and cyclic graphs can be built.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(Function),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    Host(HostKind),
}

impl Value {
    /// A new empty object.
    pub fn object() -> Self {
        Value::Object(ObjectRef::new())
    }

    /// A new array holding `items`.
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(ArrayRef::new(items))
    }

    /// A new object built from key/value pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let object = ObjectRef::new();
        for (key, value) in pairs {
            object.set(key, value);
        }
        Value::Object(object)
    }

    /// Wrap a closure as a function value.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&Value, Vec<Value>) -> Outcome + 'static,
    {
        Value::Function(Function::new(f))
    }

    /// An error object carrying `name` and `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Value::from_pairs([
            ("name", Value::from("Error")),
            ("message", Value::String(message.into())),
        ])
    }

    /// Message of an error value, or the string itself for string errors.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Object(object) => object.get("message").as_str().map(str::to_string),
            _ => None,
        }
    }

    /// Truthiness in the host-language sense.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// True for `Undefined` and `Null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<i64> {
        match self {
            Value::Date(ms) => Some(*ms),
            _ => None,
        }
    }

    /// Property lookup. Objects search their prototype chain; arrays accept
    /// decimal indices and `length`. Everything else yields `Undefined`.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(object) => object.get(key),
            Value::Array(array) => {
                if key == "length" {
                    return Value::from(array.len());
                }
                key.parse::<usize>()
                    .map(|index| array.get(index))
                    .unwrap_or_default()
            }
            _ => Value::Undefined,
        }
    }

    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Date(_) => "date",
            Value::Host(_) => "host",
        }
    }

    /// Plain JSON rendition, the way a JSON stringifier sees the value.
    ///
    /// Functions, undefined and host handles are dropped from objects and
    /// become null inside arrays; dates become epoch milliseconds. Graphs
    /// deeper than the conversion limit are cut off with null.
    pub fn to_plain_json(&self) -> serde_json::Value {
        plain_json(self, 1).unwrap_or(serde_json::Value::Null)
    }

    /// Build a value tree from plain JSON.
    pub fn from_plain_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::array(items.iter().map(Value::from_plain_json).collect())
            }
            serde_json::Value::Object(map) => {
                let object = ObjectRef::new();
                for (key, value) in map {
                    object.set(key.clone(), Value::from_plain_json(value));
                }
                Value::Object(object)
            }
        }
    }
}

fn plain_json(value: &Value, depth: usize) -> Option<serde_json::Value> {
    if depth > PLAIN_JSON_MAX_DEPTH {
        return Some(serde_json::Value::Null);
    }
    match value {
        Value::Undefined | Value::Function(_) | Value::Host(_) => None,
        Value::Null => Some(serde_json::Value::Null),
        Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
        Value::Number(n) => Some(number_to_json(*n)),
        Value::String(s) => Some(serde_json::Value::String(s.clone())),
        Value::Date(ms) => Some(serde_json::Value::from(*ms)),
        Value::Array(array) => Some(serde_json::Value::Array(
            array
                .to_vec()
                .iter()
                .map(|item| plain_json(item, depth + 1).unwrap_or(serde_json::Value::Null))
                .collect(),
        )),
        Value::Object(object) => {
            let mut map = serde_json::Map::new();
            for key in object.own_keys() {
                if let Some(item) = object.get_own(&key) {
                    if let Some(json) = plain_json(&item, depth + 1) {
                        map.insert(key, json);
                    }
                }
            }
            Some(serde_json::Value::Object(map))
        }
    }
}

/// Integral numbers render as JSON integers; non-finite numbers as null.
pub fn number_to_json(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl From<ArrayRef> for Value {
    fn from(array: ArrayRef) -> Self {
        Value::Array(array)
    }
}

impl From<ObjectRef> for Value {
    fn from(object: ObjectRef) -> Self {
        Value::Object(object)
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Value::Function(function)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_value(self, f, 0)
    }
}

fn debug_value(value: &Value, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    if depth > DEBUG_MAX_DEPTH {
        return f.write_str("…");
    }
    match value {
        Value::Undefined => f.write_str("undefined"),
        Value::Null => f.write_str("null"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Number(n) => write!(f, "{n}"),
        Value::String(s) => write!(f, "{s:?}"),
        Value::Date(ms) => write!(f, "Date({ms})"),
        Value::Host(kind) => write!(f, "Host({kind:?})"),
        Value::Function(_) => f.write_str("[Function]"),
        Value::Array(array) => {
            f.write_str("[")?;
            for (i, item) in array.to_vec().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                debug_value(item, f, depth + 1)?;
            }
            f.write_str("]")
        }
        Value::Object(object) => {
            f.write_str("{")?;
            for (i, key) in object.own_keys().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{key}: ")?;
                debug_value(&object.get(key), f, depth + 1)?;
            }
            f.write_str("}")
        }
    }
}

/// Shared, mutable array.
#[derive(Clone, Default)]
pub struct ArrayRef(Rc<RefCell<Vec<Value>>>);

impl ArrayRef {
    pub fn new(items: Vec<Value>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Element at `index`, or `Undefined` past the end.
    pub fn get(&self, index: usize) -> Value {
        self.0.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Store `value` at `index`, padding with `Undefined` as needed.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let mut items = self.0.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, Value::Undefined);
        }
        items[index] = value.into();
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(value.into());
    }

    /// Snapshot of the elements (element handles are shared).
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address-derived identity, stable while any handle is alive.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

#[derive(Default)]
struct ObjectData {
    properties: BTreeMap<String, Value>,
    prototype: Option<ObjectRef>,
}

/// Shared, mutable property map with an optional prototype.
#[derive(Clone, Default)]
pub struct ObjectRef(Rc<RefCell<ObjectData>>);

impl ObjectRef {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty object whose missing properties are looked up in `prototype`.
    pub fn with_prototype(prototype: ObjectRef) -> Self {
        Self(Rc::new(RefCell::new(ObjectData {
            properties: BTreeMap::new(),
            prototype: Some(prototype),
        })))
    }

    pub fn prototype(&self) -> Option<ObjectRef> {
        self.0.borrow().prototype.clone()
    }

    /// Own property, then the prototype chain; `Undefined` when absent.
    pub fn get(&self, key: &str) -> Value {
        let mut current = Some(self.clone());
        while let Some(object) = current {
            let data = object.0.borrow();
            if let Some(value) = data.properties.get(key) {
                return value.clone();
            }
            current = data.prototype.clone();
        }
        Value::Undefined
    }

    pub fn get_own(&self, key: &str) -> Option<Value> {
        self.0.borrow().properties.get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.borrow_mut().properties.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().properties.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().properties.contains_key(key)
    }

    pub fn own_keys(&self) -> Vec<String> {
        self.0.borrow().properties.keys().cloned().collect()
    }

    /// Union of own and inherited property names, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = BTreeSet::new();
        let mut current = Some(self.clone());
        while let Some(object) = current {
            let data = object.0.borrow();
            keys.extend(data.properties.keys().cloned());
            current = data.prototype.clone();
        }
        keys.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().properties.is_empty()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address-derived identity, stable while any handle is alive.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

/// A callable value. Receives the receiver (`this`) and the arguments.
#[derive(Clone)]
pub struct Function(Rc<dyn Fn(&Value, Vec<Value>) -> Outcome>);

impl Function {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, Vec<Value>) -> Outcome + 'static,
    {
        Self(Rc::new(f))
    }

    /// Invoke with an explicit receiver.
    pub fn call(&self, this: &Value, args: Vec<Value>) -> Outcome {
        (self.0)(this, args)
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[Function]")
    }
}
