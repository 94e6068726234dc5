//! Cycle- and function-safe deep copy between [`Value`] graphs and JSON.
//!
//! Serialization walks the graph depth-first, keeping the current ancestry
//! path. Back-references to an ancestor become `{"__circularReference": n}`
//! and the copied ancestor is tagged with `"__circularReferenceId": n`.
//! Functions are registered with a [`FunctionMarshaler`] and replaced by
//! `{"__proxyFunctionId": id, "__channelId": channel}`; dates become
//! `{"__proxyDate": millis}`. Deserialization reverses all three.

use std::collections::HashMap;

use frameport_core::{number_to_json, ArrayRef, Function, ObjectRef, Value};

use crate::message::SerializationSettings;

/// Nesting depth beyond which a subtree serializes as null.
pub const MAX_DEPTH: usize = 100;

pub const CIRCULAR_REFERENCE: &str = "__circularReference";
pub const CIRCULAR_REFERENCE_ID: &str = "__circularReferenceId";
pub const PROXY_FUNCTION_ID: &str = "__proxyFunctionId";
pub const CHANNEL_ID: &str = "__channelId";
pub const PROXY_DATE: &str = "__proxyDate";

/// Bridges function values to the channel that owns the proxy table.
pub trait FunctionMarshaler {
    /// Id of the channel that registers proxies.
    fn channel_id(&self) -> u64;

    /// Keep `function` callable from the remote side, bound to `receiver`.
    /// Returns the proxy id.
    fn register_proxy_function(&self, function: &Function, receiver: &Value) -> u64;

    /// Local stand-in for the remote proxy function `proxy_id`.
    fn remote_function(&self, proxy_id: u64) -> Function;
}

/// Serialize `value` for the wire.
///
/// A falsy root serializes as null.
pub fn serialize<M: FunctionMarshaler + ?Sized>(
    value: &Value,
    settings: Option<&SerializationSettings>,
    marshaler: &M,
) -> serde_json::Value {
    let include_underscore = settings.is_some_and(SerializationSettings::includes_underscore_properties);
    Serializer::new(marshaler, include_underscore).serialize_root(value)
}

/// Serialize a single result or error value.
///
/// The value is serialized as the only element of a wrapper array, so a
/// function result is bound to the wrapper and falsy values survive.
pub fn serialize_item<M: FunctionMarshaler + ?Sized>(
    value: &Value,
    settings: Option<&SerializationSettings>,
    marshaler: &M,
) -> serde_json::Value {
    let wrapper = Value::array(vec![value.clone()]);
    match serialize(&wrapper, settings, marshaler) {
        serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        _ => serde_json::Value::Null,
    }
}

/// Rebuild a live value graph from its wire form.
pub fn deserialize<M: FunctionMarshaler + ?Sized>(
    json: &serde_json::Value,
    marshaler: &M,
) -> Value {
    Deserializer {
        marshaler,
        circular_refs: HashMap::new(),
    }
    .deserialize(json)
}

/// Counterpart of [`serialize_item`].
pub fn deserialize_item<M: FunctionMarshaler + ?Sized>(
    json: &serde_json::Value,
    marshaler: &M,
) -> Value {
    let wrapper = serde_json::Value::Array(vec![json.clone()]);
    deserialize(&wrapper, marshaler).get("0")
}

struct Ancestor {
    identity: usize,
    is_array: bool,
    circular_id: Option<u64>,
}

struct Serializer<'a, M: ?Sized> {
    marshaler: &'a M,
    include_underscore: bool,
    ancestry: Vec<Ancestor>,
    next_circular_id: u64,
}

impl<'a, M: FunctionMarshaler + ?Sized> Serializer<'a, M> {
    fn new(marshaler: &'a M, include_underscore: bool) -> Self {
        Self {
            marshaler,
            include_underscore,
            ancestry: Vec::new(),
            next_circular_id: 1,
        }
    }

    fn serialize_root(&mut self, value: &Value) -> serde_json::Value {
        if !value.is_truthy() {
            return serde_json::Value::Null;
        }
        match value {
            Value::Array(_) | Value::Object(_) | Value::Host(_) => self.serialize_container(value, 1),
            Value::Function(function) => self.proxy_function(function, &Value::Undefined),
            _ => self.serialize_member(&Value::Undefined, value, None, 1).unwrap_or_default(),
        }
    }

    fn serialize_container(&mut self, value: &Value, depth: usize) -> serde_json::Value {
        if depth > MAX_DEPTH {
            tracing::debug!(depth, "serialization depth limit reached, truncating");
            return serde_json::Value::Null;
        }
        match value {
            Value::Array(array) => self.serialize_array(value, array, depth),
            Value::Object(object) => self.serialize_object(value, object, depth),
            _ => serde_json::Value::Null,
        }
    }

    fn serialize_array(&mut self, value: &Value, array: &ArrayRef, depth: usize) -> serde_json::Value {
        self.enter(array.identity(), true);
        let items = array
            .to_vec()
            .iter()
            .map(|item| {
                self.serialize_member(value, item, None, depth)
                    .unwrap_or(serde_json::Value::Null)
            })
            .collect();
        self.ancestry.pop();
        serde_json::Value::Array(items)
    }

    fn serialize_object(&mut self, value: &Value, object: &ObjectRef, depth: usize) -> serde_json::Value {
        self.enter(object.identity(), false);
        let mut map = serde_json::Map::new();
        for key in object.keys() {
            if !self.include_key(&key) {
                continue;
            }
            let item = object.get(&key);
            if let Some(json) = self.serialize_member(value, &item, Some(&key), depth) {
                map.insert(key, json);
            }
        }
        if let Some(ancestor) = self.ancestry.pop() {
            if let Some(id) = ancestor.circular_id {
                map.insert(CIRCULAR_REFERENCE_ID.to_string(), serde_json::Value::from(id));
            }
        }
        serde_json::Value::Object(map)
    }

    /// Serialize one property or element of `parent`. `None` skips it.
    fn serialize_member(
        &mut self,
        parent: &Value,
        item: &Value,
        key: Option<&str>,
        depth: usize,
    ) -> Option<serde_json::Value> {
        match item {
            Value::Undefined => None,
            Value::Array(array) => Some(
                self.back_reference(array.identity())
                    .unwrap_or_else(|| self.serialize_container(item, depth + 1)),
            ),
            Value::Object(object) => Some(
                self.back_reference(object.identity())
                    .unwrap_or_else(|| self.serialize_container(item, depth + 1)),
            ),
            Value::Function(function) => Some(self.proxy_function(function, parent)),
            Value::Date(ms) => Some(serde_json::json!({ PROXY_DATE: ms })),
            Value::Host(_) => Some(serde_json::Value::Null),
            _ if key == Some(PROXY_FUNCTION_ID) => None,
            Value::Null => Some(serde_json::Value::Null),
            Value::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Value::Number(n) => Some(number_to_json(*n)),
            Value::String(s) => Some(serde_json::Value::String(s.clone())),
        }
    }

    fn proxy_function(&mut self, function: &Function, receiver: &Value) -> serde_json::Value {
        let proxy_id = self.marshaler.register_proxy_function(function, receiver);
        serde_json::json!({
            PROXY_FUNCTION_ID: proxy_id,
            CHANNEL_ID: self.marshaler.channel_id(),
        })
    }

    /// Marker for a container already on the ancestry path.
    fn back_reference(&mut self, identity: usize) -> Option<serde_json::Value> {
        let position = self
            .ancestry
            .iter()
            .position(|ancestor| ancestor.identity == identity)?;

        let ancestor = &mut self.ancestry[position];
        if ancestor.is_array {
            // Arrays cannot carry the id tag on the wire.
            return Some(serde_json::Value::Null);
        }
        let id = match ancestor.circular_id {
            Some(id) => id,
            None => {
                let id = self.next_circular_id;
                self.next_circular_id += 1;
                ancestor.circular_id = Some(id);
                id
            }
        };
        Some(serde_json::json!({ CIRCULAR_REFERENCE: id }))
    }

    fn enter(&mut self, identity: usize, is_array: bool) {
        self.ancestry.push(Ancestor {
            identity,
            is_array,
            circular_id: None,
        });
    }

    fn include_key(&self, key: &str) -> bool {
        self.include_underscore || !(key.is_empty() || key.starts_with('_'))
    }
}

struct Deserializer<'a, M: ?Sized> {
    marshaler: &'a M,
    circular_refs: HashMap<u64, Value>,
}

impl<M: FunctionMarshaler + ?Sized> Deserializer<'_, M> {
    fn deserialize(&mut self, json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                let array = ArrayRef::new(Vec::with_capacity(items.len()));
                for item in items {
                    let value = self.deserialize(item);
                    array.push(value);
                }
                Value::Array(array)
            }
            serde_json::Value::Object(map) => self.deserialize_object(map),
        }
    }

    fn deserialize_object(&mut self, map: &serde_json::Map<String, serde_json::Value>) -> Value {
        if let Some(proxy_id) = marker_id(map, PROXY_FUNCTION_ID) {
            return Value::Function(self.marshaler.remote_function(proxy_id));
        }
        if let Some(ms) = map.get(PROXY_DATE).and_then(serde_json::Value::as_f64) {
            return Value::Date(ms as i64);
        }
        if let Some(id) = marker_id(map, CIRCULAR_REFERENCE) {
            return self.circular_refs.get(&id).cloned().unwrap_or_default();
        }

        let object = ObjectRef::new();
        // Register before descending so back-references inside resolve.
        if let Some(id) = map.get(CIRCULAR_REFERENCE_ID).and_then(serde_json::Value::as_u64) {
            self.circular_refs.insert(id, Value::Object(object.clone()));
        }
        for (key, item) in map {
            if key == CIRCULAR_REFERENCE_ID && item.is_number() {
                continue;
            }
            let value = self.deserialize(item);
            object.set(key.clone(), value);
        }
        Value::Object(object)
    }
}

/// A non-zero integer marker under `key`.
fn marker_id(map: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<u64> {
    map.get(key)
        .and_then(serde_json::Value::as_u64)
        .filter(|id| *id != 0)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use frameport_core::Completion;

    use super::*;

    /// Records registrations; remote functions echo their proxy id.
    #[derive(Default)]
    struct Recorder {
        registered: RefCell<Vec<(Function, Value)>>,
    }

    impl FunctionMarshaler for Recorder {
        fn channel_id(&self) -> u64 {
            7
        }

        fn register_proxy_function(&self, function: &Function, receiver: &Value) -> u64 {
            let mut registered = self.registered.borrow_mut();
            registered.push((function.clone(), receiver.clone()));
            registered.len() as u64
        }

        fn remote_function(&self, proxy_id: u64) -> Function {
            Function::new(move |_, _| Ok(Completion::Ready(Value::from(proxy_id))))
        }
    }

    fn noop() -> Value {
        Value::function(|_, _| Ok(Completion::Ready(Value::Undefined)))
    }

    #[test]
    fn falsy_root_serializes_as_null() {
        let m = Recorder::default();
        assert_eq!(serialize(&Value::Null, None, &m), serde_json::Value::Null);
        assert_eq!(serialize(&Value::from(0), None, &m), serde_json::Value::Null);
        assert_eq!(serialize(&Value::from(""), None, &m), serde_json::Value::Null);
    }

    #[test]
    fn falsy_items_survive_through_the_wrapper() {
        let m = Recorder::default();
        assert_eq!(serialize_item(&Value::from(0), None, &m), serde_json::json!(0));
        assert_eq!(serialize_item(&Value::from(false), None, &m), serde_json::json!(false));
        assert_eq!(serialize_item(&Value::Undefined, None, &m), serde_json::Value::Null);
    }

    #[test]
    fn plain_graphs_copy_as_is() {
        let m = Recorder::default();
        let value = Value::from_pairs([
            ("name", Value::from("widget")),
            ("count", Value::from(3)),
            ("ratio", Value::from(0.25)),
            ("tags", Value::array(vec![Value::from("a"), Value::Undefined, Value::Null])),
            ("missing", Value::Undefined),
        ]);

        assert_eq!(
            serialize(&value, None, &m),
            serde_json::json!({
                "name": "widget",
                "count": 3,
                "ratio": 0.25,
                "tags": ["a", null, null]
            })
        );
    }

    #[test]
    fn underscore_properties_are_filtered_unless_requested() {
        let m = Recorder::default();
        let value = Value::from_pairs([("_secret", 1), ("visible", 2), ("", 3)]);

        assert_eq!(serialize(&value, None, &m), serde_json::json!({"visible": 2}));

        let settings = SerializationSettings::with_underscore_properties();
        assert_eq!(
            serialize(&value, Some(&settings), &m),
            serde_json::json!({"_secret": 1, "visible": 2, "": 3})
        );
    }

    #[test]
    fn inherited_properties_are_included() {
        let m = Recorder::default();
        let proto = ObjectRef::new();
        proto.set("kind", "base");
        let object = ObjectRef::with_prototype(proto);
        object.set("own", 1);

        assert_eq!(
            serialize(&Value::Object(object), None, &m),
            serde_json::json!({"kind": "base", "own": 1})
        );
    }

    #[test]
    fn self_reference_roundtrips_to_the_copy() {
        let m = Recorder::default();
        let original = ObjectRef::new();
        original.set("name", "a");
        original.set("self", original.clone());

        let json = serialize(&Value::Object(original.clone()), None, &m);
        assert_eq!(
            json,
            serde_json::json!({
                "name": "a",
                "self": {"__circularReference": 1},
                "__circularReferenceId": 1
            })
        );

        let copy = deserialize(&json, &m);
        let copy_object = copy.as_object().expect("copy should be an object");
        let self_ref = copy.get("self");
        let self_object = self_ref.as_object().expect("self should be an object");

        assert!(self_object.ptr_eq(copy_object));
        assert!(!copy_object.ptr_eq(&original));
        assert!(!copy_object.contains_key(CIRCULAR_REFERENCE_ID));
    }

    #[test]
    fn shared_but_acyclic_references_are_copied_twice() {
        let m = Recorder::default();
        let shared = Value::from_pairs([("v", 1)]);
        let value = Value::from_pairs([("left", shared.clone()), ("right", shared)]);

        let json = serialize(&value, None, &m);
        assert_eq!(json, serde_json::json!({"left": {"v": 1}, "right": {"v": 1}}));
    }

    #[test]
    fn nested_back_references_get_distinct_ids() {
        let m = Recorder::default();
        let outer = ObjectRef::new();
        let left = ObjectRef::new();
        let right = ObjectRef::new();
        left.set("up", left.clone());
        right.set("up", right.clone());
        right.set("root", outer.clone());
        outer.set("left", left);
        outer.set("right", right);

        let json = serialize(&Value::Object(outer), None, &m);
        let left_id = &json["left"][CIRCULAR_REFERENCE_ID];
        let right_id = &json["right"][CIRCULAR_REFERENCE_ID];
        assert_ne!(left_id, right_id);

        let copy = deserialize(&json, &m);
        let left_copy = copy.get("left");
        let right_copy = copy.get("right");
        assert!(left_copy.get("up").as_object().unwrap().ptr_eq(left_copy.as_object().unwrap()));
        assert!(right_copy.get("up").as_object().unwrap().ptr_eq(right_copy.as_object().unwrap()));
        assert!(right_copy.get("root").as_object().unwrap().ptr_eq(copy.as_object().unwrap()));
    }

    #[test]
    fn back_reference_to_array_becomes_null() {
        let m = Recorder::default();
        let array = ArrayRef::new(vec![Value::from(1)]);
        array.push(Value::Array(array.clone()));

        let json = serialize(&Value::Array(array), None, &m);
        assert_eq!(json, serde_json::json!([1, null]));
    }

    #[test]
    fn functions_become_proxy_markers_bound_to_their_container() {
        let m = Recorder::default();
        let value = Value::from_pairs([("onDone", noop()), ("label", Value::from("x"))]);

        let json = serialize(&value, None, &m);
        assert_eq!(json["onDone"], serde_json::json!({"__proxyFunctionId": 1, "__channelId": 7}));

        let registered = m.registered.borrow();
        assert_eq!(registered.len(), 1);
        let receiver = registered[0].1.as_object().expect("receiver should be the object");
        assert!(receiver.ptr_eq(value.as_object().unwrap()));
    }

    #[test]
    fn proxy_markers_deserialize_to_callables() {
        let m = Recorder::default();
        let json = serde_json::json!({"cb": {"__proxyFunctionId": 42, "__channelId": 1}});

        let value = deserialize(&json, &m);
        let function = value.get("cb");
        let function = function.as_function().expect("cb should be callable");
        match function.call(&Value::Undefined, vec![]) {
            Ok(Completion::Ready(v)) => assert_eq!(v.as_f64(), Some(42.0)),
            _ => panic!("expected ready value"),
        }
    }

    #[test]
    fn literal_proxy_function_id_is_never_copied() {
        let m = Recorder::default();
        let value = Value::from_pairs([("__proxyFunctionId", 5), ("x", 1)]);
        let settings = SerializationSettings::with_underscore_properties();

        assert_eq!(serialize(&value, Some(&settings), &m), serde_json::json!({"x": 1}));
    }

    #[test]
    fn dates_roundtrip() {
        let m = Recorder::default();
        let value = Value::from_pairs([("when", Value::Date(1_700_000_000_123))]);

        let json = serialize(&value, None, &m);
        assert_eq!(json, serde_json::json!({"when": {"__proxyDate": 1_700_000_000_123i64}}));
        assert_eq!(deserialize(&json, &m).get("when").as_date(), Some(1_700_000_000_123));
    }

    #[test]
    fn host_handles_are_not_transferred() {
        let m = Recorder::default();
        let value = Value::from_pairs([
            ("node", Value::Host(frameport_core::HostKind::Node)),
            ("ok", Value::from(true)),
        ]);

        assert_eq!(serialize(&value, None, &m), serde_json::json!({"node": null, "ok": true}));
        assert_eq!(
            serialize(&Value::Host(frameport_core::HostKind::Window), None, &m),
            serde_json::Value::Null
        );
    }

    #[test]
    fn depth_cap_cuts_off_deep_graphs() {
        let m = Recorder::default();
        let root = ObjectRef::new();
        let mut current = root.clone();
        for _ in 0..150 {
            let next = ObjectRef::new();
            current.set("child", next.clone());
            current = next;
        }

        let json = serialize(&Value::Object(root), None, &m);
        let mut depth = 1;
        let mut node = &json;
        while let Some(child) = node.get("child") {
            if child.is_null() {
                break;
            }
            node = child;
            depth += 1;
        }
        assert_eq!(depth, MAX_DEPTH);
        assert_eq!(node["child"], serde_json::Value::Null);
    }

    #[test]
    fn non_finite_numbers_become_null() {
        let m = Recorder::default();
        let value = Value::array(vec![Value::Number(f64::NAN), Value::Number(f64::INFINITY)]);
        assert_eq!(serialize(&value, None, &m), serde_json::json!([null, null]));
    }

    #[test]
    fn unknown_circular_reference_resolves_to_undefined() {
        let m = Recorder::default();
        let json = serde_json::json!({"a": {"__circularReference": 9}});
        assert!(matches!(deserialize(&json, &m).get("a"), Value::Undefined));
    }

    #[test]
    fn deserialize_item_unwraps_single_values() {
        let m = Recorder::default();
        let value = deserialize_item(&serde_json::json!({"message": "bad"}), &m);
        assert_eq!(value.error_message().as_deref(), Some("bad"));
        assert_eq!(deserialize_item(&serde_json::json!(5), &m).as_f64(), Some(5.0));
    }
}
