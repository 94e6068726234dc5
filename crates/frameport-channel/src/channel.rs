use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use frameport_core::{Completion, Deferred, Function, ObjectRef, Outcome, Promise, Value};
use frameport_registry::ObjectRegistry;
use frameport_transport::{ContextId, MessageSink};
use frameport_wire::{
    deserialize, deserialize_item, encode_message, serialize, serialize_item, FunctionMarshaler,
    InboundMessage, RpcRequest, RpcResponse, SerializationSettings, PROTOCOL_VERSION,
    PROXY_FUNCTIONS_INSTANCE_ID,
};
use serde::Serialize;

use crate::config::ChannelConfig;
use crate::context::RpcContext;
use crate::error::Result;
use crate::handshake::OriginBinding;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

struct ChannelInner {
    id: u64,
    context: RpcContext,
    sink: Box<dyn MessageSink>,
    binding: RefCell<OriginBinding>,
    next_message_id: Cell<u64>,
    pending: RefCell<HashMap<u64, Deferred>>,
    next_proxy_function_id: Cell<u64>,
    proxy_functions: ObjectRef,
    registry: ObjectRegistry,
}

/// One RPC connection to a remote browsing context.
///
/// Cloning yields another handle to the same channel.
#[derive(Clone)]
pub struct Channel {
    inner: Rc<ChannelInner>,
}

impl Channel {
    /// Create a channel posting to `sink`.
    ///
    /// Channels normally come from [`crate::ChannelManager::add_channel`],
    /// which also routes inbound messages to them.
    pub fn new(context: &RpcContext, sink: impl MessageSink + 'static, config: ChannelConfig) -> Self {
        let id = NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed);
        let binding = OriginBinding::new(config.target_origin, config.handshake_token);
        tracing::debug!(
            channel = id,
            target_context = %sink.context_id(),
            bound = binding.is_bound(),
            "created channel"
        );
        Self {
            inner: Rc::new(ChannelInner {
                id,
                context: context.clone(),
                sink: Box::new(sink),
                binding: RefCell::new(binding),
                next_message_id: Cell::new(1),
                pending: RefCell::new(HashMap::new()),
                next_proxy_function_id: Cell::new(1),
                proxy_functions: ObjectRef::new(),
                registry: ObjectRegistry::new(),
            }),
        }
    }

    /// Process-unique channel id, carried in proxy-function markers.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Identity of the remote context this channel posts to.
    pub fn context_id(&self) -> ContextId {
        self.inner.sink.context_id()
    }

    pub fn target_origin(&self) -> Option<String> {
        self.inner.binding.borrow().target_origin().map(str::to_string)
    }

    pub fn is_bound(&self) -> bool {
        self.inner.binding.borrow().is_bound()
    }

    /// Objects exposed to the remote side on this channel only. Consulted
    /// before the global registry.
    pub fn object_registry(&self) -> &ObjectRegistry {
        &self.inner.registry
    }

    /// Number of calls still awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// Number of local functions ever handed to the remote side.
    pub fn proxy_function_count(&self) -> usize {
        self.inner.proxy_functions.len()
    }

    pub fn ptr_eq(&self, other: &Channel) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Invoke `method_name` on the object registered as `instance_id` on the
    /// remote side.
    ///
    /// `instance_context` is handed to a remote factory as plain data. The
    /// returned promise settles with the remote result or error, and stays
    /// pending if no response ever arrives.
    pub fn invoke_remote_method(
        &self,
        method_name: &str,
        instance_id: &str,
        params: Vec<Value>,
        instance_context: Option<&Value>,
        serialization_settings: Option<SerializationSettings>,
    ) -> Promise {
        self.send_request(
            Some(method_name),
            instance_id,
            Some(Value::array(params)),
            instance_context,
            serialization_settings,
        )
    }

    /// Fetch a copy of the remote object registered as `instance_id`.
    ///
    /// Functions on the copy call back into the remote original.
    pub fn get_remote_object_proxy(&self, instance_id: &str, context_data: Option<&Value>) -> Promise {
        self.send_request(None, instance_id, None, context_data, None)
    }

    fn send_request(
        &self,
        method_name: Option<&str>,
        instance_id: &str,
        params: Option<Value>,
        instance_context: Option<&Value>,
        serialization_settings: Option<SerializationSettings>,
    ) -> Promise {
        let id = self.inner.next_message_id.get();
        self.inner.next_message_id.set(id + 1);

        let marshaler = self.marshaler();
        let params = params.map(|params| {
            serialize(&params, serialization_settings.as_ref(), &marshaler)
        });
        let handshake_token = self
            .inner
            .binding
            .borrow()
            .outbound_token()
            .map(str::to_string);

        let request = RpcRequest {
            id,
            method_name: method_name.map(str::to_string),
            instance_id: instance_id.to_string(),
            instance_context: instance_context
                .filter(|context| !context.is_nullish())
                .map(Value::to_plain_json),
            params,
            protocol_version: PROTOCOL_VERSION.to_string(),
            handshake_token,
            serialization_settings,
        };

        let event_loop = self.inner.context.event_loop();
        let deferred = Deferred::new(event_loop);
        self.inner.pending.borrow_mut().insert(id, deferred.clone());

        if let Err(err) = self.post(&request) {
            self.inner.pending.borrow_mut().remove(&id);
            tracing::warn!(
                channel = self.inner.id,
                id,
                instance_id = %instance_id,
                error = %err,
                "failed to send request"
            );
            return Promise::rejected(event_loop, Value::error(err.to_string()));
        }
        tracing::debug!(
            channel = self.inner.id,
            id,
            instance_id = %instance_id,
            method = method_name.unwrap_or("<instance>"),
            "sent request"
        );
        deferred.promise()
    }

    /// Whether a message from `source` at `origin` belongs to this channel.
    ///
    /// An unbound channel binds to `origin` when the message carries its
    /// handshake token.
    pub fn owns(&self, source: ContextId, origin: &str, message: &InboundMessage) -> bool {
        if source != self.inner.sink.context_id() {
            return false;
        }
        self.inner
            .binding
            .borrow_mut()
            .accepts(origin, message.handshake_token())
    }

    /// Process an owned message. Returns whether this channel handled it.
    ///
    /// A request is handled when its instance resolves here; a response when
    /// it matches a pending call.
    pub fn on_message(&self, message: &InboundMessage, origin: &str) -> bool {
        match message {
            InboundMessage::Request(request) => self.on_request(request, origin),
            InboundMessage::Response(response) => self.on_response(response),
        }
    }

    /// Answer `request` with an error carrying `reason`.
    pub fn error(&self, request: &RpcRequest, reason: &Value) {
        self.send_error(request, reason);
    }

    fn on_request(&self, request: &RpcRequest, origin: &str) -> bool {
        let context_data = request
            .instance_context
            .as_ref()
            .map(Value::from_plain_json)
            .unwrap_or_default();

        let Some(target) = self.registered_object(&request.instance_id, &context_data) else {
            tracing::debug!(
                channel = self.inner.id,
                instance_id = %request.instance_id,
                "no registered object on this channel"
            );
            return false;
        };
        tracing::debug!(
            channel = self.inner.id,
            id = request.id,
            origin = %origin,
            instance_id = %request.instance_id,
            "dispatching request"
        );

        match target {
            Ok(Completion::Ready(instance)) => self.invoke_method(&instance, request),
            Ok(Completion::Pending(promise)) => {
                let on_instance = (self.clone(), request.clone());
                let on_failure = (self.clone(), request.clone());
                promise.then(
                    move |instance| {
                        let (channel, request) = on_instance;
                        channel.invoke_method(&instance, &request);
                        Ok(Completion::Ready(Value::Undefined))
                    },
                    move |reason| {
                        let (channel, request) = on_failure;
                        channel.send_error(&request, &reason);
                        Ok(Completion::Ready(Value::Undefined))
                    },
                );
            }
            Err(reason) => self.send_error(request, &reason),
        }
        true
    }

    fn on_response(&self, response: &RpcResponse) -> bool {
        let Some(deferred) = self.inner.pending.borrow_mut().remove(&response.id) else {
            return false;
        };

        let marshaler = self.marshaler();
        if response.is_error() {
            let reason = response
                .error
                .as_ref()
                .map(|error| deserialize_item(error, &marshaler))
                .unwrap_or_default();
            tracing::debug!(channel = self.inner.id, id = response.id, "call rejected by remote");
            deferred.reject(reason);
        } else {
            let value = response
                .result
                .as_ref()
                .map(|result| deserialize_item(result, &marshaler))
                .unwrap_or_default();
            deferred.resolve(value);
        }
        true
    }

    fn registered_object(&self, instance_id: &str, context_data: &Value) -> Option<Outcome> {
        if instance_id == PROXY_FUNCTIONS_INSTANCE_ID {
            let table = Value::Object(self.inner.proxy_functions.clone());
            return Some(Ok(Completion::Ready(table)));
        }
        // Factories run user code; a panic answers the request like a failure.
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.inner
                .registry
                .get_instance(instance_id, context_data)
                .or_else(|| {
                    self.inner
                        .context
                        .global_registry()
                        .get_instance(instance_id, context_data)
                })
        }))
        .unwrap_or_else(|payload| Some(Err(Value::error(panic_message(payload.as_ref())))))
    }

    fn invoke_method(&self, instance: &Value, request: &RpcRequest) {
        let method_name = match request.method_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => {
                self.send_success(request, instance);
                return;
            }
        };

        let Some(method) = instance.get(method_name).as_function().cloned() else {
            let reason = Value::error(format!("RPC method not found: {method_name}"));
            self.send_error(request, &reason);
            return;
        };

        let args = match &request.params {
            Some(params) => match deserialize(params, &self.marshaler()) {
                Value::Array(args) => args.to_vec(),
                _ => Vec::new(),
            },
            None => Vec::new(),
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| method.call(instance, args)))
            .unwrap_or_else(|payload| Err(Value::error(panic_message(payload.as_ref()))));

        match outcome {
            Ok(Completion::Ready(value)) => self.send_success(request, &value),
            Ok(Completion::Pending(promise)) => {
                let on_value = (self.clone(), request.clone());
                let on_reason = (self.clone(), request.clone());
                promise.then(
                    move |value| {
                        let (channel, request) = on_value;
                        channel.send_success(&request, &value);
                        Ok(Completion::Ready(Value::Undefined))
                    },
                    move |reason| {
                        let (channel, request) = on_reason;
                        channel.send_error(&request, &reason);
                        Ok(Completion::Ready(Value::Undefined))
                    },
                );
            }
            Err(reason) => self.send_error(request, &reason),
        }
    }

    fn send_success(&self, request: &RpcRequest, result: &Value) {
        let result = serialize_item(result, request.serialization_settings.as_ref(), &self.marshaler());
        self.send_response(RpcResponse::success(request, result));
    }

    fn send_error(&self, request: &RpcRequest, reason: &Value) {
        let error = serialize_item(reason, request.serialization_settings.as_ref(), &self.marshaler());
        self.send_response(RpcResponse::failure(request, error));
    }

    fn send_response(&self, response: RpcResponse) {
        if let Err(err) = self.post(&response) {
            tracing::warn!(
                channel = self.inner.id,
                id = response.id,
                error = %err,
                "failed to send response"
            );
        }
    }

    fn post<T: Serialize>(&self, message: &T) -> Result<()> {
        let text = encode_message(message)?;
        self.inner.sink.post_message(text.into())?;
        Ok(())
    }

    fn marshaler(&self) -> ProxyMarshaler<'_> {
        ProxyMarshaler { channel: self }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("context", &self.inner.sink.context_id())
            .field("binding", &*self.inner.binding.borrow())
            .field("pending_calls", &self.pending_calls())
            .field("proxy_functions", &self.proxy_function_count())
            .finish()
    }
}

/// Hands local functions to the proxy table and turns remote proxy ids
/// back into callables.
struct ProxyMarshaler<'a> {
    channel: &'a Channel,
}

impl FunctionMarshaler for ProxyMarshaler<'_> {
    fn channel_id(&self) -> u64 {
        self.channel.inner.id
    }

    fn register_proxy_function(&self, function: &Function, receiver: &Value) -> u64 {
        let inner = &self.channel.inner;
        let proxy_id = inner.next_proxy_function_id.get();
        inner.next_proxy_function_id.set(proxy_id + 1);

        let function = function.clone();
        let receiver = receiver.clone();
        let bound = Function::new(move |_, args| function.call(&receiver, args));
        inner
            .proxy_functions
            .set(format!("proxy{proxy_id}"), Value::Function(bound));
        proxy_id
    }

    fn remote_function(&self, proxy_id: u64) -> Function {
        let channel: Weak<ChannelInner> = Rc::downgrade(&self.channel.inner);
        Function::new(move |_, args| {
            let Some(inner) = channel.upgrade() else {
                return Err(Value::error("RPC channel has been dropped"));
            };
            let promise = Channel { inner }.invoke_remote_method(
                &format!("proxy{proxy_id}"),
                PROXY_FUNCTIONS_INSTANCE_ID,
                args,
                None,
                Some(SerializationSettings::with_underscore_properties()),
            );
            Ok(Completion::Pending(promise))
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use frameport_core::{EventLoop, Settlement};
    use frameport_transport::{MessagePayload, TransportError};

    use super::*;

    /// Records posted payloads instead of delivering them.
    #[derive(Clone, Default)]
    struct Outbox {
        sent: Rc<RefCell<Vec<String>>>,
        detached: Rc<Cell<bool>>,
    }

    impl Outbox {
        fn take(&self) -> Vec<serde_json::Value> {
            self.sent
                .borrow_mut()
                .drain(..)
                .map(|text| serde_json::from_str(&text).unwrap())
                .collect()
        }
    }

    impl MessageSink for Outbox {
        fn context_id(&self) -> ContextId {
            ContextId(900)
        }

        fn post_message(&self, payload: MessagePayload) -> frameport_transport::Result<()> {
            if self.detached.get() {
                return Err(TransportError::Detached(ContextId(900)));
            }
            let text = payload.as_text().unwrap().to_string();
            self.sent.borrow_mut().push(text);
            Ok(())
        }
    }

    fn channel(config: ChannelConfig) -> (RpcContext, Channel, Outbox) {
        let context = RpcContext::init();
        let outbox = Outbox::default();
        let channel = Channel::new(&context, outbox.clone(), config);
        (context, channel, outbox)
    }

    fn decode(json: serde_json::Value) -> InboundMessage {
        frameport_wire::decode_value(json).unwrap()
    }

    fn calculator() -> Value {
        Value::from_pairs([(
            "add",
            Value::function(|_, args| {
                let sum: f64 = args.iter().filter_map(Value::as_f64).sum();
                Ok(Completion::Ready(Value::from(sum)))
            }),
        )])
    }

    #[test]
    fn ids_increase_and_token_is_stamped_while_unbound() {
        let (_ctx, channel, outbox) = channel(ChannelConfig::with_handshake_token("tok"));

        channel.invoke_remote_method("a", "obj", vec![], None, None);
        channel.invoke_remote_method("b", "obj", vec![Value::from(1)], None, None);

        let sent = outbox.take();
        assert_eq!(sent[0]["id"], 1);
        assert_eq!(sent[1]["id"], 2);
        assert_eq!(sent[0]["handshakeToken"], "tok");
        assert_eq!(sent[1]["params"], serde_json::json!([1]));
        assert_eq!(sent[0]["protocolVersion"], "2.0");
        assert_eq!(channel.pending_calls(), 2);
    }

    #[test]
    fn bound_channel_sends_no_token() {
        let (_ctx, channel, outbox) = channel(ChannelConfig::with_target_origin("https://host.example"));
        channel.get_remote_object_proxy("obj", Some(&Value::from_pairs([("scope", "user")])));

        let sent = outbox.take();
        assert!(sent[0].get("handshakeToken").is_none());
        assert_eq!(sent[0]["methodName"], serde_json::Value::Null);
        assert_eq!(sent[0]["instanceContext"], serde_json::json!({"scope": "user"}));
        assert!(sent[0].get("params").is_none());
    }

    #[test]
    fn reversed_responses_settle_the_matching_calls() {
        let (ctx, channel, _outbox) = channel(ChannelConfig::default());
        let first = channel.invoke_remote_method("m", "obj", vec![], None, None);
        let second = channel.invoke_remote_method("m", "obj", vec![], None, None);

        assert!(channel.on_message(&decode(serde_json::json!({"id": 2, "result": "two"})), "x"));
        assert!(channel.on_message(&decode(serde_json::json!({"id": 1, "result": "one"})), "x"));
        ctx.event_loop().run_until_idle();

        assert_eq!(first.value().unwrap().as_str(), Some("one"));
        assert_eq!(second.value().unwrap().as_str(), Some("two"));
        assert_eq!(channel.pending_calls(), 0);
    }

    #[test]
    fn unknown_or_repeated_response_is_not_handled() {
        let (_ctx, channel, _outbox) = channel(ChannelConfig::default());
        channel.invoke_remote_method("m", "obj", vec![], None, None);

        let response = decode(serde_json::json!({"id": 1, "result": 5}));
        assert!(channel.on_message(&response, "x"));
        assert!(!channel.on_message(&response, "x"));
        assert!(!channel.on_message(&decode(serde_json::json!({"id": 77})), "x"));
    }

    #[test]
    fn error_response_rejects_with_remote_value() {
        let (ctx, channel, _outbox) = channel(ChannelConfig::default());
        let call = channel.invoke_remote_method("m", "obj", vec![], None, None);
        let seen = Rc::new(RefCell::new(None));
        let sink = seen.clone();
        call.catch(move |reason| {
            *sink.borrow_mut() = reason.error_message();
            Ok(Completion::Ready(Value::Undefined))
        });

        channel.on_message(
            &decode(serde_json::json!({"id": 1, "error": {"message": "denied"}})),
            "x",
        );
        ctx.event_loop().run_until_idle();
        assert_eq!(seen.borrow().as_deref(), Some("denied"));
    }

    #[test]
    fn requests_invoke_registered_methods() {
        let (_ctx, channel, outbox) = channel(ChannelConfig::default());
        channel.object_registry().register("calc", calculator());

        let request = decode(serde_json::json!({
            "id": 4, "methodName": "add", "instanceId": "calc",
            "params": [2, 3], "handshakeToken": "t"
        }));
        assert!(channel.on_message(&request, "https://ext.example"));

        let sent = outbox.take();
        assert_eq!(sent[0], serde_json::json!({
            "id": 4, "result": 5, "protocolVersion": "2.0", "handshakeToken": "t"
        }));
    }

    #[test]
    fn channel_registry_shadows_global_registry() {
        let (ctx, channel, outbox) = channel(ChannelConfig::default());
        ctx.global_registry().register("svc", Value::from("global"));
        ctx.global_registry().register("only-global", Value::from("g"));
        channel.object_registry().register("svc", Value::from("local"));

        channel.on_message(&decode(serde_json::json!({"id": 1, "methodName": null, "instanceId": "svc"})), "o");
        channel.on_message(&decode(serde_json::json!({"id": 2, "methodName": null, "instanceId": "only-global"})), "o");

        let sent = outbox.take();
        assert_eq!(sent[0]["result"], "local");
        assert_eq!(sent[1]["result"], "g");
    }

    #[test]
    fn unregistered_instance_is_not_handled_and_not_answered() {
        let (_ctx, channel, outbox) = channel(ChannelConfig::default());
        let request = decode(serde_json::json!({"id": 1, "methodName": "x", "instanceId": "ghost"}));
        assert!(!channel.on_message(&request, "o"));
        assert!(outbox.take().is_empty());
    }

    #[test]
    fn missing_method_answers_method_not_found() {
        let (_ctx, channel, outbox) = channel(ChannelConfig::default());
        channel.object_registry().register("calc", calculator());
        channel.on_message(
            &decode(serde_json::json!({"id": 1, "methodName": "divide", "instanceId": "calc"})),
            "o",
        );

        let sent = outbox.take();
        assert_eq!(sent[0]["error"]["message"], "RPC method not found: divide");
        assert!(sent[0].get("result").is_none());
    }

    #[test]
    fn failing_and_panicking_methods_answer_errors() {
        let (_ctx, channel, outbox) = channel(ChannelConfig::default());
        channel.object_registry().register(
            "svc",
            Value::from_pairs([
                ("fail", Value::function(|_, _| Err(Value::error("bad input")))),
                ("explode", Value::function(|_, _| panic!("kaboom"))),
            ]),
        );

        channel.on_message(&decode(serde_json::json!({"id": 1, "methodName": "fail", "instanceId": "svc"})), "o");
        channel.on_message(&decode(serde_json::json!({"id": 2, "methodName": "explode", "instanceId": "svc"})), "o");

        let sent = outbox.take();
        assert_eq!(sent[0]["error"]["message"], "bad input");
        assert_eq!(sent[1]["error"]["message"], "kaboom");
    }

    #[test]
    fn panicking_factory_answers_error() {
        let (_ctx, channel, outbox) = channel(ChannelConfig::default());
        channel.object_registry().register(
            "fragile",
            frameport_registry::Registered::factory(|_| panic!("factory exploded")),
        );

        let handled = channel.on_message(
            &decode(serde_json::json!({"id": 4, "methodName": "add", "instanceId": "fragile"})),
            "o",
        );

        assert!(handled);
        let sent = outbox.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["id"], 4);
        assert_eq!(sent[0]["error"]["message"], "factory exploded");
    }

    #[test]
    fn promised_results_are_awaited() {
        let (ctx, channel, outbox) = channel(ChannelConfig::default());
        let deferred = Deferred::new(ctx.event_loop());
        let promise = deferred.promise();
        channel.object_registry().register(
            "svc",
            Value::from_pairs([(
                "later",
                Value::function(move |_, _| Ok(Completion::Pending(promise.clone()))),
            )]),
        );

        channel.on_message(&decode(serde_json::json!({"id": 1, "methodName": "later", "instanceId": "svc"})), "o");
        assert!(outbox.take().is_empty());

        deferred.resolve(Value::from("done"));
        ctx.event_loop().run_until_idle();
        assert_eq!(outbox.take()[0]["result"], "done");
    }

    #[test]
    fn promised_instances_are_awaited_and_rejections_answered() {
        let (ctx, channel, outbox) = channel(ChannelConfig::default());
        let event_loop = ctx.event_loop().clone();
        channel.object_registry().register(
            "lazy",
            frameport_registry::Registered::factory(move |_| {
                Ok(Completion::Pending(Promise::resolved(&event_loop, calculator())))
            }),
        );
        let failing_loop = ctx.event_loop().clone();
        channel.object_registry().register(
            "broken",
            frameport_registry::Registered::factory(move |_| {
                let deferred = Deferred::new(&failing_loop);
                deferred.reject(Value::error("no instance"));
                Ok(Completion::Pending(deferred.promise()))
            }),
        );

        channel.on_message(&decode(serde_json::json!({"id": 1, "methodName": "add", "instanceId": "lazy", "params": [1, 1]})), "o");
        channel.on_message(&decode(serde_json::json!({"id": 2, "methodName": "add", "instanceId": "broken"})), "o");
        ctx.event_loop().run_until_idle();

        let sent = outbox.take();
        assert_eq!(sent.len(), 2);
        let by_id = |id: u64| sent.iter().find(|m| m["id"] == id).unwrap().clone();
        assert_eq!(by_id(1)["result"], 2);
        assert_eq!(by_id(2)["error"]["message"], "no instance");
    }

    #[test]
    fn functions_cross_as_proxies_and_call_back_with_their_receiver() {
        let (_ctx, channel, outbox) = channel(ChannelConfig::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let listener = Value::from_pairs([("name", Value::from("listener"))]);
        listener.as_object().unwrap().set(
            "notify",
            Value::function(move |this, args| {
                sink.borrow_mut().push((this.get("name"), args));
                Ok(Completion::Ready(Value::from("ack")))
            }),
        );

        channel.invoke_remote_method("subscribe", "events", vec![listener], None, None);
        let sent = outbox.take();
        assert_eq!(
            sent[0]["params"][0]["notify"],
            serde_json::json!({"__proxyFunctionId": 1, "__channelId": channel.id()})
        );
        assert_eq!(channel.proxy_function_count(), 1);

        // The remote side calls the proxy back.
        channel.on_message(
            &decode(serde_json::json!({
                "id": 10, "methodName": "proxy1", "instanceId": "__proxyFunctions",
                "params": ["hello"], "serializationSettings": {"includeUnderscoreProperties": true}
            })),
            "o",
        );

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_str(), Some("listener"));
        assert_eq!(seen[0].1[0].as_str(), Some("hello"));
        assert_eq!(outbox.take()[0]["result"], "ack");
    }

    #[test]
    fn received_proxies_invoke_the_remote_proxy_table() {
        let (_ctx, channel, outbox) = channel(ChannelConfig::with_target_origin("https://h.example"));
        let call = channel.invoke_remote_method("get", "svc", vec![], None, None);
        outbox.take();

        channel.on_message(
            &decode(serde_json::json!({"id": 1, "result": {"__proxyFunctionId": 3, "__channelId": 8}})),
            "https://h.example",
        );
        channel.inner.context.event_loop().run_until_idle();

        let remote = call.value().unwrap();
        let remote = remote.as_function().expect("result should be callable");
        let outcome = remote.call(&Value::Undefined, vec![Value::from("arg")]);
        assert!(matches!(outcome, Ok(Completion::Pending(_))));

        let sent = outbox.take();
        assert_eq!(sent[0]["methodName"], "proxy3");
        assert_eq!(sent[0]["instanceId"], "__proxyFunctions");
        assert_eq!(sent[0]["params"], serde_json::json!(["arg"]));
        assert_eq!(
            sent[0]["serializationSettings"],
            serde_json::json!({"includeUnderscoreProperties": true})
        );
    }

    #[test]
    fn detached_transport_rejects_the_call() {
        let (ctx, channel, outbox) = channel(ChannelConfig::default());
        outbox.detached.set(true);

        let call = channel.invoke_remote_method("m", "obj", vec![], None, None);
        ctx.event_loop().run_until_idle();

        match call.settlement() {
            Settlement::Rejected(reason) => {
                assert!(reason.error_message().unwrap().contains("detached"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(channel.pending_calls(), 0);
    }

    #[test]
    fn owns_checks_source_then_binding() {
        let (_ctx, channel, _outbox) = channel(ChannelConfig::with_handshake_token("tok"));
        let with_token = decode(serde_json::json!({"id": 1, "handshakeToken": "tok"}));
        let without = decode(serde_json::json!({"id": 1}));

        assert!(!channel.owns(ContextId(1), "https://a.example", &with_token));
        assert!(!channel.owns(ContextId(900), "https://a.example", &without));
        assert!(channel.owns(ContextId(900), "https://a.example", &with_token));
        assert_eq!(channel.target_origin().as_deref(), Some("https://a.example"));
        assert!(!channel.owns(ContextId(900), "https://b.example", &with_token));
    }

    #[test]
    fn debug_output_redacts_token() {
        let (_ctx, channel, _outbox) = channel(ChannelConfig::with_handshake_token("very-secret"));
        let rendered = format!("{channel:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("<redacted:11 bytes>"));
    }
}
