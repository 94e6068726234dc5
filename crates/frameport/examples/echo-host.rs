//! Minimal host/frame pair: the frame calls an echo service on the host and
//! passes a callback that the host invokes before replying.
//!
//! Run with:
//!   cargo run --example echo-host

use frameport::core::{Completion, ObjectRef};
use frameport::{BrowsingContext, ChannelManager, EventLoop, RpcContext, Value};

fn main() {
    let event_loop = EventLoop::new();
    let host = BrowsingContext::new(&event_loop, "https://host.example");
    let frame = BrowsingContext::new(&event_loop, "https://frame.example");

    let host_manager = ChannelManager::new(&RpcContext::with_event_loop(&event_loop));
    host_manager.subscribe(&host);
    let host_channel = host_manager.add_channel(host.window_proxy(&frame), Some("https://frame.example"));
    host_channel.object_registry().register(
        "echo",
        Value::from_pairs([(
            "say",
            Value::function(|_, args| {
                let mut args = args.into_iter();
                let text = args.next().unwrap_or_default();
                if let Some(notify) = args.next().and_then(|v| v.as_function().cloned()) {
                    notify.call(&Value::Undefined, vec![text.clone()])?;
                }
                Ok(Completion::Ready(text))
            }),
        )]),
    );

    // The frame does not know the host's origin up front.
    let frame_manager = ChannelManager::new(&RpcContext::with_event_loop(&event_loop));
    frame_manager.subscribe(&frame);
    let frame_channel = frame_manager.add_channel(frame.window_proxy(&host), None);

    let log = ObjectRef::new();
    log.set(
        "notify",
        Value::function(|_, args| {
            let text = args.first().and_then(Value::as_str).unwrap_or("?").to_string();
            eprintln!("frame notified: {text}");
            Ok(Completion::Ready(Value::Undefined))
        }),
    );

    let reply = frame_channel.invoke_remote_method(
        "say",
        "echo",
        vec![Value::from("hello"), Value::Object(log).get("notify")],
        None,
        None,
    );
    let tasks = event_loop.run_until_idle();

    eprintln!("tasks run: {tasks}");
    eprintln!("host replied: {:?}", reply.value());
    eprintln!(
        "frame channel bound to: {}",
        frame_channel.target_origin().as_deref().unwrap_or("unbound")
    );
}
