use frameport_core::EventLoop;
use frameport_registry::ObjectRegistry;

/// Process-wide RPC state: the event loop every channel schedules on and
/// the global object registry consulted after a channel's own registry.
///
/// Create one at startup and pass it to the [`crate::ChannelManager`].
/// Clones share the same loop and registry.
#[derive(Clone, Debug)]
pub struct RpcContext {
    event_loop: EventLoop,
    global_registry: ObjectRegistry,
}

impl RpcContext {
    /// Context with a fresh event loop.
    pub fn init() -> Self {
        Self::with_event_loop(&EventLoop::new())
    }

    /// Context scheduling on an existing event loop, typically the one the
    /// transport delivers on.
    pub fn with_event_loop(event_loop: &EventLoop) -> Self {
        Self {
            event_loop: event_loop.clone(),
            global_registry: ObjectRegistry::new(),
        }
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    pub fn global_registry(&self) -> &ObjectRegistry {
        &self.global_registry
    }
}
