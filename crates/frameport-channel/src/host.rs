//! Connection from an embedded frame to its host.
//!
//! The frame opens a dedicated channel to its parent context and performs a
//! one-time `initialHandshake` call against the host-control object. The
//! host's reply (its capabilities and context) is exposed as a promise.

use frameport_core::{Outcome, Promise, Value};
use frameport_registry::Registered;
use frameport_transport::MessageSink;
use frameport_wire::SerializationSettings;

use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::context::RpcContext;
use crate::manager::ChannelManager;

/// Instance id of the host-side object answering the initial handshake.
pub const HOST_CONTROL_INSTANCE_ID: &str = "VSS.HostControl";

/// Method invoked on [`HOST_CONTROL_INSTANCE_ID`] when connecting.
pub const INITIAL_HANDSHAKE_METHOD: &str = "initialHandshake";

/// A frame's connection to its host context.
#[derive(Clone, Debug)]
pub struct HostConnection {
    context: RpcContext,
    channel: Channel,
    handshake: Promise,
}

impl HostConnection {
    /// Open the parent channel through `manager` and send the initial
    /// handshake carrying `handshake_data`.
    pub fn connect(
        manager: &ChannelManager,
        parent: impl MessageSink + 'static,
        config: ChannelConfig,
        handshake_data: Value,
    ) -> Self {
        let channel = manager.add_channel_with_config(parent, config);
        tracing::debug!(channel = channel.id(), "sending initial handshake to host");
        let handshake = channel.invoke_remote_method(
            INITIAL_HANDSHAKE_METHOD,
            HOST_CONTROL_INSTANCE_ID,
            vec![handshake_data],
            None,
            None,
        );
        Self {
            context: manager.context().clone(),
            channel,
            handshake,
        }
    }

    /// Settles with the host's handshake reply.
    pub fn handshake(&self) -> &Promise {
        &self.handshake
    }

    /// The dedicated channel to the parent context.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Expose an object to every channel through the global registry.
    pub fn register(&self, instance_id: impl Into<String>, entry: impl Into<Registered>) {
        self.context.global_registry().register(instance_id, entry);
    }

    pub fn unregister(&self, instance_id: &str) -> bool {
        self.context.global_registry().unregister(instance_id)
    }

    /// Resolve a globally registered object the way a remote call would.
    pub fn get_registered_object(&self, instance_id: &str, context_data: &Value) -> Option<Outcome> {
        self.context
            .global_registry()
            .get_instance(instance_id, context_data)
    }

    /// Invoke a method on a host object over the parent channel.
    pub fn invoke_remote_method(
        &self,
        method_name: &str,
        instance_id: &str,
        params: Vec<Value>,
        instance_context: Option<&Value>,
        serialization_settings: Option<SerializationSettings>,
    ) -> Promise {
        self.channel.invoke_remote_method(
            method_name,
            instance_id,
            params,
            instance_context,
            serialization_settings,
        )
    }

    pub fn get_remote_object_proxy(&self, instance_id: &str, context_data: Option<&Value>) -> Promise {
        self.channel.get_remote_object_proxy(instance_id, context_data)
    }
}
