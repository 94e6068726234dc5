use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use frameport_core::Value;
use frameport_transport::{MessageEvent, MessageSink, MessageSource};
use frameport_wire::{decode_message, InboundMessage};
#[cfg(feature = "schema")]
use frameport_wire::{decode_value, EnvelopeValidator};

use crate::channel::Channel;
use crate::config::ChannelConfig;
use crate::context::RpcContext;
use crate::error::Result;

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Not a text payload; not RPC traffic.
    Ignored,
    /// No channel owns the message.
    Unclaimed,
    /// At least one owning channel handled the message.
    Handled,
    /// Owned but not handled: an unknown instance or a stale response.
    Unhandled,
}

struct ManagerInner {
    context: RpcContext,
    channels: RefCell<Vec<Channel>>,
    #[cfg(feature = "schema")]
    validator: Option<EnvelopeValidator>,
}

/// Routes inbound messages of the local context to the channels that own
/// them.
///
/// Subscribe the manager to the local context's message source once. The
/// subscription holds the manager weakly; keep a handle alive for as long
/// as messages should be routed.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Rc<ManagerInner>,
}

impl ChannelManager {
    pub fn new(context: &RpcContext) -> Self {
        Self {
            inner: Rc::new(ManagerInner {
                context: context.clone(),
                channels: RefCell::new(Vec::new()),
                #[cfg(feature = "schema")]
                validator: None,
            }),
        }
    }

    /// Manager that drops payloads failing envelope validation.
    #[cfg(feature = "schema")]
    pub fn with_envelope_validation(context: &RpcContext) -> Result<Self> {
        Ok(Self {
            inner: Rc::new(ManagerInner {
                context: context.clone(),
                channels: RefCell::new(Vec::new()),
                validator: Some(EnvelopeValidator::new()?),
            }),
        })
    }

    pub fn context(&self) -> &RpcContext {
        &self.inner.context
    }

    /// Route every message delivered to `source` through this manager.
    pub fn subscribe(&self, source: &dyn MessageSource) {
        let manager: Weak<ManagerInner> = Rc::downgrade(&self.inner);
        source.add_message_listener(Rc::new(move |event: &MessageEvent| {
            let Some(inner) = manager.upgrade() else {
                return;
            };
            if let Err(err) = (ChannelManager { inner }).handle_message(event) {
                tracing::debug!(source = %event.source, error = %err, "ignoring malformed message");
            }
        }));
    }

    /// Add a channel to a remote context whose origin may be known.
    pub fn add_channel(&self, sink: impl MessageSink + 'static, target_origin: Option<&str>) -> Channel {
        let config = ChannelConfig {
            target_origin: target_origin.map(str::to_string),
            handshake_token: None,
        };
        self.add_channel_with_config(sink, config)
    }

    pub fn add_channel_with_config(&self, sink: impl MessageSink + 'static, config: ChannelConfig) -> Channel {
        let channel = Channel::new(&self.inner.context, sink, config);
        self.inner.channels.borrow_mut().push(channel.clone());
        channel
    }

    /// The first channel posting to `sink`'s context, or a new unbound one.
    pub fn channel_for(&self, sink: impl MessageSink + 'static) -> Channel {
        let target = sink.context_id();
        let existing = self
            .inner
            .channels
            .borrow()
            .iter()
            .find(|channel| channel.context_id() == target)
            .cloned();
        match existing {
            Some(channel) => channel,
            None => self.add_channel_with_config(sink, ChannelConfig::default()),
        }
    }

    /// Stop routing to `channel`. Returns whether it was present.
    pub fn remove_channel(&self, channel: &Channel) -> bool {
        let mut channels = self.inner.channels.borrow_mut();
        let before = channels.len();
        channels.retain(|c| !c.ptr_eq(channel));
        let removed = channels.len() != before;
        if removed {
            tracing::debug!(channel = channel.id(), "removed channel");
        }
        removed
    }

    /// Snapshot of the routed channels, in creation order.
    pub fn channels(&self) -> Vec<Channel> {
        self.inner.channels.borrow().clone()
    }

    /// Route one inbound event.
    ///
    /// Every channel is offered the message and each owner processes it.
    /// When owners exist but none handled a request, the first owner
    /// answers it with an error so the caller does not wait forever.
    pub fn handle_message(&self, event: &MessageEvent) -> Result<Dispatch> {
        let Some(text) = event.data.as_text() else {
            return Ok(Dispatch::Ignored);
        };
        let message = self.decode(text)?;

        // Handlers may add or remove channels while we iterate.
        let channels = self.channels();
        let mut owner: Option<Channel> = None;
        let mut handled = false;
        for channel in &channels {
            if channel.owns(event.source, &event.origin, &message) {
                if owner.is_none() {
                    owner = Some(channel.clone());
                }
                handled = channel.on_message(&message, &event.origin) || handled;
            }
        }

        let Some(owner) = owner else {
            tracing::debug!(source = %event.source, origin = %event.origin, id = message.id(), "no channel owns message");
            return Ok(Dispatch::Unclaimed);
        };
        if handled {
            return Ok(Dispatch::Handled);
        }

        tracing::error!(message = ?message, "No handler found on any channel for message");
        if let InboundMessage::Request(request) = &message {
            let reason = Value::from(format!(
                "The registered object {} could not be found.",
                request.instance_id
            ));
            owner.error(request, &reason);
        }
        Ok(Dispatch::Unhandled)
    }

    #[cfg(not(feature = "schema"))]
    fn decode(&self, text: &str) -> Result<InboundMessage> {
        Ok(decode_message(text)?)
    }

    #[cfg(feature = "schema")]
    fn decode(&self, text: &str) -> Result<InboundMessage> {
        match &self.inner.validator {
            Some(validator) => Ok(decode_value(validator.validate_text(text)?)?),
            None => Ok(decode_message(text)?),
        }
    }
}

impl fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("channels", &self.inner.channels.borrow().len())
            .finish()
    }
}
