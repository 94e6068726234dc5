//! In-process browsing contexts.
//!
//! Each [`BrowsingContext`] has an identity and an origin. Posting through a
//! [`WindowProxy`] queues a delivery task on the shared event loop, which
//! hands the message to every listener of the target context with the
//! sender's identity and origin attached.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use frameport_core::EventLoop;

use crate::error::{Result, TransportError};
use crate::traits::{
    ContextId, MessageEvent, MessageListener, MessagePayload, MessageSink, MessageSource,
    SANDBOXED_ORIGIN,
};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

struct ContextInner {
    id: ContextId,
    origin: String,
    event_loop: EventLoop,
    listeners: RefCell<Vec<MessageListener>>,
    closed: Cell<bool>,
}

/// An in-process window or frame.
#[derive(Clone)]
pub struct BrowsingContext {
    inner: Rc<ContextInner>,
}

impl BrowsingContext {
    /// Create a context served from `origin`.
    pub fn new(event_loop: &EventLoop, origin: impl Into<String>) -> Self {
        let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            inner: Rc::new(ContextInner {
                id,
                origin: origin.into(),
                event_loop: event_loop.clone(),
                listeners: RefCell::new(Vec::new()),
                closed: Cell::new(false),
            }),
        }
    }

    /// Create a fully sandboxed context; its messages carry the `"null"` origin.
    pub fn sandboxed(event_loop: &EventLoop) -> Self {
        Self::new(event_loop, SANDBOXED_ORIGIN)
    }

    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.event_loop
    }

    /// Tear the context down. Messages posted to it afterwards are dropped.
    pub fn close(&self) {
        self.inner.closed.set(true);
        self.inner.listeners.borrow_mut().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// Sink for posting from this context to `target`.
    pub fn window_proxy(&self, target: &BrowsingContext) -> WindowProxy {
        WindowProxy {
            sender: self.inner.id,
            sender_origin: self.inner.origin.clone(),
            target_id: target.inner.id,
            target: Rc::downgrade(&target.inner),
        }
    }

    /// Number of subscribed listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }
}

impl MessageSource for BrowsingContext {
    fn add_message_listener(&self, listener: MessageListener) {
        if self.is_closed() {
            return;
        }
        self.inner.listeners.borrow_mut().push(listener);
    }
}

impl fmt::Debug for BrowsingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowsingContext")
            .field("id", &self.inner.id)
            .field("origin", &self.inner.origin)
            .field("closed", &self.inner.closed.get())
            .finish()
    }
}

/// Posting handle for one (sender, target) pair.
#[derive(Clone)]
pub struct WindowProxy {
    sender: ContextId,
    sender_origin: String,
    target_id: ContextId,
    target: Weak<ContextInner>,
}

impl WindowProxy {
    /// Context this proxy posts from.
    pub fn sender(&self) -> ContextId {
        self.sender
    }
}

impl MessageSink for WindowProxy {
    fn context_id(&self) -> ContextId {
        self.target_id
    }

    fn post_message(&self, payload: MessagePayload) -> Result<()> {
        let target = self
            .target
            .upgrade()
            .ok_or(TransportError::Detached(self.target_id))?;

        if target.closed.get() {
            tracing::debug!(target_context = %self.target_id, "dropping message to closed context");
            return Ok(());
        }

        let event = MessageEvent {
            source: self.sender,
            origin: self.sender_origin.clone(),
            data: payload,
        };
        let weak = Rc::downgrade(&target);
        target.event_loop.queue_task(move || {
            let Some(target) = weak.upgrade() else {
                return;
            };
            if target.closed.get() {
                return;
            }
            // Snapshot so listeners may subscribe further listeners.
            let listeners: Vec<MessageListener> = target.listeners.borrow().clone();
            for listener in listeners {
                listener(&event);
            }
        });
        Ok(())
    }
}

impl fmt::Debug for WindowProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowProxy")
            .field("sender", &self.sender)
            .field("target", &self.target_id)
            .finish()
    }
}
