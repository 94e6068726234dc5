//! Single-settlement promises with scheduled continuations.
//!
//! A [`Deferred`] is the producer side, a [`Promise`] the consumer side.
//! Settlement callbacks are queued on the [`EventLoop`] instead of running
//! inside `resolve`/`reject`/`then`, so callers never observe a continuation
//! running on their own stack.

use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;

use crate::event_loop::EventLoop;
use crate::value::Value;

/// Result of a handler, factory or continuation: a value now, a promise of
/// one later, or a failure (`Err`) carrying the thrown value.
pub type Outcome = Result<Completion, Value>;

/// Boxed continuation passed to [`Promise::then_with`].
pub type Continuation = Box<dyn FnOnce(Value) -> Outcome>;

type Callback = Box<dyn FnOnce(Value)>;

/// Either an immediate value or a promise of one.
#[derive(Clone, Debug)]
pub enum Completion {
    Ready(Value),
    Pending(Promise),
}

impl From<Value> for Completion {
    fn from(value: Value) -> Self {
        Completion::Ready(value)
    }
}

impl From<Promise> for Completion {
    fn from(promise: Promise) -> Self {
        Completion::Pending(promise)
    }
}

/// Observable state of a promise.
#[derive(Clone, Debug)]
pub enum Settlement {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

struct State {
    settlement: Settlement,
    fulfill_callbacks: Vec<Callback>,
    reject_callbacks: Vec<Callback>,
}

/// Consumer handle of a single-settlement value.
#[derive(Clone)]
pub struct Promise {
    state: Rc<RefCell<State>>,
    event_loop: EventLoop,
}

/// Producer handle: settles its promise exactly once.
#[derive(Clone)]
pub struct Deferred {
    promise: Promise,
}

impl Deferred {
    /// Create a pending promise whose callbacks run on `event_loop`.
    pub fn new(event_loop: &EventLoop) -> Self {
        Self {
            promise: Promise {
                state: Rc::new(RefCell::new(State {
                    settlement: Settlement::Pending,
                    fulfill_callbacks: Vec::new(),
                    reject_callbacks: Vec::new(),
                })),
                event_loop: event_loop.clone(),
            },
        }
    }

    pub fn promise(&self) -> Promise {
        self.promise.clone()
    }

    /// Fulfil with `value`. No effect once settled.
    pub fn resolve(&self, value: Value) {
        self.promise.fulfill(value);
    }

    /// Reject with `reason`. No effect once settled.
    pub fn reject(&self, reason: Value) {
        self.promise.reject(reason);
    }

    /// Settle from an outcome, adopting the state of a pending promise.
    pub fn settle(&self, outcome: Outcome) {
        match outcome {
            Ok(Completion::Ready(value)) => self.resolve(value),
            Ok(Completion::Pending(inner)) => self.adopt(&inner),
            Err(reason) => self.reject(reason),
        }
    }

    /// Follow `inner`: settle the same way once it settles.
    pub fn adopt(&self, inner: &Promise) {
        let on_value = self.clone();
        let on_reason = self.clone();
        inner.then(
            move |value| {
                on_value.resolve(value);
                Ok(Completion::Ready(Value::Undefined))
            },
            move |reason| {
                on_reason.reject(reason);
                Ok(Completion::Ready(Value::Undefined))
            },
        );
    }
}

impl Promise {
    /// A promise already fulfilled with `value`.
    pub fn resolved(event_loop: &EventLoop, value: Value) -> Self {
        let deferred = Deferred::new(event_loop);
        deferred.resolve(value);
        deferred.promise()
    }

    /// A promise already rejected with `reason`.
    pub fn rejected(event_loop: &EventLoop, reason: Value) -> Self {
        let deferred = Deferred::new(event_loop);
        // Nothing can be listening yet; skip the unhandled-rejection warning.
        deferred.promise.state.borrow_mut().settlement = Settlement::Rejected(reason);
        deferred.promise()
    }

    /// Register both continuations.
    pub fn then<F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise
    where
        F: FnOnce(Value) -> Outcome + 'static,
        R: FnOnce(Value) -> Outcome + 'static,
    {
        self.then_with(Some(Box::new(on_fulfilled)), Some(Box::new(on_rejected)))
    }

    /// Register a fulfilment continuation; rejections pass through.
    pub fn map<F>(&self, on_fulfilled: F) -> Promise
    where
        F: FnOnce(Value) -> Outcome + 'static,
    {
        self.then_with(Some(Box::new(on_fulfilled)), None)
    }

    /// Register a rejection continuation; values pass through.
    pub fn catch<R>(&self, on_rejected: R) -> Promise
    where
        R: FnOnce(Value) -> Outcome + 'static,
    {
        self.then_with(None, Some(Box::new(on_rejected)))
    }

    /// Register optional continuations and return the derived promise.
    ///
    /// Returns `self` when no continuation could ever run: both are absent,
    /// or the promise already settled the other way.
    pub fn then_with(
        &self,
        on_fulfilled: Option<Continuation>,
        on_rejected: Option<Continuation>,
    ) -> Promise {
        {
            let state = self.state.borrow();
            let nothing_to_run = match state.settlement {
                Settlement::Pending => on_fulfilled.is_none() && on_rejected.is_none(),
                Settlement::Fulfilled(_) => on_fulfilled.is_none(),
                Settlement::Rejected(_) => on_rejected.is_none(),
            };
            if nothing_to_run {
                return self.clone();
            }
        }

        let next = Deferred::new(&self.event_loop);
        let fulfil_next = next.clone();
        let reject_next = next.clone();
        {
            let mut state = self.state.borrow_mut();
            state.fulfill_callbacks.push(Box::new(move |value| {
                run_continuation(on_fulfilled, value, &fulfil_next, false);
            }));
            state.reject_callbacks.push(Box::new(move |reason| {
                run_continuation(on_rejected, reason, &reject_next, true);
            }));
        }
        self.dispatch();
        next.promise()
    }

    /// Current settlement snapshot.
    pub fn settlement(&self) -> Settlement {
        self.state.borrow().settlement.clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state.borrow().settlement, Settlement::Pending)
    }

    /// Fulfilled value, if fulfilled.
    pub fn value(&self) -> Option<Value> {
        match &self.state.borrow().settlement {
            Settlement::Fulfilled(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Rejection reason, if rejected.
    pub fn reason(&self) -> Option<Value> {
        match &self.state.borrow().settlement {
            Settlement::Rejected(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    fn fulfill(&self, value: Value) {
        {
            let mut state = self.state.borrow_mut();
            if !matches!(state.settlement, Settlement::Pending) {
                return;
            }
            state.settlement = Settlement::Fulfilled(value);
        }
        self.dispatch();
    }

    fn reject(&self, reason: Value) {
        {
            let mut state = self.state.borrow_mut();
            if !matches!(state.settlement, Settlement::Pending) {
                return;
            }
            if state.reject_callbacks.is_empty() {
                tracing::warn!(reason = ?reason, "rejected promise with no reject callbacks");
            }
            state.settlement = Settlement::Rejected(reason);
        }
        self.dispatch();
    }

    /// Queue every registered callback matching the settlement.
    fn dispatch(&self) {
        let (callbacks, value) = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            match &state.settlement {
                Settlement::Pending => return,
                Settlement::Fulfilled(value) => {
                    if state.fulfill_callbacks.is_empty() {
                        return;
                    }
                    state.reject_callbacks.clear();
                    (mem::take(&mut state.fulfill_callbacks), value.clone())
                }
                Settlement::Rejected(reason) => {
                    if state.reject_callbacks.is_empty() {
                        return;
                    }
                    state.fulfill_callbacks.clear();
                    (mem::take(&mut state.reject_callbacks), reason.clone())
                }
            }
        };

        self.event_loop.queue_task(move || {
            for callback in callbacks {
                callback(value.clone());
            }
        });
    }
}

fn run_continuation(
    continuation: Option<Continuation>,
    value: Value,
    next: &Deferred,
    rejected: bool,
) {
    match continuation {
        None if rejected => next.reject(value),
        None => next.resolve(value),
        // A continuation yielding undefined passes the incoming value on.
        Some(continuation) => match continuation(value.clone()) {
            Ok(Completion::Ready(Value::Undefined)) => next.resolve(value),
            outcome => next.settle(outcome),
        },
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("settlement", &self.state.borrow().settlement)
            .finish()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("promise", &self.promise)
            .finish()
    }
}
