use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use frameport_core::{Completion, Outcome, Value};

/// Builds an instance from the caller's context data. May return a promise
/// of the instance, or fail with a thrown value.
pub type Factory = Rc<dyn Fn(&Value) -> Outcome>;

/// What an instance id resolves to.
#[derive(Clone)]
pub enum Registered {
    Instance(Value),
    Factory(Factory),
}

impl Registered {
    /// Wrap a closure as a factory entry.
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Outcome + 'static,
    {
        Registered::Factory(Rc::new(f))
    }
}

impl From<Value> for Registered {
    fn from(value: Value) -> Self {
        Registered::Instance(value)
    }
}

impl fmt::Debug for Registered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Registered::Instance(value) => f.debug_tuple("Instance").field(value).finish(),
            Registered::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// Map from instance id to instance or factory.
///
/// Cloning yields another handle to the same map.
#[derive(Clone, Default)]
pub struct ObjectRegistry {
    entries: Rc<RefCell<BTreeMap<String, Registered>>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance or factory under `instance_id`, replacing any
    /// previous entry.
    pub fn register(&self, instance_id: impl Into<String>, entry: impl Into<Registered>) {
        let instance_id = instance_id.into();
        let replaced = self
            .entries
            .borrow_mut()
            .insert(instance_id.clone(), entry.into())
            .is_some();
        tracing::debug!(instance_id = %instance_id, replaced, "registered object");
    }

    /// Remove the entry for `instance_id`. Returns whether one existed.
    pub fn unregister(&self, instance_id: &str) -> bool {
        let removed = self.entries.borrow_mut().remove(instance_id).is_some();
        if removed {
            tracing::debug!(instance_id = %instance_id, "unregistered object");
        }
        removed
    }

    /// Resolve `instance_id` for a caller.
    ///
    /// Factories, and callable values registered as instances, are invoked
    /// with `context_data`. `None` means nothing usable is registered: no
    /// entry, or a factory that produced null or undefined. A failing
    /// factory yields `Some(Err(..))`.
    pub fn get_instance(&self, instance_id: &str, context_data: &Value) -> Option<Outcome> {
        // Release the borrow before running the factory; it may re-enter.
        let entry = self.entries.borrow().get(instance_id).cloned()?;
        let outcome = match entry {
            Registered::Instance(Value::Function(function)) => {
                function.call(&Value::Undefined, vec![context_data.clone()])
            }
            Registered::Instance(value) => Ok(Completion::Ready(value)),
            Registered::Factory(factory) => factory(context_data),
        };
        match outcome {
            Ok(Completion::Ready(value)) if value.is_nullish() => None,
            outcome => Some(outcome),
        }
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.entries.borrow().contains_key(instance_id)
    }

    /// Registered ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
