//! The ordered callback registry and its bulk-execution logic.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::trace;

use crate::change::{ChangeDescriptor, ChangedObject};

/// A subscriber invoked with the descriptor of each execution pass.
///
/// A returned `Err` is discarded by the registry; it exists so fallible
/// subscribers can use `?` internally without aborting the pass.
pub type ChangeCallback = Box<dyn FnMut(&ChangeDescriptor) -> anyhow::Result<()> + Send>;

/// An ordered collection of callbacks executed in bulk.
///
/// Registration order is execution order. Duplicates are allowed and there
/// is no removal: a registry lives exactly as long as its owner and its
/// subscriber set only grows.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: Vec<ChangeCallback>,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// Appends a callback to the execution sequence.
    pub fn register(
        &mut self,
        callback: impl FnMut(&ChangeDescriptor) -> anyhow::Result<()> + Send + 'static,
    ) {
        self.callbacks.push(Box::new(callback));
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// True iff no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Builds one [`ChangeDescriptor`] from the arguments and invokes every
    /// registered callback with it, in registration order.
    ///
    /// Each invocation is isolated: a callback that returns `Err` or panics
    /// is noted at trace level and the pass continues with the next
    /// callback. Nothing is reported to the caller, so one broken
    /// subscriber never starves the rest.
    ///
    /// The length is re-read on every step rather than snapshotted up
    /// front, so the traversal is live with respect to the sequence it is
    /// walking.
    pub fn execute(
        &mut self,
        changed_object: Option<ChangedObject>,
        changed_attributes: Vec<String>,
        previous: Option<&ChangeDescriptor>,
    ) {
        let descriptor =
            ChangeDescriptor::caused_by(changed_object, changed_attributes, previous);
        let mut index = 0;
        while index < self.callbacks.len() {
            let outcome = catch_unwind(AssertUnwindSafe(|| (self.callbacks[index])(&descriptor)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(error)) => trace!(index, "callback failed: {error:#}"),
                Err(_) => trace!(index, "callback panicked"),
            }
            index += 1;
        }
    }

    /// Executes all callbacks with an empty descriptor, as a payload-less
    /// tick does.
    pub fn execute_empty(&mut self) {
        self.execute(None, Vec::new(), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};

    fn recorder(log: &Arc<Mutex<Vec<usize>>>, id: usize) -> ChangeCallback {
        let log = Arc::clone(log);
        Box::new(move |_descriptor| {
            log.lock().unwrap().push(id);
            Ok(())
        })
    }

    #[test]
    fn callbacks_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        for id in 0..5 {
            registry.register(recorder(&log, id));
        }
        registry.execute_empty();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn duplicates_run_once_per_registration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        registry.register(recorder(&log, 7));
        registry.register(recorder(&log, 7));
        registry.execute_empty();
        assert_eq!(*log.lock().unwrap(), vec![7, 7]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn erring_callback_does_not_stop_the_pass() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        registry.register(recorder(&log, 0));
        registry.register(|_descriptor| Err(anyhow!("subscriber broke")));
        registry.register(recorder(&log, 2));
        registry.execute_empty();
        assert_eq!(*log.lock().unwrap(), vec![0, 2]);
    }

    #[test]
    fn panicking_callback_is_contained() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = CallbackRegistry::new();
        registry.register(recorder(&log, 0));
        registry.register(|_descriptor| panic!("subscriber panicked"));
        registry.register(recorder(&log, 2));
        registry.execute_empty();
        assert_eq!(*log.lock().unwrap(), vec![0, 2]);
    }

    #[test]
    fn execute_builds_the_expected_descriptor() {
        let mut registry = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(0usize));
        let seen_clone = Arc::clone(&seen);
        registry.register(move |descriptor| {
            let payload = descriptor.changed_object().unwrap();
            assert_eq!(payload.downcast_ref::<String>().unwrap(), "obj");
            assert!(descriptor.attribute_changed("a"));
            assert!(descriptor.attribute_changed("b"));
            assert!(!descriptor.attribute_changed("c"));
            assert!(descriptor.previous().is_none());
            *seen_clone.lock().unwrap() += 1;
            Ok(())
        });
        registry.execute(
            Some(Arc::new("obj".to_string())),
            vec!["a".to_string(), "b".to_string()],
            None,
        );
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn all_callbacks_see_the_same_descriptor() {
        let mut registry = CallbackRegistry::new();
        let first = Arc::new(Mutex::new(None::<ChangeDescriptor>));
        let first_clone = Arc::clone(&first);
        registry.register(move |descriptor| {
            *first_clone.lock().unwrap() = Some(descriptor.clone());
            Ok(())
        });
        let first_check = Arc::clone(&first);
        registry.register(move |descriptor| {
            let held = first_check.lock().unwrap();
            assert!(held.as_ref().unwrap().ptr_eq(descriptor));
            Ok(())
        });
        registry.execute_empty();
        assert!(first.lock().unwrap().is_some());
    }

    #[test]
    fn previous_descriptor_is_chained() {
        let root = ChangeDescriptor::new(None);
        let mut registry = CallbackRegistry::new();
        let root_clone = root.clone();
        registry.register(move |descriptor| {
            assert!(descriptor.previous().unwrap().ptr_eq(&root_clone));
            assert!(root_clone.next().unwrap().ptr_eq(descriptor));
            Ok(())
        });
        registry.execute(None, Vec::new(), Some(&root));
    }
}
