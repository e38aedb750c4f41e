//! The change descriptor handed to every callback during execution.
//!
//! A [`ChangeDescriptor`] records what changed (a type-erased payload plus an
//! ordered list of attribute names) and links into a causal chain: the
//! descriptor that triggered this one is reachable through `previous`, and
//! the descriptor this one triggered through `next`. The two links are kept
//! symmetric by the setters, so walking the chain in either direction always
//! agrees.
//!
//! Back-references never own their predecessor. `previous` is a weak pointer,
//! so a chain of descriptors is freed as soon as nothing downstream holds on
//! to it, even though every pair of neighbors points at each other.

use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::common::lock;

/// The type-erased value that changed. Receivers downcast this to the
/// concrete type they expect.
pub type ChangedObject = Arc<dyn Any + Send + Sync>;

struct Inner {
    changed_object: Option<ChangedObject>,
    changed_attributes: Vec<String>,
    previous: Option<Weak<Mutex<Inner>>>,
    next: Option<Arc<Mutex<Inner>>>,
    created_at: DateTime<Utc>,
}

/// A record of a single change event, linked into a causal chain.
///
/// `ChangeDescriptor` is a cheap clonable handle over shared state: clones
/// observe each other's mutations. This is what lets every callback of one
/// `execute` pass see the same record, and what makes the mutual
/// previous/next links well defined.
#[derive(Clone)]
pub struct ChangeDescriptor {
    inner: Arc<Mutex<Inner>>,
}

impl ChangeDescriptor {
    /// Creates a descriptor with no changed attributes.
    pub fn new(changed_object: Option<ChangedObject>) -> Self {
        Self::with_attributes(changed_object, Vec::new())
    }

    /// Creates a descriptor with the given changed attribute names.
    pub fn with_attributes(
        changed_object: Option<ChangedObject>,
        changed_attributes: Vec<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                changed_object,
                changed_attributes,
                previous: None,
                next: None,
                created_at: Utc::now(),
            })),
        }
    }

    /// Creates a descriptor already linked to the descriptor that caused it.
    pub fn caused_by(
        changed_object: Option<ChangedObject>,
        changed_attributes: Vec<String>,
        previous: Option<&ChangeDescriptor>,
    ) -> Self {
        let descriptor = Self::with_attributes(changed_object, changed_attributes);
        if let Some(previous) = previous {
            descriptor.set_previous(previous);
        }
        descriptor
    }

    /// Returns the changed value, if one was recorded.
    pub fn changed_object(&self) -> Option<ChangedObject> {
        lock(&self.inner).changed_object.clone()
    }

    /// Replaces the changed value.
    pub fn set_changed_object(&self, changed_object: Option<ChangedObject>) {
        lock(&self.inner).changed_object = changed_object;
    }

    /// True iff `attribute` is one of the recorded changed attribute names.
    pub fn attribute_changed(&self, attribute: &str) -> bool {
        lock(&self.inner)
            .changed_attributes
            .iter()
            .any(|candidate| candidate == attribute)
    }

    /// Returns the changed attribute names, in the order they were recorded.
    pub fn changed_attributes(&self) -> Vec<String> {
        lock(&self.inner).changed_attributes.clone()
    }

    /// Replaces the full list of changed attribute names.
    pub fn set_changed_attributes(&self, changed_attributes: Vec<String>) {
        lock(&self.inner).changed_attributes = changed_attributes;
    }

    /// Appends one changed attribute name.
    pub fn add_changed_attribute(&self, changed_attribute: impl Into<String>) {
        lock(&self.inner)
            .changed_attributes
            .push(changed_attribute.into());
    }

    /// Returns the descriptor that caused this one, if it is still alive.
    ///
    /// The back-link is weak, so this returns `None` once nothing else
    /// retains the predecessor.
    pub fn previous(&self) -> Option<ChangeDescriptor> {
        lock(&self.inner)
            .previous
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| ChangeDescriptor { inner })
    }

    /// Returns the descriptor this one caused, if any.
    pub fn next(&self) -> Option<ChangeDescriptor> {
        lock(&self.inner)
            .next
            .as_ref()
            .map(|inner| ChangeDescriptor {
                inner: Arc::clone(inner),
            })
    }

    /// When this descriptor was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        lock(&self.inner).created_at
    }

    /// True iff both handles refer to the same descriptor.
    pub fn ptr_eq(&self, other: &ChangeDescriptor) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Links `previous` as the descriptor that caused this one, and makes
    /// `previous`'s forward link point back here.
    pub fn set_previous(&self, previous: &ChangeDescriptor) {
        self.link_previous(previous, true);
    }

    /// Links `next` as the descriptor this one caused, and makes `next`'s
    /// back-link point here.
    pub fn set_next(&self, next: &ChangeDescriptor) {
        self.link_next(next, true);
    }

    // The `connect` flag breaks the mutual recursion between the two
    // linkers: the reciprocal side is written directly, without linking
    // back again. Locks are taken one descriptor at a time, never nested.
    fn link_previous(&self, previous: &ChangeDescriptor, connect: bool) {
        lock(&self.inner).previous = Some(Arc::downgrade(&previous.inner));
        if connect {
            let already_linked = previous.next().is_some_and(|next| next.ptr_eq(self));
            if !already_linked {
                previous.link_next(self, false);
            }
        }
    }

    fn link_next(&self, next: &ChangeDescriptor, connect: bool) {
        lock(&self.inner).next = Some(Arc::clone(&next.inner));
        if connect {
            let already_linked = next.previous().is_some_and(|previous| previous.ptr_eq(self));
            if !already_linked {
                next.link_previous(self, false);
            }
        }
    }
}

impl fmt::Debug for ChangeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("ChangeDescriptor")
            .field("has_changed_object", &inner.changed_object.is_some())
            .field("changed_attributes", &inner.changed_attributes)
            .field("has_previous", &inner.previous.is_some())
            .field("has_next", &inner.next.is_some())
            .field("created_at", &inner.created_at)
            .finish()
    }
}
