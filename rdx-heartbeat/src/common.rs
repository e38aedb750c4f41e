//! Small shared primitives used across the crate.

use std::sync::{Mutex, MutexGuard};

/// Locks a mutex, recovering the inner value if a previous holder panicked.
///
/// The crate never propagates poisoning: a callback that panicked mid-beat
/// has already been contained by the registry, and the protected state is
/// always valid between operations.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
