//! Small synchronization helpers shared across the crate.

use std::sync::{Mutex, MutexGuard};

/// Locks a mutex, recovering the guard if a previous holder panicked.
/// All guarded state in this crate stays consistent across handler
/// faults, so continuing with a poisoned lock is safe.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
