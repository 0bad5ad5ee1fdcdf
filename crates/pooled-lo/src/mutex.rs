#[cfg(feature = "parking-lot")]
pub use parking_lot::{Mutex, MutexGuard};
#[cfg(not(feature = "parking-lot"))]
pub use std::sync::{Mutex, MutexGuard};

use crate::Error;

/// Acquires `mutex`, mapping std lock poisoning into [`Error::LockPoisoned`].
///
/// With `parking-lot` enabled this never fails.
#[cfg(feature = "parking-lot")]
#[inline]
pub(crate) fn lock<T, E>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, Error<E>> {
    Ok(mutex.lock())
}

/// Acquires `mutex`, mapping std lock poisoning into [`Error::LockPoisoned`].
#[cfg(not(feature = "parking-lot"))]
#[inline]
pub(crate) fn lock<T, E>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, Error<E>> {
    mutex.lock().map_err(|_| Error::LockPoisoned)
}
