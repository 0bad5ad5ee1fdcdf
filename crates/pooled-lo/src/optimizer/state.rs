use crate::{
    Error, IntegralValue,
    mutex::{Mutex, MutexGuard, lock},
};

/// Allocation state of one partition.
///
/// `upper_limit_value == last_source_value + block_size` always holds.
/// `value` is at least one and never moves backwards across refills of the
/// same partition, so it may start past the ceiling when the block lies
/// below one or behind values already handed out. Such a block serves a
/// single identifier and is exhausted afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationState<T> {
    last_source_value: T,
    value: T,
    upper_limit_value: T,
}

impl<T: IntegralValue> GenerationState<T> {
    /// Builds the state for a block starting at `last_source_value`.
    ///
    /// Some sources hand out values below one for a freshly created
    /// sequence; `value` is raised to one in that case without moving the
    /// ceiling.
    ///
    /// # Errors
    ///
    /// [`Error::Overflow`] if `last_source_value + block_size` does not fit.
    pub fn from_source<E>(last_source_value: T, block_size: u32) -> Result<Self, Error<E>> {
        let upper_limit_value =
            last_source_value
                .checked_add_size(block_size)
                .ok_or_else(|| Error::Overflow {
                    start: last_source_value.to_i128(),
                    block_size,
                })?;
        Ok(Self {
            last_source_value,
            value: last_source_value.max(T::ONE),
            upper_limit_value,
        })
    }

    /// Builds the state for the block that follows this exhausted one.
    ///
    /// Like [`from_source`](Self::from_source), but `value` is floored at the
    /// current `value` so a source that stalls or moves backwards cannot make
    /// the partition repeat an identifier.
    ///
    /// # Errors
    ///
    /// [`Error::Overflow`] if the new ceiling does not fit, or if `value` has
    /// already saturated at `T::MAX` and no fresh identifier is left.
    pub fn refill<E>(&self, last_source_value: T, block_size: u32) -> Result<Self, Error<E>> {
        if self.value == T::MAX {
            return Err(Error::Overflow {
                start: self.value.to_i128(),
                block_size,
            });
        }
        let mut next = Self::from_source(last_source_value, block_size)?;
        next.value = next.value.max(self.value);
        Ok(next)
    }

    /// The value last read from the source.
    pub fn last_source_value(&self) -> T {
        self.last_source_value
    }

    /// The next value to hand out.
    pub fn value(&self) -> T {
        self.value
    }

    /// The exclusive ceiling of the current block.
    pub fn upper_limit_value(&self) -> T {
        self.upper_limit_value
    }

    /// `true` once `value` has reached the ceiling.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.value >= self.upper_limit_value
    }

    /// Returns the current value and advances by `step`, or `None` if the
    /// block is exhausted.
    #[inline]
    pub fn try_take(&mut self, step: u32) -> Option<T> {
        if self.is_exhausted() {
            None
        } else {
            Some(self.take(step))
        }
    }

    /// Returns the current value and advances by `step` unconditionally.
    #[inline]
    pub fn take(&mut self, step: u32) -> T {
        let current = self.value;
        self.value = current.saturating_add_size(step);
        current
    }
}

/// A lazily filled [`GenerationState`] behind its own lock.
///
/// `None` until the first block for the partition has been fetched.
#[derive(Debug)]
pub(crate) struct SharedState<T> {
    #[cfg(feature = "cache-padded")]
    inner: crossbeam_utils::CachePadded<Mutex<Option<GenerationState<T>>>>,
    #[cfg(not(feature = "cache-padded"))]
    inner: Mutex<Option<GenerationState<T>>>,
}

impl<T> SharedState<T> {
    pub(crate) fn empty() -> Self {
        Self {
            #[cfg(feature = "cache-padded")]
            inner: crossbeam_utils::CachePadded::new(Mutex::new(None)),
            #[cfg(not(feature = "cache-padded"))]
            inner: Mutex::new(None),
        }
    }

    #[inline]
    pub(crate) fn lock<E>(&self) -> Result<MutexGuard<'_, Option<GenerationState<T>>>, Error<E>> {
        lock(&self.inner)
    }
}
