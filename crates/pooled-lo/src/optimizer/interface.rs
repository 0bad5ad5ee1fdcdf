use crate::{AccessCallback, Error, IntegralValue, Result};

/// A minimal interface for block-allocating identifier optimizers.
pub trait Optimizer<T: IntegralValue> {
    /// The configured increment size.
    fn increment_size(&self) -> u32;

    /// Returns the next identifier, drawing a new block from `callback` if
    /// the caller's partition is exhausted.
    ///
    /// # Errors
    ///
    /// - [`Error::Source`] if `callback` fails
    /// - [`Error::Overflow`] if a fresh block does not fit `T`
    /// - `Error::LockPoisoned` without the `parking-lot` feature
    fn generate<C>(&self, callback: &mut C) -> Result<T, Error<C::Error>>
    where
        C: AccessCallback<T>;

    /// The last value read from the source for the given partition.
    ///
    /// # Errors
    ///
    /// [`Error::IllegalState`] if nothing was ever generated for it.
    fn last_source_value(&self, tenant: Option<&str>) -> Result<T>;

    /// Whether the source is expected to advance by the increment size
    /// between calls, rather than by one.
    fn applies_increment_size_to_source_values(&self) -> bool;
}
