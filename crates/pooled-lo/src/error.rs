use core::convert::Infallible;

/// A result type whose error defaults to an [`Error`] with no source failure.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that `pooled-lo` can emit.
///
/// The generic parameter `E` is the error type of the caller's
/// [`AccessCallback`]. Operations that never touch the identifier source
/// (construction, [`PooledLoOptimizer::last_source_value`]) use the default
/// `E = Infallible`.
///
/// [`AccessCallback`]: crate::AccessCallback
/// [`PooledLoOptimizer::last_source_value`]: crate::PooledLoOptimizer::last_source_value
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error<E = Infallible> {
    /// The configured increment size was below one or does not fit a `u32`.
    #[error("increment size cannot be less than 1 (got {0})")]
    InvalidIncrementSize(i64),

    /// The configured thread-local block size was below one or does not fit
    /// a `u32`.
    #[error("thread-local block size cannot be less than 1 (got {0})")]
    InvalidBlockSize(i64),

    /// Generation state was queried before it had ever been created.
    ///
    /// This points at an ordering bug in the embedding code, e.g. asking for
    /// the last source value before the first call to `generate`.
    #[error("could not locate previous generation state")]
    IllegalState,

    /// The block starting at `start` does not fit the identifier type.
    #[error("identifier block starting at {start} with size {block_size} overflows the value type")]
    Overflow {
        /// The value returned by the identifier source.
        start: i128,
        /// The size of the block that was being reserved.
        block_size: u32,
    },

    /// The identifier source failed. Propagated verbatim, never retried.
    #[error("identifier source failed: {0}")]
    Source(#[source] E),

    /// A thread panicked while holding one of the optimizer's locks.
    ///
    /// With the `parking-lot` feature mutexes do not poison, so this variant
    /// does not exist.
    #[cfg_attr(docsrs, doc(cfg(not(feature = "parking-lot"))))]
    #[cfg(not(feature = "parking-lot"))]
    #[error("optimizer lock poisoned")]
    LockPoisoned,
}
