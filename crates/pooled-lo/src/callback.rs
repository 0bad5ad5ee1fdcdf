use crate::IntegralValue;

/// The identifier source an optimizer draws blocks from.
///
/// Typically this advances a database sequence or a hi/lo table row. The
/// optimizer calls [`AccessCallback::next_value`] only when the block serving
/// the caller's partition is exhausted.
pub trait AccessCallback<T: IntegralValue> {
    /// The error raised by the underlying source. Surfaced verbatim as
    /// [`Error::Source`].
    ///
    /// [`Error::Source`]: crate::Error::Source
    type Error;

    /// Fetches the next raw block-start value.
    ///
    /// # Errors
    ///
    /// Any failure of the underlying source, e.g. a lost connection.
    fn next_value(&mut self) -> Result<T, Self::Error>;

    /// The tenant this request belongs to, or `None` outside multi-tenant
    /// contexts.
    fn tenant_identifier(&self) -> Option<&str> {
        None
    }
}

/// An [`AccessCallback`] backed by a closure.
///
/// # Example
/// ```
/// use pooled_lo::{OptimizerConfig, PooledLoOptimizer, from_fn};
///
/// let optimizer = PooledLoOptimizer::<i64>::new(OptimizerConfig::per_partition(10)).unwrap();
/// let mut next = 1;
/// let mut source = from_fn(|| -> Result<i64, std::io::Error> {
///     let start = next;
///     next += 10;
///     Ok(start)
/// })
/// .with_tenant("acme");
///
/// assert_eq!(optimizer.generate(&mut source).unwrap(), 1);
/// assert_eq!(optimizer.generate(&mut source).unwrap(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct FnCallback<F> {
    f: F,
    tenant: Option<String>,
}

/// Wraps `f` as an [`AccessCallback`] with no tenant.
pub fn from_fn<F>(f: F) -> FnCallback<F> {
    FnCallback { f, tenant: None }
}

impl<F> FnCallback<F> {
    /// Tags every request made through this callback with `tenant`.
    #[must_use]
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

impl<T, E, F> AccessCallback<T> for FnCallback<F>
where
    T: IntegralValue,
    F: FnMut() -> Result<T, E>,
{
    type Error = E;

    fn next_value(&mut self) -> Result<T, E> {
        (self.f)()
    }

    fn tenant_identifier(&self) -> Option<&str> {
        self.tenant.as_deref()
    }
}
