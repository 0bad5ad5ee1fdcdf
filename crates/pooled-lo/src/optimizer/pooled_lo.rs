use core::convert::Infallible;
use std::{collections::HashMap, sync::Arc};

use portable_atomic::{AtomicU64, Ordering};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    AccessCallback, BlockPolicy, Error, IntegralValue, Optimizer, OptimizerConfig, Result, Step,
    mutex::{Mutex, lock},
    optimizer::{GenerationState, SharedState, thread_cache::ThreadCache},
};

/// Canonical states, only ever touched under the optimizer lock.
#[derive(Debug)]
struct Canonical<T> {
    global: Option<Arc<SharedState<T>>>,
    tenants: HashMap<String, Arc<SharedState<T>>>,
}

impl<T> Canonical<T> {
    fn global(&mut self) -> Arc<SharedState<T>> {
        Arc::clone(
            self.global
                .get_or_insert_with(|| Arc::new(SharedState::empty())),
        )
    }

    fn tenant(&mut self, tenant: &str) -> Arc<SharedState<T>> {
        if let Some(state) = self.tenants.get(tenant) {
            return Arc::clone(state);
        }
        let state = Arc::new(SharedState::empty());
        self.tenants.insert(tenant.to_owned(), Arc::clone(&state));
        state
    }
}

/// A pooled optimizer that interprets source values as the *lo* end of a
/// block and caches the block per calling thread.
///
/// Each call first tries the calling thread's cached state without touching
/// the optimizer lock. Only when that state is missing or exhausted does the
/// call take the optimizer lock, resolve the canonical state for its
/// partition and, if needed, fetch a new block from the source.
///
/// ## Partitioning
/// - No tenant, [`BlockPolicy::GlobalBlock`]: every thread caches the same
///   process-wide state.
/// - No tenant, [`BlockPolicy::PerPartition`]: every thread owns its own
///   state.
/// - Tenant: one state per tenant, served under the optimizer lock and never
///   cached per thread.
///
/// Within a partition identifiers are strictly increasing and never repeat,
/// even if the source stalls or hands out values below one. Each
/// replenishment costs exactly one source round-trip.
///
/// A thread's cache entry is dropped when the thread exits.
///
/// ## Example
/// ```
/// use pooled_lo::{OptimizerConfig, PooledLoOptimizer, from_fn};
///
/// let optimizer = PooledLoOptimizer::<i64>::new(
///     OptimizerConfig::global_block(3).with_block_size(9),
/// )
/// .unwrap();
///
/// let mut next = 1;
/// let mut sequence = from_fn(|| -> Result<i64, std::convert::Infallible> {
///     let start = next;
///     next += 9;
///     Ok(start)
/// });
///
/// let ids: Vec<i64> = (0..4)
///     .map(|_| optimizer.generate(&mut sequence).unwrap())
///     .collect();
/// assert_eq!(ids, [1, 4, 7, 10]);
/// assert_eq!(optimizer.source_fetches(), 2);
/// ```
#[derive(Debug)]
pub struct PooledLoOptimizer<T> {
    increment_size: u32,
    block_size: u32,
    step: u32,
    policy: BlockPolicy,
    canonical: Mutex<Canonical<T>>,
    threads: Arc<ThreadCache<T>>,
    fetches: AtomicU64,
}

impl<T: IntegralValue> PooledLoOptimizer<T> {
    /// Creates an optimizer from `config`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidIncrementSize`] if the increment size is below one
    ///   or above `u32::MAX`
    /// - [`Error::InvalidBlockSize`] if the global block size is out of the
    ///   same range
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        let increment_size = u32::try_from(config.increment_size)
            .ok()
            .filter(|&n| n >= 1)
            .ok_or(Error::InvalidIncrementSize(config.increment_size))?;

        let block_size = match config.policy {
            BlockPolicy::GlobalBlock { block_size } => u32::try_from(block_size)
                .ok()
                .filter(|&n| n >= 1)
                .ok_or(Error::InvalidBlockSize(block_size))?,
            BlockPolicy::PerPartition => increment_size,
        };

        let step = match config.effective_step() {
            Step::IncrementSize => increment_size,
            Step::Unit => 1,
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            increment_size,
            block_size,
            step,
            policy = ?config.policy,
            value_type = core::any::type_name::<T>(),
            "creating pooled lo optimizer"
        );

        Ok(Self {
            increment_size,
            block_size,
            step,
            policy: config.policy,
            canonical: Mutex::new(Canonical {
                global: None,
                tenants: HashMap::new(),
            }),
            threads: ThreadCache::new(),
            fetches: AtomicU64::new(0),
        })
    }

    /// The configured increment size.
    pub fn increment_size(&self) -> u32 {
        self.increment_size
    }

    /// Number of values reserved per source round-trip.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Distance between consecutive identifiers within a block.
    pub fn step(&self) -> u32 {
        self.step
    }

    /// The partitioning policy.
    pub fn policy(&self) -> BlockPolicy {
        self.policy
    }

    /// Number of successful calls made to [`AccessCallback::next_value`].
    pub fn source_fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Number of threads currently holding a cached state.
    pub fn cached_threads(&self) -> usize {
        self.threads.len()
    }

    /// Returns the next identifier for the callback's partition.
    ///
    /// # Errors
    ///
    /// - [`Error::Source`] if a new block was needed and the source failed;
    ///   the partition stays exhausted and the next call retries the fetch
    /// - [`Error::Overflow`] if the new block's ceiling does not fit `T`
    /// - `Error::LockPoisoned` without the `parking-lot` feature
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
    pub fn generate<C>(&self, callback: &mut C) -> Result<T, Error<C::Error>>
    where
        C: AccessCallback<T>,
    {
        if callback.tenant_identifier().is_none() {
            if let Some(state) = self.cached_state() {
                let mut guard = state.lock::<C::Error>()?;
                if let Some(id) = guard.as_mut().and_then(|s| s.try_take(self.step)) {
                    return Ok(id);
                }
            }
        }
        self.generate_locked(callback)
    }

    #[cold]
    #[inline(never)]
    fn generate_locked<C>(&self, callback: &mut C) -> Result<T, Error<C::Error>>
    where
        C: AccessCallback<T>,
    {
        let mut canonical = lock::<_, C::Error>(&self.canonical)?;
        let state = match callback.tenant_identifier() {
            Some(tenant) => canonical.tenant(tenant),
            None => match self.policy {
                BlockPolicy::GlobalBlock { .. } => {
                    let global = canonical.global();
                    self.threads.get_or_insert_with(|| Arc::clone(&global));
                    global
                }
                BlockPolicy::PerPartition => self
                    .threads
                    .get_or_insert_with(|| Arc::new(SharedState::empty())),
            },
        };

        let mut guard = state.lock::<C::Error>()?;
        let mut generation = match *guard {
            Some(current) if !current.is_exhausted() => current,
            Some(exhausted) => {
                exhausted.refill::<C::Error>(self.fetch(callback)?, self.block_size)?
            }
            None => {
                GenerationState::from_source::<C::Error>(self.fetch(callback)?, self.block_size)?
            }
        };
        let id = generation.take(self.step);
        *guard = Some(generation);
        Ok(id)
    }

    /// Reads the start of the next block from the source.
    fn fetch<C>(&self, callback: &mut C) -> Result<T, Error<C::Error>>
    where
        C: AccessCallback<T>,
    {
        let last_source_value = callback.next_value().map_err(Error::Source)?;
        self.fetches.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "tracing")]
        tracing::trace!(
            tenant = callback.tenant_identifier(),
            %last_source_value,
            block_size = self.block_size,
            "fetched block"
        );

        Ok(last_source_value)
    }

    fn cached_state(&self) -> Option<Arc<SharedState<T>>> {
        self.threads.get()
    }

    /// The last value read from the source for `tenant`, or for the no-tenant
    /// partition visible to the calling thread when `tenant` is `None`.
    ///
    /// # Errors
    ///
    /// [`Error::IllegalState`] if the partition has never been filled.
    pub fn last_source_value(&self, tenant: Option<&str>) -> Result<T> {
        let state = {
            let canonical = lock::<_, Infallible>(&self.canonical)?;
            match (tenant, self.policy) {
                (Some(tenant), _) => canonical.tenants.get(tenant).cloned(),
                (None, BlockPolicy::GlobalBlock { .. }) => canonical.global.clone(),
                (None, BlockPolicy::PerPartition) => self.cached_state(),
            }
        }
        .ok_or(Error::IllegalState)?;

        let guard = state.lock::<Infallible>()?;
        guard
            .as_ref()
            .map(GenerationState::last_source_value)
            .ok_or(Error::IllegalState)
    }

    /// Drops the calling thread's cached state ahead of thread exit.
    ///
    /// Under [`BlockPolicy::PerPartition`] the values
    /// left in the thread's block are discarded; the thread draws a fresh
    /// block on its next call.
    pub fn release_current_thread(&self) {
        self.threads.remove_current();
    }
}

impl<T: IntegralValue> Optimizer<T> for PooledLoOptimizer<T> {
    fn increment_size(&self) -> u32 {
        self.increment_size()
    }

    fn generate<C>(&self, callback: &mut C) -> Result<T, Error<C::Error>>
    where
        C: AccessCallback<T>,
    {
        self.generate(callback)
    }

    fn last_source_value(&self, tenant: Option<&str>) -> Result<T> {
        self.last_source_value(tenant)
    }

    fn applies_increment_size_to_source_values(&self) -> bool {
        true
    }
}
