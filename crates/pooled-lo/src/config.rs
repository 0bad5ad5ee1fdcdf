//! Optimizer configuration.
//!
//! Two block policies are supported:
//!
//! - [`BlockPolicy::GlobalBlock`]: a single no-tenant block shared by every
//!   thread, sized by the thread-local block size and advanced by the
//!   increment size on every call.
//! - [`BlockPolicy::PerPartition`]: each thread (no tenant) or tenant owns its
//!   own block sized by the increment size, handing out consecutive values.
//!
//! The thread-local block size defaults to [`DEFAULT_THREAD_LOCAL_BLOCK_SIZE`]
//! and can be overridden once per process through the
//! [`THREAD_LOCAL_BLOCK_SIZE_ENV`] environment variable.

use std::sync::LazyLock;

/// Block size used by [`BlockPolicy::GlobalBlock`] when neither the caller nor
/// the environment overrides it.
pub const DEFAULT_THREAD_LOCAL_BLOCK_SIZE: u32 = 5000;

/// Environment variable consulted (once) for the thread-local block size.
pub const THREAD_LOCAL_BLOCK_SIZE_ENV: &str = "POOLED_LO_THREAD_LOCAL_BLOCK_SIZE";

static THREAD_LOCAL_BLOCK_SIZE: LazyLock<u32> = LazyLock::new(|| {
    parse_block_size(std::env::var(THREAD_LOCAL_BLOCK_SIZE_ENV).ok().as_deref())
});

/// Returns the process-wide thread-local block size.
///
/// The environment is read on first use only; later changes to
/// [`THREAD_LOCAL_BLOCK_SIZE_ENV`] are ignored.
pub fn thread_local_block_size() -> u32 {
    *THREAD_LOCAL_BLOCK_SIZE
}

/// Parses a block size override, falling back to
/// [`DEFAULT_THREAD_LOCAL_BLOCK_SIZE`] when absent, malformed, or below one.
pub fn parse_block_size(raw: Option<&str>) -> u32 {
    let Some(raw) = raw else {
        return DEFAULT_THREAD_LOCAL_BLOCK_SIZE;
    };
    match raw.trim().parse::<u32>() {
        Ok(n) if n >= 1 => n,
        _ => {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                value = raw,
                default = DEFAULT_THREAD_LOCAL_BLOCK_SIZE,
                "ignoring invalid {THREAD_LOCAL_BLOCK_SIZE_ENV}"
            );
            DEFAULT_THREAD_LOCAL_BLOCK_SIZE
        }
    }
}

/// How blocks are partitioned and sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum BlockPolicy {
    /// One no-tenant block shared by all threads. Tenants each get a block of
    /// the same size.
    GlobalBlock {
        /// Number of values reserved per source round-trip.
        block_size: i64,
    },
    /// One block per thread (no tenant) or per tenant, sized by the
    /// increment size.
    PerPartition,
}

impl BlockPolicy {
    /// A [`BlockPolicy::GlobalBlock`] sized by [`thread_local_block_size`].
    pub fn global() -> Self {
        Self::GlobalBlock {
            block_size: i64::from(thread_local_block_size()),
        }
    }
}

/// How far `value` advances after each identifier is handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Step {
    /// Advance by the configured increment size.
    IncrementSize,
    /// Advance by one, yielding consecutive values within a block.
    Unit,
}

/// Configuration consumed once by [`PooledLoOptimizer::new`].
///
/// Sizes are signed so that out-of-range input is reported as a configuration
/// error rather than being unrepresentable.
///
/// [`PooledLoOptimizer::new`]: crate::PooledLoOptimizer::new
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizerConfig {
    /// The increment size. Must be at least one.
    pub increment_size: i64,
    /// Block partitioning policy.
    pub policy: BlockPolicy,
    /// Step override; `None` picks the policy's default.
    #[cfg_attr(feature = "serde", serde(default))]
    pub step: Option<Step>,
}

impl OptimizerConfig {
    /// A global-block configuration using the process-wide thread-local block
    /// size.
    pub fn global_block(increment_size: i64) -> Self {
        Self {
            increment_size,
            policy: BlockPolicy::global(),
            step: None,
        }
    }

    /// A per-thread/per-tenant configuration.
    pub fn per_partition(increment_size: i64) -> Self {
        Self {
            increment_size,
            policy: BlockPolicy::PerPartition,
            step: None,
        }
    }

    /// Overrides the global block size. Ignored by
    /// [`BlockPolicy::PerPartition`].
    #[must_use]
    pub fn with_block_size(mut self, block_size: i64) -> Self {
        if let BlockPolicy::GlobalBlock { block_size: size } = &mut self.policy {
            *size = block_size;
        }
        self
    }

    /// Overrides the step.
    #[must_use]
    pub fn with_step(mut self, step: Step) -> Self {
        self.step = Some(step);
        self
    }

    /// The step in effect: the override, or [`Step::IncrementSize`] for
    /// [`BlockPolicy::GlobalBlock`] and [`Step::Unit`] for
    /// [`BlockPolicy::PerPartition`].
    pub fn effective_step(&self) -> Step {
        self.step.unwrap_or(match self.policy {
            BlockPolicy::GlobalBlock { .. } => Step::IncrementSize,
            BlockPolicy::PerPartition => Step::Unit,
        })
    }
}
