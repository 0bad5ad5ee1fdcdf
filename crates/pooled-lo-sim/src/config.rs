use core::time::Duration;

use anyhow::bail;
use clap::{Parser, ValueEnum};
use pooled_lo::{OptimizerConfig, thread_local_block_size};

/// Block policy selectable from the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// One no-tenant block shared by all threads.
    Global,
    /// One block per thread or tenant.
    PerPartition,
}

/// Runtime configuration for the `pooled-lo-sim` binary.
///
/// All values are parsed from CLI arguments or environment variables.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pooled-lo-sim",
    version,
    about = "Drives a pooled-lo optimizer from many threads against an in-memory sequence"
)]
pub struct CliArgs {
    /// Number of worker threads sharing the optimizer.
    ///
    /// Environment variable: `THREADS`
    #[arg(long, env = "THREADS", default_value_t = num_cpus::get())]
    pub threads: usize,

    /// Number of identifiers each worker requests.
    ///
    /// Environment variable: `IDS_PER_THREAD`
    #[arg(long, env = "IDS_PER_THREAD", default_value_t = 100_000)]
    pub ids_per_thread: usize,

    /// Increment size of the optimizer (and of the simulated sequence under
    /// the per-partition policy).
    ///
    /// Environment variable: `INCREMENT_SIZE`
    #[arg(long, env = "INCREMENT_SIZE", default_value_t = 50, allow_negative_numbers = true)]
    pub increment_size: i64,

    /// Block partitioning policy.
    ///
    /// Environment variable: `POLICY`
    #[arg(long, env = "POLICY", value_enum, default_value_t = Policy::PerPartition)]
    pub policy: Policy,

    /// Shared block size for the `global` policy. Defaults to the
    /// process-wide thread-local block size
    /// (`POOLED_LO_THREAD_LOCAL_BLOCK_SIZE`, else 5000).
    ///
    /// Environment variable: `BLOCK_SIZE`
    #[arg(long, env = "BLOCK_SIZE", allow_negative_numbers = true)]
    pub block_size: Option<i64>,

    /// Number of tenants workers are spread across. `0` disables tenancy.
    ///
    /// Environment variable: `TENANTS`
    #[arg(long, env = "TENANTS", default_value_t = 0)]
    pub tenants: usize,

    /// First value returned by the simulated sequence. Values below one
    /// exercise the sub-one correction.
    ///
    /// Environment variable: `START_VALUE`
    #[arg(long, env = "START_VALUE", default_value_t = 1, allow_negative_numbers = true)]
    pub start_value: i64,

    /// Simulated round-trip latency of the sequence, in microseconds.
    ///
    /// Environment variable: `LATENCY_US`
    #[arg(long, env = "LATENCY_US", default_value_t = 0)]
    pub latency_us: u64,
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub threads: usize,
    pub ids_per_thread: usize,
    pub tenants: usize,
    pub start_value: i64,
    pub latency: Duration,
    pub optimizer: OptimizerConfig,
}

impl SimConfig {
    /// Total number of identifiers the run will produce.
    pub fn total_ids(&self) -> usize {
        self.threads * self.ids_per_thread
    }
}

impl TryFrom<CliArgs> for SimConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.threads == 0 {
            bail!("THREADS must be greater than 0");
        }

        if args.ids_per_thread == 0 {
            bail!("IDS_PER_THREAD must be greater than 0");
        }

        if args.threads.checked_mul(args.ids_per_thread).is_none() {
            bail!(
                "THREADS ({}) * IDS_PER_THREAD ({}) overflows",
                args.threads,
                args.ids_per_thread
            );
        }

        let optimizer = match args.policy {
            Policy::Global => OptimizerConfig::global_block(args.increment_size).with_block_size(
                args.block_size
                    .unwrap_or_else(|| i64::from(thread_local_block_size())),
            ),
            Policy::PerPartition => {
                if args.block_size.is_some() {
                    bail!("BLOCK_SIZE only applies to the global policy");
                }
                OptimizerConfig::per_partition(args.increment_size)
            }
        };

        Ok(Self {
            threads: args.threads,
            ids_per_thread: args.ids_per_thread,
            tenants: args.tenants,
            start_value: args.start_value,
            latency: Duration::from_micros(args.latency_us),
            optimizer,
        })
    }
}
