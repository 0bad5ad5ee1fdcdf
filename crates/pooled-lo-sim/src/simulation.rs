use std::{collections::HashSet, thread, time::Instant};

use anyhow::{Context, anyhow, bail};
use pooled_lo::PooledLoOptimizer;
use tracing::{debug, info, info_span};

use crate::{config::SimConfig, sequence::InMemorySequence};

/// Outcome of a simulation run.
#[derive(Debug)]
pub struct Report {
    pub total_ids: usize,
    pub round_trips: u64,
    pub elapsed: core::time::Duration,
}

impl Report {
    /// Identifiers served per source round-trip.
    pub fn ids_per_round_trip(&self) -> f64 {
        self.total_ids as f64 / self.round_trips.max(1) as f64
    }

    pub fn log(&self) {
        info!(
            total_ids = self.total_ids,
            round_trips = self.round_trips,
            ids_per_round_trip = format_args!("{:.1}", self.ids_per_round_trip()),
            elapsed_ms = self.elapsed.as_millis() as u64,
            ids_per_sec = format_args!(
                "{:.0}",
                self.total_ids as f64 / self.elapsed.as_secs_f64().max(f64::EPSILON)
            ),
            "simulation complete"
        );
    }
}

fn tenant_for(worker: usize, tenants: usize) -> Option<String> {
    (tenants > 0).then(|| format!("tenant-{}", worker % tenants))
}

/// Runs every worker to completion and verifies that no identifier was handed
/// out twice.
///
/// All partitions draw from one sequence, so identifiers must be unique
/// across workers and tenants alike.
pub fn run(config: &SimConfig) -> anyhow::Result<Report> {
    let optimizer = PooledLoOptimizer::<i64>::new(config.optimizer)
        .context("invalid optimizer configuration")?;
    let sequence = InMemorySequence::new(
        config.start_value,
        i64::from(optimizer.block_size()),
        config.latency,
    );

    let start = Instant::now();
    let per_worker = thread::scope(|s| {
        let handles: Vec<_> = (0..config.threads)
            .map(|worker| {
                let optimizer = &optimizer;
                let mut source = sequence.with_tenant(tenant_for(worker, config.tenants));
                let ids_per_thread = config.ids_per_thread;
                s.spawn(move || -> anyhow::Result<Vec<i64>> {
                    let _span = info_span!("worker", worker).entered();
                    let ids = (0..ids_per_thread)
                        .map(|_| optimizer.generate(&mut source))
                        .collect::<Result<Vec<_>, _>>()?;
                    debug!(
                        first = ids.first(),
                        last = ids.last(),
                        "worker finished"
                    );
                    optimizer.release_current_thread();
                    Ok(ids)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| anyhow!("worker thread panicked"))?
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })?;
    let elapsed = start.elapsed();

    let mut seen = HashSet::with_capacity(config.total_ids());
    for ids in &per_worker {
        if ids.windows(2).any(|w| w[0] >= w[1]) {
            bail!("worker observed a non-increasing identifier sequence");
        }
        for &id in ids {
            if !seen.insert(id) {
                bail!("identifier {id} was handed out twice");
            }
        }
    }

    Ok(Report {
        total_ids: seen.len(),
        round_trips: sequence.round_trips(),
        elapsed,
    })
}
