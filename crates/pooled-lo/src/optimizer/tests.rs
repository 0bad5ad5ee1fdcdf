use crate::{
    AccessCallback, BlockPolicy, Error, IntegralValue, Optimizer, OptimizerConfig,
    PooledLoOptimizer, Step, from_fn,
};
use core::convert::Infallible;
use std::collections::HashSet;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI64, Ordering},
};
use std::thread::scope;

/// A sequence that advances by `stride` on every fetch. Clones share the
/// same counter, like connections to one database sequence.
#[derive(Clone)]
struct MockSequence {
    next: Arc<AtomicI64>,
    stride: i64,
    tenant: Option<String>,
}

impl MockSequence {
    fn new(start: i64, stride: i64) -> Self {
        Self {
            next: Arc::new(AtomicI64::new(start)),
            stride,
            tenant: None,
        }
    }

    fn for_tenant(&self, tenant: &str) -> Self {
        Self {
            tenant: Some(tenant.to_owned()),
            ..self.clone()
        }
    }
}

impl AccessCallback<i64> for MockSequence {
    type Error = Infallible;

    fn next_value(&mut self) -> Result<i64, Infallible> {
        Ok(self.next.fetch_add(self.stride, Ordering::Relaxed))
    }

    fn tenant_identifier(&self) -> Option<&str> {
        self.tenant.as_deref()
    }
}

fn new_optimizer<T: IntegralValue>(config: OptimizerConfig) -> PooledLoOptimizer<T> {
    PooledLoOptimizer::new(config).unwrap()
}

fn run_generates_sequence<O>(optimizer: &O, source: &mut MockSequence, expected: &[i64])
where
    O: Optimizer<i64>,
{
    let ids: Vec<i64> = expected
        .iter()
        .map(|_| optimizer.generate(&mut *source).unwrap())
        .collect();
    assert_eq!(ids, expected);
}

fn run_tenants_are_isolated<O>(optimizer: &O, source: &MockSequence)
where
    O: Optimizer<i64>,
{
    let mut acme = source.for_tenant("acme");
    let mut globex = source.for_tenant("globex");

    let mut acme_ids = Vec::new();
    let mut globex_ids = Vec::new();
    for _ in 0..50 {
        acme_ids.push(optimizer.generate(&mut acme).unwrap());
        globex_ids.push(optimizer.generate(&mut globex).unwrap());
        globex_ids.push(optimizer.generate(&mut globex).unwrap());
    }

    assert!(acme_ids.windows(2).all(|w| w[0] < w[1]));
    assert!(globex_ids.windows(2).all(|w| w[0] < w[1]));

    let acme_set: HashSet<_> = acme_ids.iter().collect();
    let globex_set: HashSet<_> = globex_ids.iter().collect();
    assert_eq!(acme_set.len(), acme_ids.len());
    assert_eq!(globex_set.len(), globex_ids.len());
    assert!(acme_set.is_disjoint(&globex_set));
}

fn run_threads_receive_distinct_ids<O>(optimizer: &O, source: &MockSequence) -> Vec<Vec<i64>>
where
    O: Optimizer<i64> + Sync,
{
    const THREADS: usize = 8;
    const IDS_PER_THREAD: usize = 10_000;

    let seen = Mutex::new(HashSet::with_capacity(THREADS * IDS_PER_THREAD));
    let per_thread = Mutex::new(Vec::with_capacity(THREADS));

    scope(|s| {
        for _ in 0..THREADS {
            let mut source = source.clone();
            let seen = &seen;
            let per_thread = &per_thread;
            s.spawn(move || {
                let ids: Vec<i64> = (0..IDS_PER_THREAD)
                    .map(|_| optimizer.generate(&mut source).unwrap())
                    .collect();
                assert!(ids.windows(2).all(|w| w[0] < w[1]));
                let mut seen = seen.lock().unwrap();
                for id in &ids {
                    assert!(seen.insert(*id), "duplicate id {id}");
                }
                per_thread.lock().unwrap().push(ids);
            });
        }
    });

    assert_eq!(seen.lock().unwrap().len(), THREADS * IDS_PER_THREAD);
    per_thread.into_inner().unwrap()
}

#[test]
fn rejects_increment_size_below_one() {
    for increment_size in [0, -1, -50] {
        for config in [
            OptimizerConfig::global_block(increment_size),
            OptimizerConfig::per_partition(increment_size),
        ] {
            let err = PooledLoOptimizer::<i64>::new(config).unwrap_err();
            assert!(matches!(err, Error::InvalidIncrementSize(n) if n == increment_size));
        }
    }
}

#[test]
fn rejects_increment_size_beyond_u32() {
    let too_big = i64::from(u32::MAX) + 1;
    let err = PooledLoOptimizer::<i64>::new(OptimizerConfig::per_partition(too_big)).unwrap_err();
    assert!(matches!(err, Error::InvalidIncrementSize(n) if n == too_big));
}

#[test]
fn rejects_block_size_below_one() {
    let err = PooledLoOptimizer::<i64>::new(OptimizerConfig::global_block(1).with_block_size(0))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidBlockSize(0)));
}

#[test]
fn configuration_is_exposed() {
    let global = new_optimizer::<i64>(OptimizerConfig::global_block(7).with_block_size(700));
    assert_eq!(global.increment_size(), 7);
    assert_eq!(global.block_size(), 700);
    assert_eq!(global.step(), 7);
    assert_eq!(global.policy(), BlockPolicy::GlobalBlock { block_size: 700 });
    assert!(global.applies_increment_size_to_source_values());

    let partitioned = new_optimizer::<i64>(OptimizerConfig::per_partition(7));
    assert_eq!(partitioned.block_size(), 7);
    assert_eq!(partitioned.step(), 1);
}

#[test]
fn last_source_value_before_generate_is_illegal_state() {
    let global = new_optimizer::<i64>(OptimizerConfig::global_block(1));
    assert!(matches!(global.last_source_value(None), Err(Error::IllegalState)));

    let partitioned = new_optimizer::<i64>(OptimizerConfig::per_partition(1));
    assert!(matches!(partitioned.last_source_value(None), Err(Error::IllegalState)));
    assert!(matches!(
        partitioned.last_source_value(Some("acme")),
        Err(Error::IllegalState)
    ));
}

#[test]
fn global_block_advances_by_increment_size() {
    let optimizer = new_optimizer(OptimizerConfig::global_block(3).with_block_size(9));
    let mut source = MockSequence::new(1, 9);
    run_generates_sequence(&optimizer, &mut source, &[1, 4, 7, 10, 13, 16, 19]);
    assert_eq!(optimizer.source_fetches(), 3);
    assert_eq!(optimizer.last_source_value(None).unwrap(), 19);
}

#[test]
fn per_partition_hands_out_consecutive_values() {
    let optimizer = new_optimizer(OptimizerConfig::per_partition(5));
    let mut source = MockSequence::new(1, 5);
    let expected: Vec<i64> = (1..=12).collect();
    run_generates_sequence(&optimizer, &mut source, &expected);
    assert_eq!(optimizer.source_fetches(), 3);
    assert_eq!(optimizer.last_source_value(None).unwrap(), 11);
}

#[test]
fn per_partition_can_step_by_increment_size() {
    let optimizer = new_optimizer(OptimizerConfig::per_partition(4).with_step(Step::IncrementSize));
    let mut source = MockSequence::new(1, 4);
    run_generates_sequence(&optimizer, &mut source, &[1, 5, 9, 13]);
    assert_eq!(optimizer.source_fetches(), 4);
}

#[test]
fn replenishes_exactly_at_ceiling() {
    let optimizer = new_optimizer(OptimizerConfig::per_partition(4));
    // Blocks far apart, so a new block is recognizable by its first value.
    let mut source = MockSequence::new(100, 1000);

    for expected in 100..104 {
        assert_eq!(optimizer.generate(&mut source).unwrap(), expected);
        assert_eq!(optimizer.source_fetches(), 1);
    }
    assert_eq!(optimizer.generate(&mut source).unwrap(), 1100);
    assert_eq!(optimizer.source_fetches(), 2);
    assert_eq!(optimizer.last_source_value(None).unwrap(), 1100);
}

#[test]
fn sub_one_source_values_start_at_one() {
    let optimizer = new_optimizer(OptimizerConfig::per_partition(3));
    let mut source = MockSequence::new(-2, 3);
    run_generates_sequence(&optimizer, &mut source, &[1, 2, 3, 4]);
    assert_eq!(optimizer.source_fetches(), 3);

    let optimizer = new_optimizer(OptimizerConfig::global_block(3).with_block_size(9));
    let mut source = MockSequence::new(-2, 9);
    run_generates_sequence(&optimizer, &mut source, &[1, 4, 7, 10]);
    assert_eq!(optimizer.source_fetches(), 2);

    let optimizer = new_optimizer::<u64>(OptimizerConfig::per_partition(10));
    let mut zero = from_fn(|| -> Result<u64, Infallible> { Ok(0) });
    assert_eq!(optimizer.generate(&mut zero).unwrap(), 1);
    assert_eq!(optimizer.generate(&mut zero).unwrap(), 2);
}

#[test]
fn block_below_one_serves_one_id_per_fetch() {
    let optimizer = new_optimizer::<i64>(OptimizerConfig::per_partition(3));
    let mut values = [-10, -5, 100].into_iter();
    let mut source = from_fn(move || -> Result<i64, Infallible> { Ok(values.next().unwrap()) });

    let ids: Vec<i64> = (0..4)
        .map(|_| optimizer.generate(&mut source).unwrap())
        .collect();
    assert_eq!(ids, [1, 2, 100, 101]);
    assert_eq!(optimizer.source_fetches(), 3);
    assert_eq!(optimizer.last_source_value(None).unwrap(), 100);
}

#[test]
fn first_block_below_one_is_followed_by_the_next_source_value() {
    let optimizer = new_optimizer::<i64>(OptimizerConfig::per_partition(3));
    let mut values = [-2, 100].into_iter();
    let mut source = from_fn(move || -> Result<i64, Infallible> { Ok(values.next().unwrap()) });

    let ids: Vec<i64> = (0..3)
        .map(|_| optimizer.generate(&mut source).unwrap())
        .collect();
    assert_eq!(ids, [1, 100, 101]);
    assert_eq!(optimizer.source_fetches(), 2);
}

#[test]
fn stalled_source_still_yields_increasing_ids() {
    let optimizer = new_optimizer::<i64>(OptimizerConfig::per_partition(1));
    let mut stalled = from_fn(|| -> Result<i64, Infallible> { Ok(0) });

    let ids: Vec<i64> = (0..5)
        .map(|_| optimizer.generate(&mut stalled).unwrap())
        .collect();
    assert_eq!(ids, [1, 2, 3, 4, 5]);
    assert_eq!(optimizer.source_fetches(), 5);
}

#[test]
fn source_moving_backwards_never_repeats_ids() {
    let optimizer = new_optimizer::<i64>(OptimizerConfig::per_partition(4));
    let mut values = [50, 10, 60].into_iter();
    let mut source = from_fn(move || -> Result<i64, Infallible> { Ok(values.next().unwrap()) });

    let ids: Vec<i64> = (0..9)
        .map(|_| optimizer.generate(&mut source).unwrap())
        .collect();
    assert_eq!(ids, [50, 51, 52, 53, 54, 60, 61, 62, 63]);
    assert_eq!(optimizer.source_fetches(), 3);
}

#[test]
fn tenants_are_isolated_per_partition() {
    let optimizer = new_optimizer(OptimizerConfig::per_partition(4));
    run_tenants_are_isolated(&optimizer, &MockSequence::new(1, 4));
}

#[test]
fn tenants_are_isolated_global_block() {
    let optimizer = new_optimizer(OptimizerConfig::global_block(2).with_block_size(8));
    run_tenants_are_isolated(&optimizer, &MockSequence::new(1, 8));
}

#[test]
fn tenant_state_is_not_cached_per_thread() {
    let optimizer = new_optimizer(OptimizerConfig::per_partition(10));
    let source = MockSequence::new(1, 10);
    let mut acme = source.for_tenant("acme");
    let mut globex = source.for_tenant("globex");

    assert_eq!(optimizer.generate(&mut acme).unwrap(), 1);
    assert_eq!(optimizer.generate(&mut globex).unwrap(), 11);

    assert_eq!(optimizer.last_source_value(Some("acme")).unwrap(), 1);
    assert_eq!(optimizer.last_source_value(Some("globex")).unwrap(), 11);
    assert!(matches!(optimizer.last_source_value(None), Err(Error::IllegalState)));
    assert!(matches!(
        optimizer.last_source_value(Some("initech")),
        Err(Error::IllegalState)
    ));

    // The no-tenant partition draws its own block.
    let mut plain = source.clone();
    assert_eq!(optimizer.generate(&mut plain).unwrap(), 21);
    assert_eq!(optimizer.generate(&mut acme).unwrap(), 2);
}

#[test]
fn source_errors_propagate_and_retry_on_next_call() {
    let optimizer = new_optimizer::<i64>(OptimizerConfig::per_partition(2));
    let mut calls = 0;
    let mut flaky = from_fn(|| {
        calls += 1;
        if calls == 1 {
            Err(std::io::Error::other("connection reset"))
        } else {
            Ok(1i64)
        }
    });

    match optimizer.generate(&mut flaky) {
        Err(Error::Source(e)) => assert_eq!(e.to_string(), "connection reset"),
        other => panic!("expected source error, got {other:?}"),
    }
    assert_eq!(optimizer.source_fetches(), 0);
    assert!(matches!(optimizer.last_source_value(None), Err(Error::IllegalState)));

    assert_eq!(optimizer.generate(&mut flaky).unwrap(), 1);
    assert_eq!(optimizer.generate(&mut flaky).unwrap(), 2);
    assert_eq!(optimizer.source_fetches(), 1);
}

#[test]
fn block_overflow_is_reported() {
    let optimizer = new_optimizer(OptimizerConfig::per_partition(10));
    let mut source = MockSequence::new(i64::MAX - 5, 10);
    let err = optimizer.generate(&mut source).unwrap_err();
    assert!(matches!(err, Error::Overflow { block_size: 10, .. }));
}

#[test]
fn global_block_threads_receive_distinct_ids() {
    let optimizer = new_optimizer(OptimizerConfig::global_block(1).with_block_size(100));
    let source = MockSequence::new(1, 100);
    run_threads_receive_distinct_ids(&optimizer, &source);
    // Every block is shared, so fetches track the total only.
    assert_eq!(optimizer.source_fetches(), 800);
}

#[test]
fn per_partition_threads_receive_distinct_ids() {
    const BLOCK: i64 = 50;
    let optimizer = new_optimizer(OptimizerConfig::per_partition(BLOCK));
    let source = MockSequence::new(1, BLOCK);
    let per_thread = run_threads_receive_distinct_ids(&optimizer, &source);

    for ids in per_thread {
        for w in ids.windows(2) {
            // Consecutive within a block, jumps only at block boundaries.
            let starts_block = (w[1] - 1) % BLOCK == 0;
            assert!(w[1] == w[0] + 1 || starts_block, "gap inside block: {w:?}");
        }
    }
    assert_eq!(optimizer.source_fetches(), 8 * 10_000 / 50);
}

#[test]
fn per_partition_threads_each_draw_a_block() {
    let optimizer = new_optimizer(OptimizerConfig::per_partition(10));
    let source = MockSequence::new(1, 10);

    scope(|s| {
        for _ in 0..4 {
            let mut source = source.clone();
            let optimizer = &optimizer;
            s.spawn(move || {
                let id = optimizer.generate(&mut source).unwrap();
                assert_eq!((id - 1) % 10, 0);
                assert_eq!(optimizer.last_source_value(None).unwrap(), id);
            });
        }
    });
    assert_eq!(optimizer.source_fetches(), 4);
}

#[test]
fn global_block_threads_share_one_block() {
    let optimizer = new_optimizer(OptimizerConfig::global_block(1).with_block_size(100));
    let source = MockSequence::new(1, 100);

    scope(|s| {
        for _ in 0..4 {
            let mut source = source.clone();
            let optimizer = &optimizer;
            s.spawn(move || {
                let id = optimizer.generate(&mut source).unwrap();
                assert!((1..=4).contains(&id));
            });
        }
    });
    assert_eq!(optimizer.source_fetches(), 1);
    assert_eq!(optimizer.last_source_value(None).unwrap(), 1);
}

#[test]
fn released_thread_draws_a_fresh_block() {
    let optimizer = new_optimizer(OptimizerConfig::per_partition(10));
    let mut source = MockSequence::new(1, 10);

    assert_eq!(optimizer.generate(&mut source).unwrap(), 1);
    optimizer.release_current_thread();
    assert!(matches!(optimizer.last_source_value(None), Err(Error::IllegalState)));

    assert_eq!(optimizer.generate(&mut source).unwrap(), 11);
    assert_eq!(optimizer.source_fetches(), 2);
    assert_eq!(optimizer.last_source_value(None).unwrap(), 11);
}

#[test]
fn released_thread_rejoins_the_global_block() {
    let optimizer = new_optimizer(OptimizerConfig::global_block(1).with_block_size(10));
    let mut source = MockSequence::new(1, 10);

    assert_eq!(optimizer.generate(&mut source).unwrap(), 1);
    optimizer.release_current_thread();
    assert_eq!(optimizer.generate(&mut source).unwrap(), 2);
    assert_eq!(optimizer.source_fetches(), 1);
}

#[test]
fn narrow_value_types_are_supported() {
    let optimizer = new_optimizer::<u32>(OptimizerConfig::global_block(2).with_block_size(4));
    let mut next = 0u32;
    let mut source = from_fn(|| -> Result<u32, Infallible> {
        let start = next;
        next += 4;
        Ok(start)
    });
    let ids: Vec<u32> = (0..4)
        .map(|_| optimizer.generate(&mut source).unwrap())
        .collect();
    assert_eq!(ids, [1, 3, 4, 6]);
}

#[test]
fn exited_threads_leave_no_cached_state() {
    let per_partition = new_optimizer(OptimizerConfig::per_partition(10));
    let global = new_optimizer(OptimizerConfig::global_block(1).with_block_size(10));
    let source = MockSequence::new(1, 10);

    scope(|s| {
        for _ in 0..1000 {
            s.spawn(|| {
                let mut source = source.clone();
                per_partition.generate(&mut source).unwrap();
                global.generate(&mut source).unwrap();
                assert_eq!(per_partition.cached_threads(), 1);
            })
            .join()
            .unwrap();
        }
    });

    assert_eq!(per_partition.cached_threads(), 0);
    assert_eq!(global.cached_threads(), 0);
    assert_eq!(per_partition.source_fetches(), 1000);
    assert_eq!(global.source_fetches(), 100);
}
