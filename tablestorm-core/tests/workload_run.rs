//! End-to-end workload runs against the in-memory engine.

use std::sync::Arc;
use std::time::Duration;

use tablestorm_core::{
    expand_over_tables, populate_with_range, CancelToken, Context, ContextOptions, Error,
    KeySpec, MonitorConfig, OpKind, Operation, TableOptions, ThreadSpec, ThrottleConfig,
    WorkloadBuilder, WorkloadOptions,
};
use tablestorm_engine::MemoryEngine;

fn context(table_count: usize, dir: &tempfile::TempDir) -> Context<MemoryEngine> {
    Context::create(
        MemoryEngine::new(),
        ContextOptions {
            table_count,
            table_options: TableOptions::default(),
            output_dir: dir.path().join("out"),
            seed: Some(1234),
        },
    )
    .unwrap()
}

fn timed(run_time: Duration) -> WorkloadOptions {
    WorkloadOptions { run_time: Some(run_time), ..WorkloadOptions::default() }
}

fn uniform_thread(name: &str, op: fn(Arc<tablestorm_core::Table>, KeySpec) -> Operation,
                  ctx: &Context<MemoryEngine>) -> ThreadSpec {
    ThreadSpec {
        name: name.into(),
        ops: vec![op(Arc::clone(&ctx.tables()[0]), KeySpec::Uniform { range: 100_000 })],
        throttle: None,
    }
}

#[test]
fn test_timed_run_respects_duration() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(1, &dir);
    let workload = WorkloadBuilder::new(timed(Duration::from_millis(300)))
        .add_thread_group(uniform_thread("inserts", Operation::insert, &ctx), 2)
        .build()
        .unwrap();

    let summary = workload.run(&ctx).unwrap();

    assert!(summary.elapsed >= Duration::from_millis(300));
    assert!(summary.elapsed < Duration::from_secs(3), "shutdown took {:?}", summary.elapsed);
    assert!(summary.total_ops > 0);
    assert!(summary.report_path.is_file());
}

#[test]
fn test_throttle_bounds_throughput() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(1, &dir);
    let mut thread = uniform_thread("inserts", Operation::insert, &ctx);
    thread.throttle = Some(ThrottleConfig { ops_per_sec: 100.0, burst: 0.5 });

    let workload = WorkloadBuilder::new(timed(Duration::from_secs(1)))
        .add_thread(thread)
        .build()
        .unwrap();
    let summary = workload.run(&ctx).unwrap();

    let inserts = summary.ops(OpKind::Insert);
    // 100 ops/s for ~1s plus a 50-op burst, with slack for timing jitter.
    assert!(inserts <= 200, "throttle let through {inserts} inserts");
    assert!(inserts >= 40, "throttle starved the worker: {inserts} inserts");
}

#[test]
fn test_idle_cycle_fatal_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(2, &dir);
    ctx.engine().set_idle_sweep_latency(Duration::from_secs(5));

    let mut options = timed(Duration::from_secs(30));
    options.idle_cycle = Some(MonitorConfig {
        threshold: Duration::from_millis(100),
        fatal: true,
        cadence: Duration::from_millis(10),
    });
    let workload = WorkloadBuilder::new(options)
        .add_thread(uniform_thread("reads", Operation::search, &ctx))
        .build()
        .unwrap();

    let started = std::time::Instant::now();
    let err = workload.run(&ctx);
    assert!(started.elapsed() < Duration::from_secs(10), "fatal abort must not wait for run_time");
    match err {
        Err(Error::IdleCycle { observed, threshold }) => {
            assert_eq!(observed, Duration::from_secs(5));
            assert_eq!(threshold, Duration::from_millis(100));
        }
        other => panic!("expected idle-cycle error, got {other:?}"),
    }

    // The report is still written, carrying the fatal status.
    let report = std::fs::read_to_string(dir.path().join("out/latency.out")).unwrap();
    assert!(report.starts_with("# elapsed_s="));
    assert!(report.contains("status=fatal"), "report was: {report}");
}

#[test]
fn test_idle_cycle_warns_without_aborting() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(2, &dir);
    ctx.engine().set_idle_sweep_latency(Duration::from_secs(5));

    let mut options = timed(Duration::from_millis(300));
    options.idle_cycle = Some(MonitorConfig {
        threshold: Duration::from_millis(100),
        fatal: false,
        cadence: Duration::from_millis(20),
    });
    let workload = WorkloadBuilder::new(options)
        .add_thread(uniform_thread("reads", Operation::search, &ctx))
        .build()
        .unwrap();

    let summary = workload.run(&ctx).unwrap();
    assert!(summary.idle_cycle_warnings > 0, "threshold crossings must be counted");
}

#[test]
fn test_external_cancel_terminates_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(1, &dir);
    let workload = WorkloadBuilder::new(timed(Duration::from_secs(30)))
        .add_thread_group(uniform_thread("inserts", Operation::insert, &ctx), 2)
        .build()
        .unwrap();

    let token = CancelToken::new();
    let started = std::time::Instant::now();
    let summary = std::thread::scope(|scope| {
        let canceller = token.clone();
        scope.spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            canceller.cancel();
        });
        workload.run_with_cancel(&ctx, token.clone())
    })
    .unwrap();

    // Cancellation is a clean termination, not an error: the run drains well
    // before its 30s deadline and still reports what it measured.
    assert!(started.elapsed() < Duration::from_secs(5), "cancel was not prompt");
    assert!(token.is_cancelled());
    assert!(summary.total_ops > 0);

    let report = std::fs::read_to_string(summary.report_path).unwrap();
    assert!(report.lines().next().unwrap().contains("status=ok"), "report was: {report}");
}

#[test]
fn test_engine_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(1, &dir);
    ctx.engine().fail_after(25);

    let workload = WorkloadBuilder::new(timed(Duration::from_secs(30)))
        .add_thread(uniform_thread("inserts", Operation::insert, &ctx))
        .build()
        .unwrap();

    match workload.run(&ctx) {
        Err(Error::Engine(_)) => {}
        other => panic!("expected engine error, got {other:?}"),
    }
}

#[test]
fn test_populate_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(3, &dir);
    let icount = 900;

    let sequences = populate_with_range(ctx.tables(), icount, 101_000, 2).unwrap();
    let mut builder = WorkloadBuilder::new(WorkloadOptions::default());
    for ops in sequences {
        builder = builder.add_thread(ThreadSpec { name: "populate".into(), ops, throttle: None });
    }
    let summary = builder.build().unwrap().run(&ctx).unwrap();

    assert_eq!(summary.ops(OpKind::Insert), icount);
    let stored: usize = (0..3)
        .map(|i| ctx.engine().table_len(&format!("test{i:05}")).unwrap())
        .sum();
    assert_eq!(stored as u64, icount, "every populate key must land exactly once");
}

#[test]
fn test_mixed_workload_over_many_tables() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(10, &dir);

    // Seed a little data so searches have something to hit.
    let populate = populate_with_range(ctx.tables(), 500, 101_000, 1).unwrap();
    let mut builder = WorkloadBuilder::new(WorkloadOptions::default());
    for ops in populate {
        builder = builder.add_thread(ThreadSpec { name: "populate".into(), ops, throttle: None });
    }
    builder.build().unwrap().run(&ctx).unwrap();

    let insert_template =
        Operation::insert(Arc::clone(&ctx.tables()[0]), KeySpec::Uniform { range: 101_000 });
    let search_template =
        Operation::search(Arc::clone(&ctx.tables()[0]), KeySpec::Pareto { range: 101_000, skew: 10.0 });

    let mut builder = WorkloadBuilder::new(timed(Duration::from_millis(500)));
    for worker in 0..2 {
        builder = builder.add_thread(ThreadSpec {
            name: "inserts".into(),
            ops: expand_over_tables(&insert_template, ctx.tables(), false, worker, 2).unwrap(),
            throttle: Some(ThrottleConfig { ops_per_sec: 1000.0, burst: 1.0 }),
        });
    }
    for worker in 0..2 {
        builder = builder.add_thread(ThreadSpec {
            name: "reads".into(),
            ops: expand_over_tables(&search_template, ctx.tables(), false, worker, 2).unwrap(),
            throttle: None,
        });
    }
    let summary = builder.build().unwrap().run(&ctx).unwrap();

    assert!(summary.ops(OpKind::Insert) > 0);
    assert!(summary.ops(OpKind::Search) > 0);
    assert_eq!(summary.ops(OpKind::Update), 0);

    let insert = summary.op(OpKind::Insert).unwrap();
    assert!(insert.max_us >= insert.p50_us, "percentiles must be ordered");

    // Unpartitioned expansion drives traffic into every table.
    let touched = (0..10)
        .filter(|i| ctx.engine().table_len(&format!("test{i:05}")).unwrap() > 0)
        .count();
    assert_eq!(touched, 10, "all tables should see inserts");

    let report = std::fs::read_to_string(summary.report_path).unwrap();
    assert!(report.contains("op=insert "));
    assert!(report.contains("op=checkpoint ops=0"));
    assert!(report.lines().next().unwrap().contains("status=ok"));
}

#[test]
fn test_throttled_inserts_balanced_across_tables() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(3, &dir);

    let template =
        Operation::insert(Arc::clone(&ctx.tables()[0]), KeySpec::Uniform { range: 101_000 });
    let mut builder = WorkloadBuilder::new(timed(Duration::from_secs(2)));
    for worker in 0..2 {
        builder = builder.add_thread(ThreadSpec {
            name: "inserts".into(),
            ops: expand_over_tables(&template, ctx.tables(), false, worker, 2).unwrap(),
            throttle: Some(ThrottleConfig { ops_per_sec: 100.0, burst: 1.0 }),
        });
    }
    let summary = builder.build().unwrap().run(&ctx).unwrap();

    // Two threads at 100 ops/s for 2s: ~400 inserts plus up to one burst
    // window each, minus scheduling slack.
    let inserts = summary.ops(OpKind::Insert);
    assert!((150..=650).contains(&inserts), "got {inserts} inserts");
    assert_eq!(summary.ops(OpKind::Search), 0);

    // Uniform keys cycled over all tables spread the load evenly.
    let counts: Vec<usize> =
        (0..3).map(|i| ctx.engine().table_len(&format!("test{i:05}")).unwrap()).collect();
    let (min, max) = (counts.iter().min().unwrap(), counts.iter().max().unwrap());
    assert!(max - min <= 2, "unbalanced table spread: {counts:?}");

    let insert = summary.op(OpKind::Insert).unwrap();
    assert!(insert.p50_us > 0 || insert.max_us > 0, "insert percentiles must be populated");
}

#[test]
fn test_checkpoint_thread_alongside_workers() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(2, &dir);

    let checkpoint = ThreadSpec {
        name: "checkpoint".into(),
        ops: vec![Operation::sleep(Duration::from_millis(100)), Operation::checkpoint()],
        throttle: None,
    };
    let workload = WorkloadBuilder::new(timed(Duration::from_millis(450)))
        .add_thread(uniform_thread("inserts", Operation::insert, &ctx))
        .add_thread(checkpoint)
        .build()
        .unwrap();

    let summary = workload.run(&ctx).unwrap();
    let checkpoints = summary.ops(OpKind::Checkpoint);
    assert!(checkpoints >= 1, "checkpoint thread never fired");
    assert!(checkpoints <= 6, "checkpoint cadence ignored the sleep: {checkpoints}");
}
