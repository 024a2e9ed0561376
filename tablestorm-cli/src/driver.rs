//! Profile execution
//!
//! Turns a validated [`ProfileConfig`] into harness phases and runs them in
//! order: create the context and table set, populate if configured, then the
//! timed main workload with its optional checkpoint thread and watchdog.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tablestorm_core::{
    expand_over_tables, populate_with_range, CancelToken, Context, KeySpec, Operation,
    RunSummary, StorageEngine, ThreadSpec, ThrottleConfig, WorkloadBuilder,
};

use crate::config::{PopulateConfig, ProfileConfig, ThreadGroupConfig};

/// Outcome of a full profile run.
#[derive(Debug)]
pub struct RunReport {
    pub populate: Option<RunSummary>,
    pub main: RunSummary,
}

/// Run the whole profile against a fresh engine connection. The connection
/// is closed whether the phases succeed or abort; a fatal phase error
/// propagates after its latency report is on disk.
pub fn run_profile<E: StorageEngine>(engine: E, config: &ProfileConfig) -> Result<RunReport> {
    run_profile_with_cancel(engine, config, CancelToken::new())
}

/// Like [`run_profile`], with a caller-held [`CancelToken`]. Cancelling ends
/// the current phase cleanly; any phases not yet started exit immediately.
pub fn run_profile_with_cancel<E: StorageEngine>(
    engine: E,
    config: &ProfileConfig,
    token: CancelToken,
) -> Result<RunReport> {
    let ctx = Context::create(engine, config.context_options())
        .context("creating run context")?;

    let outcome = run_phases(&ctx, config, &token);

    // The connection is torn down on every path. A close failure must not
    // mask the phase error that aborted the run.
    match (outcome, ctx.close()) {
        (Ok(report), Ok(())) => Ok(report),
        (Ok(_), Err(close_err)) => Err(close_err).context("closing engine connection"),
        (Err(phase_err), Ok(())) => Err(phase_err),
        (Err(phase_err), Err(close_err)) => {
            tracing::warn!(error = %close_err, "engine close failed after aborted run");
            Err(phase_err)
        }
    }
}

fn run_phases<E: StorageEngine>(
    ctx: &Context<E>,
    config: &ProfileConfig,
    token: &CancelToken,
) -> Result<RunReport> {
    let populate = match &config.populate {
        Some(populate) => Some(run_populate(ctx, config, populate, token.clone())?),
        None => None,
    };
    let main = run_main(ctx, config, token.clone())?;
    Ok(RunReport { populate, main })
}

fn run_populate<E: StorageEngine>(
    ctx: &Context<E>,
    config: &ProfileConfig,
    populate: &PopulateConfig,
    token: CancelToken,
) -> Result<RunSummary> {
    let random_range = populate.random_range.unwrap_or(populate.icount);
    tracing::info!(
        icount = populate.icount,
        threads = populate.threads,
        random_range,
        "populate phase"
    );

    let sequences =
        populate_with_range(ctx.tables(), populate.icount, random_range, populate.threads)?;
    let mut builder = WorkloadBuilder::new(config.populate_options());
    for ops in sequences {
        builder = builder.add_thread(ThreadSpec { name: "populate".into(), ops, throttle: None });
    }
    Ok(builder.build()?.run_with_cancel(ctx, token)?)
}

fn group_keys(group: &ThreadGroupConfig, key_range: u64) -> KeySpec {
    match group.pareto {
        Some(skew) => KeySpec::Pareto { range: key_range, skew },
        None => KeySpec::Uniform { range: key_range },
    }
}

fn run_main<E: StorageEngine>(
    ctx: &Context<E>,
    config: &ProfileConfig,
    token: CancelToken,
) -> Result<RunSummary> {
    let mut builder = WorkloadBuilder::new(config.main_options());
    let any_table = Arc::clone(&ctx.tables()[0]);

    for (index, group) in config.threads.iter().enumerate() {
        let name = group.display_name(index);
        let keys = group_keys(group, config.tables.key_range);
        let templates: Vec<(u32, Operation)> = vec![
            (group.inserts, Operation::insert(Arc::clone(&any_table), keys)),
            (group.reads, Operation::search(Arc::clone(&any_table), keys)),
            (group.updates, Operation::update(Arc::clone(&any_table), keys)),
        ];

        for worker in 0..group.count {
            let mut ops = Vec::new();
            for (repeat, template) in &templates {
                for _ in 0..*repeat {
                    ops.extend(expand_over_tables(
                        template,
                        ctx.tables(),
                        group.partitioned,
                        worker,
                        group.count,
                    )?);
                }
            }
            builder = builder.add_thread(ThreadSpec {
                name: name.clone(),
                ops,
                throttle: group.throttle.map(|ops_per_sec| ThrottleConfig {
                    ops_per_sec,
                    burst: group.throttle_burst,
                }),
            });
        }
    }

    if let Some(checkpoint) = &config.checkpoint {
        builder = builder.add_thread(ThreadSpec {
            name: "checkpoint".into(),
            ops: vec![Operation::sleep(checkpoint.interval), Operation::checkpoint()],
            throttle: None,
        });
    }

    tracing::info!(run_time = ?config.experiment.run_time, "main workload phase");
    Ok(builder.build()?.run_with_cancel(ctx, token)?)
}
