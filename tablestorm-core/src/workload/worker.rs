//! Worker thread execution
//!
//! Each worker owns one engine session and cycles through its operation
//! sequence until told to stop, a finite key range runs dry, or the engine
//! fails. Only the engine call itself is timed; throttle waits and sleeps
//! never pollute the latency figures.

use std::time::Instant;

use tablestorm_engine::{Session, StorageEngine};

use crate::context::Context;
use crate::seed::{derive_seed, op_seed_label};
use crate::stats::LatencyRecorder;

use super::key::{format_key, KeyGenerator};
use super::ops::Operation;
use super::throttle::{Throttle, ThrottleConfig};
use super::value::build_value;
use super::{FatalCause, StopSignal};

/// Blueprint for one worker thread: a name (shared by all workers of a
/// group), the operation cycle, and an optional rate limit.
#[derive(Debug, Clone)]
pub struct ThreadSpec {
    pub name: String,
    pub ops: Vec<Operation>,
    pub throttle: Option<ThrottleConfig>,
}

/// Body of one worker thread.
///
/// In timed mode the loop cycles until the stop signal fires. With
/// `run_to_completion` the worker instead exits once every finite key range
/// in its sequence is exhausted (or after one pass if it has none), which is
/// how populate phases terminate.
pub(crate) fn run_worker<E: StorageEngine>(
    spec: &ThreadSpec,
    worker_index: usize,
    ctx: &Context<E>,
    recorder: &LatencyRecorder,
    stop: &StopSignal,
    run_to_completion: bool,
) {
    let mut session = match ctx.engine().open_session() {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(worker = %spec.name, worker_index, error = %e, "session open failed");
            stop.abort(FatalCause::Engine(e));
            return;
        }
    };

    // One independent key stream per keyed operation slot.
    let mut generators: Vec<Option<KeyGenerator>> = Vec::with_capacity(spec.ops.len());
    for (slot, op) in spec.ops.iter().enumerate() {
        match op.keys() {
            Some(keys) => {
                let seed = derive_seed(
                    ctx.master_seed(),
                    &op_seed_label(&spec.name, worker_index, slot),
                );
                match keys.instantiate(seed) {
                    Ok(keygen) => generators.push(Some(keygen)),
                    Err(e) => {
                        stop.abort(FatalCause::Setup(format!(
                            "worker {}/{worker_index} op {slot}: {e}",
                            spec.name
                        )));
                        return;
                    }
                }
            }
            None => generators.push(None),
        }
    }

    let mut throttle = spec.throttle.as_ref().map(Throttle::new);
    let keyed_slots = generators.iter().filter(|g| g.is_some()).count();
    let mut exhausted = 0usize;

    'run: loop {
        for (slot, op) in spec.ops.iter().enumerate() {
            if stop.is_stopped() {
                break 'run;
            }

            // Sleeps are not throttled and not measured.
            if let Operation::Sleep { duration } = op {
                stop.sleep_unless_stopped(*duration);
                continue;
            }

            let key = if op.keys().is_some() {
                match generators[slot].as_mut().and_then(KeyGenerator::next_key) {
                    Some(key) => Some(key),
                    None => {
                        // Finite range drained; count it once, then skip the
                        // slot for the rest of the run.
                        if generators[slot].take().is_some() {
                            exhausted += 1;
                            // Exit when nothing runnable remains: always in
                            // run-to-completion mode, and in timed mode when
                            // the sequence has no sleeps or checkpoints.
                            if exhausted == keyed_slots
                                && (run_to_completion || keyed_slots == spec.ops.len())
                            {
                                break 'run;
                            }
                        }
                        continue;
                    }
                }
            } else {
                None
            };

            if let Some(throttle) = &mut throttle {
                if let Some(wait) = throttle.acquire() {
                    if !stop.sleep_unless_stopped(wait) {
                        break 'run;
                    }
                }
            }

            let start = Instant::now();
            let result = match (op, key) {
                (Operation::Insert { table, .. }, Some(key)) => session.insert(
                    &table.name,
                    &format_key(key, table.options.key_size),
                    &build_value(key, table.options.value_size),
                ),
                (Operation::Update { table, .. }, Some(key)) => session.update(
                    &table.name,
                    &format_key(key, table.options.key_size),
                    &build_value(key, table.options.value_size),
                ),
                (Operation::Search { table, .. }, Some(key)) => session
                    .search(&table.name, &format_key(key, table.options.key_size))
                    .map(|_| ()),
                (Operation::Checkpoint, _) => session.checkpoint(),
                _ => continue,
            };
            let latency = start.elapsed();

            match result {
                Ok(()) => recorder.record(op.kind(), latency),
                Err(e) => {
                    tracing::error!(
                        worker = %spec.name,
                        worker_index,
                        op = op.kind().name(),
                        error = %e,
                        "engine operation failed, aborting run"
                    );
                    stop.abort(FatalCause::Engine(e));
                    break 'run;
                }
            }
        }

        // A sequence with no keyed slots (checkpoint-only, say) makes
        // exactly one pass in run-to-completion mode.
        if run_to_completion && keyed_slots == 0 {
            break;
        }
    }

    tracing::debug!(worker = %spec.name, worker_index, "worker exiting");
}
