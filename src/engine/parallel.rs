//! Parallel Sibling Executor (§4.4): fan-out of sibling evaluations into a
//! bounded worker pool, panic-safe and cancellation-safe.
//!
//! Built on `rayon` (the teacher's own dependency, used for exactly this
//! shape of fan-out in `storage_engine/mod.rs`): a fixed-size pool created
//! per call. Chunk outcomes stream back over a channel so that once an
//! error or panic is observed, every chunk not yet picked up by a worker
//! is skipped instead of started (§4.4, §8 scenario S6) — but a chunk a
//! worker has already started cannot be preempted mid-flight, and this
//! call never returns while any of its workers are still running: the
//! channel is drained to exhaustion and the pool is dropped (joined) on
//! the calling thread before `eval_children_parallel` returns, so no work
//! continues in the background once the call completes.

use super::traversal::{eval_node, should_retain};
use super::EngineCtx;
use crate::backend::Backend;
use crate::context::EvalContext;
use crate::error::{IndigoError, Result};
use crate::result::EvalResult;
use crate::rule::{EvalOptions, ResolvedOptions, Rule};
use crate::value::Data;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

enum ChunkMessage {
    Done(BTreeMap<String, EvalResult>, u64),
    Failed(IndigoError),
    Skipped,
}

/// Evaluate `children` in parallel under `opts.parallel`, merging their
/// retained results. Result order is unspecified (§4.4); the aggregate
/// `pass` computed by the caller does not depend on it.
pub(crate) fn eval_children_parallel<B: Backend>(
    engine_ctx: &EngineCtx<B>,
    ctx: &EvalContext,
    children: &[Arc<Rule<B>>],
    data: &Data,
    opts: &ResolvedOptions,
    global: &EvalOptions,
) -> Result<(BTreeMap<String, EvalResult>, u64)> {
    let p = opts
        .parallel
        .expect("eval_children_parallel called without parallel options");
    debug_assert!(!p.is_sequential());

    let batch_size = p.batch_size.max(1);
    let chunks: Vec<Vec<Arc<Rule<B>>>> = children.chunks(batch_size).map(|c| c.to_vec()).collect();
    let total_chunks = chunks.len();
    let num_workers = p.max_parallel.min(total_chunks.max(1)).max(1);

    let pool = Arc::new(
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .build()
            .map_err(|e| IndigoError::Argument(format!("failed to build worker pool: {e}")))?,
    );

    let soft_stop = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel::<ChunkMessage>();

    for chunk in chunks {
        let engine_ctx = engine_ctx.clone();
        let ctx = ctx.clone();
        let data = data.clone();
        let opts = opts.clone();
        let global = global.clone();
        let soft_stop = Arc::clone(&soft_stop);
        let tx = tx.clone();
        pool.spawn(move || {
            if soft_stop.load(Ordering::Acquire) || ctx.poll().is_err() {
                let _ = tx.send(ChunkMessage::Skipped);
                return;
            }

            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                eval_chunk(&engine_ctx, &ctx, &chunk, &data, &opts, &global, &soft_stop)
            }));

            let message = match outcome {
                Ok(Ok(v)) => ChunkMessage::Done(v.0, v.1),
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "parallel worker returned an error");
                    ChunkMessage::Failed(e)
                }
                Err(panic) => {
                    let message = panic_message(&panic);
                    let rule_id = chunk.first().map(|r| r.id.to_string()).unwrap_or_default();
                    tracing::warn!(rule_id = %rule_id, message = %message, "parallel worker panicked");
                    ChunkMessage::Failed(IndigoError::ParallelEvaluationPanic { rule_id, message })
                }
            };
            let _ = tx.send(message);
        });
    }
    drop(tx);

    // Drain every chunk's outcome before returning: each spawned closure
    // unconditionally sends exactly one message, so looping until the
    // channel is exhausted (every sender dropped) guarantees every worker
    // has finished by the time this function returns — no detached
    // teardown, no straggler left running in the background. `soft_stop`
    // is set as soon as the first failure arrives, so any chunk a worker
    // has not yet started skips itself instead of running; a chunk already
    // in flight when the failure arrives still runs to completion, since
    // rayon offers no way to preempt a worker mid-closure.
    let mut merged = BTreeMap::new();
    let mut total = 0u64;
    let mut first_error = None;

    while let Ok(message) = rx.recv() {
        match message {
            ChunkMessage::Done(results, count) => {
                merged.extend(results);
                total += count;
            }
            ChunkMessage::Failed(e) => {
                soft_stop.store(true, Ordering::Release);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            ChunkMessage::Skipped => {}
        }
    }
    drop(pool);

    if let Some(err) = first_error {
        return Err(err);
    }
    ctx.poll()?;
    Ok((merged, total))
}

/// Evaluate one chunk's children sequentially on a worker thread, against
/// a private copy of `data` (§4.4, §9: copy rather than mutate the shared
/// map to eliminate the `self`-injection write hazard).
fn eval_chunk<B: Backend>(
    engine_ctx: &EngineCtx<B>,
    ctx: &EvalContext,
    chunk: &[Arc<Rule<B>>],
    data: &Data,
    opts: &ResolvedOptions,
    global: &EvalOptions,
    soft_stop: &AtomicBool,
) -> Result<(BTreeMap<String, EvalResult>, u64)> {
    let mut local_data = data.clone();
    let mut results = BTreeMap::new();
    let mut rules_evaluated = 0u64;

    for child in chunk {
        ctx.poll()?;
        let child_result = eval_node(engine_ctx, ctx, child, &mut local_data, opts, global)?;
        rules_evaluated += child_result.rules_evaluated;
        let passed = child_result.pass;

        if should_retain(&child_result, opts) {
            results.insert(child_result.rule_id.clone(), child_result);
        }

        if (opts.stop_first_positive_child && passed) || (opts.stop_first_negative_child && !passed)
        {
            soft_stop.store(true, Ordering::Release);
            break;
        }
    }

    Ok((results, rules_evaluated))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked with a non-string payload".to_string()
    }
}
