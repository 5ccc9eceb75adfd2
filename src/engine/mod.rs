//! The Evaluation Engine: compiling rule trees and walking them against
//! input records (§4.3, §4.4).

mod parallel;
mod traversal;

use crate::backend::Backend;
use crate::config::EngineConfig;
use crate::context::EvalContext;
use crate::error::{IndigoError, Result};
use crate::result::EvalResult;
use crate::rule::{EvalOptions, Rule};
use crate::value::Data;
use std::sync::Arc;

/// Options controlling a single compile pass (§4.2).
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub collect_diagnostics: bool,
    pub dry_run: bool,
}

/// Shared, cheaply-cloneable context handed down through every recursive
/// traversal and worker: just the backend, since everything else
/// (inherited/global options) is threaded explicitly.
pub(crate) struct EngineCtx<B: Backend> {
    pub backend: Arc<B>,
}

impl<B: Backend> Clone for EngineCtx<B> {
    fn clone(&self) -> Self {
        EngineCtx {
            backend: Arc::clone(&self.backend),
        }
    }
}

/// Recursively compile `rule` and its shards/children via `backend`
/// (§4.2, §6). On failure, partially compiled nodes may be left with
/// `program` set; there is no rollback (§6).
pub fn compile_tree<B: Backend>(
    backend: &B,
    rule: &mut Rule<B>,
    opts: &CompileOptions,
) -> Result<()> {
    if !rule.expr.is_empty() {
        let program = backend.compile(
            &rule.expr,
            rule.schema.as_ref(),
            rule.result_type,
            opts.collect_diagnostics,
            opts.dry_run,
        )?;
        if !opts.dry_run {
            rule.program = Some(Arc::new(program));
            rule.diagnostics_compiled = opts.collect_diagnostics;
        }
    } else {
        rule.program = None;
        rule.diagnostics_compiled = opts.collect_diagnostics;
    }
    for shard in rule.shards.iter_mut() {
        let node = Arc::get_mut(shard).expect("uncompiled tree is exclusively owned");
        compile_tree(backend, node, opts)?;
    }
    for child in rule.children.iter_mut() {
        let node = Arc::get_mut(child).expect("uncompiled tree is exclusively owned");
        compile_tree(backend, node, opts)?;
    }
    Ok(())
}

/// The host-facing entry point: `new_engine(backend)`, `engine.compile`,
/// `engine.eval` (§6).
pub struct Engine<B: Backend> {
    backend: Arc<B>,
    config: EngineConfig,
}

impl<B: Backend> Engine<B> {
    pub fn new(backend: B) -> Self {
        Engine {
            backend: Arc::new(backend),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(backend: B, config: EngineConfig) -> Self {
        Engine {
            backend: Arc::new(backend),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Recursively compile `rule`'s tree via the backend (§6).
    pub fn compile(&self, rule: &mut Rule<B>, opts: CompileOptions) -> Result<()> {
        compile_tree(self.backend.as_ref(), rule, &opts)
    }

    /// Walk `rule` against `data`, honoring `opts` as the call-site global
    /// override (§4.3).
    pub fn eval(
        &self,
        ctx: &EvalContext,
        rule: &Rule<B>,
        data: &mut Data,
        opts: EvalOptions,
    ) -> Result<EvalResult> {
        if opts.has_conflicting_sort_and_parallel() {
            return Err(IndigoError::Argument(
                "sort_fn and parallel must not both be active".to_string(),
            ));
        }
        let span = tracing::info_span!("indigo.eval", rule_id = %rule.id);
        let _enter = span.enter();

        let engine_ctx = EngineCtx {
            backend: Arc::clone(&self.backend),
        };
        // The root's inherited baseline starts from this engine's configured
        // `default_parallel` rather than unconditionally sequential, so a
        // rule that never sets its own `parallel` option (and whose call
        // site doesn't override it either) fans its children out using the
        // engine's configured default instead of running sequentially.
        let parent = crate::rule::ResolvedOptions {
            parallel: self.config.default_parallel,
            ..crate::rule::ResolvedOptions::default()
        };
        traversal::eval_node(&engine_ctx, ctx, rule, data, &parent, &opts)
    }
}
