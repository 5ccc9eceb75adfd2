//! Traversal Engine (§4.3): the recursive per-rule evaluation algorithm.

use super::parallel;
use super::EngineCtx;
use crate::backend::Backend;
use crate::context::EvalContext;
use crate::error::{IndigoError, Result};
use crate::result::EvalResult;
use crate::rule::{DiscardFail, EvalOptions, ResolvedOptions, Rule, SortFn};
use crate::value::{Data, SELF_KEY};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Evaluate a single rule against `data`, recursing into its children per
/// the ten-step algorithm in §4.3.
pub(crate) fn eval_node<B: Backend>(
    engine_ctx: &EngineCtx<B>,
    ctx: &EvalContext,
    rule: &Rule<B>,
    data: &mut Data,
    parent_resolved: &ResolvedOptions,
    global: &EvalOptions,
) -> Result<EvalResult> {
    ctx.poll()?;

    // Step 1: merge per-rule options into the inherited set; global
    // options from the call override both.
    let opts = parent_resolved.merge(&rule.eval_options, global);
    if opts.is_conflicting() {
        return Err(IndigoError::Argument(
            "sort_fn and parallel must not both be active".to_string(),
        ));
    }
    if opts.return_diagnostics && !rule.diagnostics_compiled {
        return Err(IndigoError::Argument(format!(
            "return_diagnostics requested for rule '{}' but diagnostics were not compiled",
            rule.id
        )));
    }

    // Step 2: bind self under the reserved key, scoped to this rule.
    let previous_self = rule.self_value.as_ref().map(|v| {
        let prior = data.insert(SELF_KEY.to_string(), v.clone());
        prior
    });

    // Step 3: evaluate this rule's own expression.
    let eval_outcome = engine_ctx.backend.evaluate(
        rule.program.as_deref(),
        data,
        rule.self_value.as_ref(),
        rule.result_type,
        opts.return_diagnostics,
    );

    // Restore data to its pre-call shape regardless of outcome.
    if rule.self_value.is_some() {
        match previous_self.flatten() {
            Some(prior) => {
                data.insert(SELF_KEY.to_string(), prior);
            }
            None => {
                data.remove(SELF_KEY);
            }
        }
    }

    let (value, diagnostics) = eval_outcome.map_err(|e| match e {
        IndigoError::Evaluation { .. } => e,
        other => IndigoError::Evaluation {
            rule_id: rule.id.to_string(),
            message: other.to_string(),
        },
    })?;

    // Step 4: compute expression_pass.
    let expression_pass = value.as_expression_pass();
    tracing::trace!(rule_id = %rule.id, expression_pass, "rule expression evaluated");

    // Step 5: stop_if_parent_negative short-circuit.
    if opts.stop_if_parent_negative && !expression_pass {
        return Ok(EvalResult {
            rule_id: rule.id.to_string(),
            meta: rule.meta.clone(),
            pass: expression_pass,
            expression_pass,
            value,
            diagnostics,
            rules_evaluated: 1,
            children: BTreeMap::new(),
        });
    }

    ctx.poll()?;

    // Step 6: order children.
    let ordered = order_children(&rule.children, opts.sort_fn.as_ref());

    // Step 7: traverse children, sequentially or fanned out.
    let (children, child_rules_evaluated) = match &opts.parallel {
        Some(p) if !p.is_sequential() => {
            parallel::eval_children_parallel(engine_ctx, ctx, &ordered, &*data, &opts, global)?
        }
        _ => traverse_sequential(engine_ctx, ctx, &ordered, data, &opts, global)?,
    };

    // Step 8: aggregate pass.
    let pass = if children.is_empty() {
        expression_pass
    } else if opts.true_if_any {
        expression_pass && children.values().any(|c| c.pass)
    } else {
        expression_pass && children.values().all(|c| c.pass)
    };

    Ok(EvalResult {
        rule_id: rule.id.to_string(),
        meta: rule.meta.clone(),
        pass,
        expression_pass,
        value,
        diagnostics,
        rules_evaluated: 1 + child_rules_evaluated,
        children,
    })
}

/// Children in `sort_fn` order if set, else declared (insertion) order,
/// which is stable and deterministic for a given call even though it is
/// otherwise unspecified (§5).
pub(crate) fn order_children<B: Backend>(
    children: &[Arc<Rule<B>>],
    sort_fn: Option<&SortFn>,
) -> Vec<Arc<Rule<B>>> {
    let mut ordered: Vec<Arc<Rule<B>>> = children.to_vec();
    if let Some(cmp) = sort_fn {
        ordered.sort_by(|a, b| cmp(&a.id, &b.id));
    }
    ordered
}

/// Decide whether a traversed child's result should be retained, per the
/// `discard_pass`/`discard_fail` rules in §4.3 step 7.
pub(crate) fn should_retain(child: &EvalResult, opts: &ResolvedOptions) -> bool {
    if child.pass {
        !opts.discard_pass
    } else {
        match opts.discard_fail {
            DiscardFail::KeepAll => true,
            DiscardFail::Discard => false,
            // §9 open question: discard only when *this* child's own
            // expression failed, not merely when it aggregated a failing
            // descendant (see DESIGN.md).
            DiscardFail::DiscardOnlyIfExpressionFailed => child.expression_pass,
        }
    }
}

fn traverse_sequential<B: Backend>(
    engine_ctx: &EngineCtx<B>,
    ctx: &EvalContext,
    children: &[Arc<Rule<B>>],
    data: &mut Data,
    opts: &ResolvedOptions,
    global: &EvalOptions,
) -> Result<(BTreeMap<String, EvalResult>, u64)> {
    let mut results = BTreeMap::new();
    let mut rules_evaluated = 0u64;

    for child in children {
        ctx.poll()?;
        // `opts` (this rule's resolved options) is the child's inherited
        // baseline, merged again with the child's own options and the
        // call-site global override inside `eval_node`.
        let child_result = eval_node(engine_ctx, ctx, child, data, opts, global)?;
        rules_evaluated += child_result.rules_evaluated;
        let passed = child_result.pass;

        if should_retain(&child_result, opts) {
            results.insert(child_result.rule_id.clone(), child_result);
        }

        if opts.stop_first_positive_child && passed {
            break;
        }
        if opts.stop_first_negative_child && !passed {
            break;
        }
    }

    Ok((results, rules_evaluated))
}
