//! Result Assembly (§4.7): the structured result graph mirroring the
//! traversal decisions actually taken, not the static tree shape.

use crate::value::{Diagnostics, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The outcome of evaluating one rule, plus the retained results of its
/// traversed children. Short-circuited subtrees are simply absent.
#[derive(Clone)]
pub struct EvalResult {
    pub rule_id: String,
    pub meta: Option<Arc<dyn Any + Send + Sync>>,
    pub pass: bool,
    pub expression_pass: bool,
    pub value: Value,
    pub diagnostics: Option<Diagnostics>,
    pub rules_evaluated: u64,
    pub children: BTreeMap<String, EvalResult>,
}

impl fmt::Debug for EvalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalResult")
            .field("rule_id", &self.rule_id)
            .field("has_meta", &self.meta.is_some())
            .field("pass", &self.pass)
            .field("expression_pass", &self.expression_pass)
            .field("value", &self.value)
            .field("diagnostics", &self.diagnostics)
            .field("rules_evaluated", &self.rules_evaluated)
            .field("children", &self.children)
            .finish()
    }
}

impl EvalResult {
    /// Equality ignoring `meta` and `rules_evaluated`, for comparing
    /// sequential vs. parallel evaluations (§8 property 6: "identical
    /// result sets, compared as multisets").
    pub fn pass_shape_eq(&self, other: &EvalResult) -> bool {
        self.rule_id == other.rule_id
            && self.pass == other.pass
            && self.expression_pass == other.expression_pass
            && self.value == other.value
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .all(|(id, r)| other.children.get(id).is_some_and(|o| r.pass_shape_eq(o)))
    }
}
