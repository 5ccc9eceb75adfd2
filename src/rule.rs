//! Rule Tree Model (§4.1): identity, expression, children, options, and the
//! compiled program handle, plus the operations exposed directly on a
//! standalone (not-yet-published) tree.

use crate::backend::{Backend, EmptySchema, Schema};
use crate::error::{IndigoError, Result};
use crate::value::Value;
use crate::vault::shard::ShardPredicate;
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// How a rule's failing children are retained in the result (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscardFail {
    #[default]
    KeepAll,
    Discard,
    DiscardOnlyIfExpressionFailed,
}

/// `batch_size`/`max_parallel` for fanning sibling evaluation out to a
/// bounded worker pool. Either being zero forces sequential traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct ParallelOptions {
    pub batch_size: usize,
    pub max_parallel: usize,
}

impl ParallelOptions {
    pub fn new(batch_size: usize, max_parallel: usize) -> Self {
        ParallelOptions {
            batch_size,
            max_parallel,
        }
    }

    pub fn is_sequential(&self) -> bool {
        self.batch_size == 0 || self.max_parallel == 0
    }
}

/// Deterministic comparator over child ids, used when `sort_fn` is set.
pub type SortFn = Arc<dyn Fn(&str, &str) -> Ordering + Send + Sync>;

/// Per-rule traversal options (§3). Every field is an override: `None`
/// means "inherit from the parent's effective options" rather than "false".
/// A rule that sets nothing inherits everything.
#[derive(Clone, Default)]
pub struct EvalOptions {
    pub stop_if_parent_negative: Option<bool>,
    pub stop_first_positive_child: Option<bool>,
    pub stop_first_negative_child: Option<bool>,
    pub discard_pass: Option<bool>,
    pub discard_fail: Option<DiscardFail>,
    pub true_if_any: Option<bool>,
    pub return_diagnostics: Option<bool>,
    pub sort_fn: Option<SortFn>,
    pub parallel: Option<ParallelOptions>,
}

impl fmt::Debug for EvalOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalOptions")
            .field("stop_if_parent_negative", &self.stop_if_parent_negative)
            .field("stop_first_positive_child", &self.stop_first_positive_child)
            .field("stop_first_negative_child", &self.stop_first_negative_child)
            .field("discard_pass", &self.discard_pass)
            .field("discard_fail", &self.discard_fail)
            .field("true_if_any", &self.true_if_any)
            .field("return_diagnostics", &self.return_diagnostics)
            .field("sort_fn", &self.sort_fn.as_ref().map(|_| "<fn>"))
            .field("parallel", &self.parallel)
            .finish()
    }
}

impl EvalOptions {
    pub fn has_conflicting_sort_and_parallel(&self) -> bool {
        self.sort_fn.is_some() && self.parallel.is_some()
    }
}

/// The fully-resolved options in effect for one rule's evaluation, after
/// merging parent-inherited, rule-own, and call-site-global overrides
/// (§4.3 step 1). Used internally by the traversal engine.
#[derive(Clone, Default)]
pub(crate) struct ResolvedOptions {
    pub stop_if_parent_negative: bool,
    pub stop_first_positive_child: bool,
    pub stop_first_negative_child: bool,
    pub discard_pass: bool,
    pub discard_fail: DiscardFail,
    pub true_if_any: bool,
    pub return_diagnostics: bool,
    pub sort_fn: Option<SortFn>,
    pub parallel: Option<ParallelOptions>,
}

impl ResolvedOptions {
    pub fn is_conflicting(&self) -> bool {
        self.sort_fn.is_some() && self.parallel.is_some()
    }

    /// Merge `own` (this rule's declared options) and `global` (the
    /// call-site override, constant across the whole traversal) onto
    /// `self` (the parent's already-resolved options), with `global`
    /// taking precedence over `own`, which takes precedence over the
    /// inherited value.
    pub fn merge(&self, own: &EvalOptions, global: &EvalOptions) -> ResolvedOptions {
        ResolvedOptions {
            stop_if_parent_negative: global
                .stop_if_parent_negative
                .or(own.stop_if_parent_negative)
                .unwrap_or(self.stop_if_parent_negative),
            stop_first_positive_child: global
                .stop_first_positive_child
                .or(own.stop_first_positive_child)
                .unwrap_or(self.stop_first_positive_child),
            stop_first_negative_child: global
                .stop_first_negative_child
                .or(own.stop_first_negative_child)
                .unwrap_or(self.stop_first_negative_child),
            discard_pass: global
                .discard_pass
                .or(own.discard_pass)
                .unwrap_or(self.discard_pass),
            discard_fail: global
                .discard_fail
                .or(own.discard_fail)
                .unwrap_or(self.discard_fail),
            true_if_any: global.true_if_any.or(own.true_if_any).unwrap_or(self.true_if_any),
            return_diagnostics: global
                .return_diagnostics
                .or(own.return_diagnostics)
                .unwrap_or(self.return_diagnostics),
            sort_fn: global
                .sort_fn
                .clone()
                .or_else(|| own.sort_fn.clone())
                .or_else(|| self.sort_fn.clone()),
            parallel: global.parallel.or(own.parallel).or(self.parallel),
        }
    }
}

/// A node in a rule tree (§3).
///
/// `children` and `shards` hold `Arc`-shared subtrees so that the vault's
/// copy-on-write mutation protocol can clone only the ancestor path of a
/// mutated node while leaving untouched siblings shared by reference.
pub struct Rule<B: Backend> {
    pub id: Arc<str>,
    pub expr: String,
    pub result_type: crate::value::ResultType,
    pub schema: Arc<dyn Schema>,
    pub program: Option<Arc<B::Program>>,
    pub self_value: Option<Value>,
    pub children: Vec<Arc<Rule<B>>>,
    pub shards: Vec<Arc<Rule<B>>>,
    pub eval_options: EvalOptions,
    pub meta: Option<Arc<dyn Any + Send + Sync>>,
    /// Set when this rule was added with `Rule::with_shard_predicate`,
    /// marking it as a shard root rather than an ordinary rule (§4.6).
    pub(crate) shard_predicate: Option<Arc<dyn ShardPredicate<B>>>,
    /// Whether this rule's last successful compile requested diagnostic
    /// collection; gates `return_diagnostics` at evaluation time (§7).
    pub(crate) diagnostics_compiled: bool,
}

impl<B: Backend> Rule<B> {
    /// A new rule with no children, using an empty schema. `expr` may be
    /// empty (an empty expression evaluates to `true`, §3).
    pub fn new_rule(id: impl Into<String>, expr: impl Into<String>) -> Self {
        Rule {
            id: Arc::from(id.into().into_boxed_str()),
            expr: expr.into(),
            result_type: crate::value::ResultType::default(),
            schema: Arc::new(EmptySchema),
            program: None,
            self_value: None,
            children: Vec::new(),
            shards: Vec::new(),
            eval_options: EvalOptions::default(),
            meta: None,
            shard_predicate: None,
            diagnostics_compiled: false,
        }
    }

    pub fn with_schema(mut self, schema: Arc<dyn Schema>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_result_type(mut self, result_type: crate::value::ResultType) -> Self {
        self.result_type = result_type;
        self
    }

    pub fn with_self_value(mut self, value: Value) -> Self {
        self.self_value = Some(value);
        self
    }

    pub fn with_eval_options(mut self, options: EvalOptions) -> Self {
        self.eval_options = options;
        self
    }

    pub fn with_meta(mut self, meta: Arc<dyn Any + Send + Sync>) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Mark this rule as a shard root: when added under a host, it is
    /// placed into the host's `shards` list instead of its `children`, and
    /// candidates are routed into it when `predicate` matches (§4.6).
    pub fn with_shard_predicate(mut self, predicate: impl ShardPredicate<B> + 'static) -> Self {
        self.shard_predicate = Some(Arc::new(predicate));
        self
    }

    pub fn is_shard_root(&self) -> bool {
        self.shard_predicate.is_some()
    }

    /// Add `child` under this rule. Fails if `child.id` is already present
    /// among this rule's children, or violates naming rules.
    pub fn add_child(&mut self, child: Rule<B>) -> Result<()> {
        validate_id(&child.id)?;
        if self.children.iter().any(|c| c.id == child.id) {
            return Err(IndigoError::DuplicateId(child.id.to_string()));
        }
        self.children.push(Arc::new(child));
        Ok(())
    }

    /// Add `shard` to this rule's ordered shard sequence.
    pub fn add_shard(&mut self, shard: Rule<B>) -> Result<()> {
        validate_id(&shard.id)?;
        if self.shards.iter().any(|s| s.id == shard.id) {
            return Err(IndigoError::DuplicateId(shard.id.to_string()));
        }
        self.shards.push(Arc::new(shard));
        Ok(())
    }

    /// Depth-first search for `id` within this subtree (inclusive of self).
    /// Returns the found rule and the ordered ancestor chain from root (this
    /// rule) to the rule's parent.
    pub fn find<'a>(&'a self, id: &str) -> Option<(&'a Rule<B>, Vec<&'a Rule<B>>)> {
        find_rec(self, id, &mut Vec::new())
    }

    pub fn find_parent<'a>(&'a self, id: &str) -> Option<&'a Rule<B>> {
        self.find(id).and_then(|(_, ancestors)| ancestors.last().copied())
    }

    /// The inclusive path from root to the rule with `id`.
    pub fn path<'a>(&'a self, id: &str) -> Option<Vec<&'a Rule<B>>> {
        self.find(id).map(|(rule, mut ancestors)| {
            ancestors.push(rule);
            ancestors
        })
    }

    /// Debug rendering of this subtree.
    pub fn tree(&self) -> String {
        let mut out = String::new();
        render_tree(self, 0, &mut out);
        out
    }

    /// Visit every rule in this subtree (self, shards, then children,
    /// depth-first). Halts with the first error `f` returns.
    pub fn apply<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&Rule<B>) -> Result<()>,
    {
        apply_rec(self, &mut f)
    }
}

impl<B: Backend> Clone for Rule<B> {
    /// A shallow clone: child/shard `Arc`s are cloned (cheap, shared), not
    /// the subtrees they point to. This is exactly the operation the
    /// vault's make-safe-path algorithm needs for ancestor cloning (§4.5).
    fn clone(&self) -> Self {
        Rule {
            id: Arc::clone(&self.id),
            expr: self.expr.clone(),
            result_type: self.result_type,
            schema: Arc::clone(&self.schema),
            program: self.program.clone(),
            self_value: self.self_value.clone(),
            children: self.children.clone(),
            shards: self.shards.clone(),
            eval_options: self.eval_options.clone(),
            meta: self.meta.clone(),
            shard_predicate: self.shard_predicate.clone(),
            diagnostics_compiled: self.diagnostics_compiled,
        }
    }
}

impl<B: Backend> fmt::Debug for Rule<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("expr", &self.expr)
            .field("result_type", &self.result_type)
            .field("compiled", &self.program.is_some())
            .field("children", &self.children.len())
            .field("shards", &self.shards.len())
            .field("is_shard_root", &self.is_shard_root())
            .finish()
    }
}

/// Validate a rule id: non-empty, no path separator, no whitespace (§3).
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(IndigoError::Argument("rule id must not be empty".to_string()));
    }
    if id.contains('/') || id.chars().any(char::is_whitespace) {
        return Err(IndigoError::Argument(format!(
            "rule id '{id}' contains banned characters"
        )));
    }
    Ok(())
}

fn find_rec<'a, B: Backend>(
    node: &'a Rule<B>,
    id: &str,
    ancestors: &mut Vec<&'a Rule<B>>,
) -> Option<(&'a Rule<B>, Vec<&'a Rule<B>>)> {
    if &*node.id == id {
        return Some((node, ancestors.clone()));
    }
    ancestors.push(node);
    for shard in &node.shards {
        if let Some(found) = find_rec(shard, id, ancestors) {
            return Some(found);
        }
    }
    for child in &node.children {
        if let Some(found) = find_rec(child, id, ancestors) {
            return Some(found);
        }
    }
    ancestors.pop();
    None
}

fn apply_rec<B: Backend, F>(node: &Rule<B>, f: &mut F) -> Result<()>
where
    F: FnMut(&Rule<B>) -> Result<()>,
{
    f(node)?;
    for shard in &node.shards {
        apply_rec(shard, f)?;
    }
    for child in &node.children {
        apply_rec(child, f)?;
    }
    Ok(())
}

fn render_tree<B: Backend>(node: &Rule<B>, depth: usize, out: &mut String) {
    use std::fmt::Write;
    let indent = "  ".repeat(depth);
    let marker = if node.is_shard_root() { "#" } else { "-" };
    let _ = writeln!(out, "{indent}{marker} {} [{}]", node.id, node.expr);
    for shard in &node.shards {
        render_tree(shard, depth + 1, out);
    }
    for child in &node.children {
        render_tree(child, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ExprBackend;

    fn rule(id: &str, expr: &str) -> Rule<ExprBackend> {
        Rule::new_rule(id, expr)
    }

    #[test]
    fn add_child_rejects_duplicate_id() {
        let mut root = rule("root", "");
        root.add_child(rule("a", "true")).unwrap();
        let err = root.add_child(rule("a", "false")).unwrap_err();
        assert!(matches!(err, IndigoError::DuplicateId(_)));
    }

    #[test]
    fn add_child_rejects_bad_ids() {
        let mut root = rule("root", "");
        assert!(root.add_child(rule("", "true")).is_err());
        assert!(root.add_child(rule("a/b", "true")).is_err());
        assert!(root.add_child(rule("a b", "true")).is_err());
    }

    #[test]
    fn find_returns_ancestor_chain() {
        let mut root = rule("root", "");
        let mut a = rule("a", "");
        a.add_child(rule("a1", "true")).unwrap();
        root.add_child(a).unwrap();
        root.add_child(rule("b", "true")).unwrap();

        let (found, ancestors) = root.find("a1").unwrap();
        assert_eq!(&*found.id, "a1");
        let ids: Vec<&str> = ancestors.iter().map(|r| &*r.id).collect();
        assert_eq!(ids, vec!["root", "a"]);

        assert_eq!(root.find_parent("a1").unwrap().id.as_ref(), "a");
        assert!(root.find("missing").is_none());
    }

    #[test]
    fn path_is_inclusive_root_to_rule() {
        let mut root = rule("root", "");
        let mut a = rule("a", "");
        a.add_child(rule("a1", "true")).unwrap();
        root.add_child(a).unwrap();

        let path = root.path("a1").unwrap();
        let ids: Vec<&str> = path.iter().map(|r| &*r.id).collect();
        assert_eq!(ids, vec!["root", "a", "a1"]);
    }

    #[test]
    fn apply_visits_every_rule_and_stops_on_error() {
        let mut root = rule("root", "");
        root.add_child(rule("a", "true")).unwrap();
        root.add_child(rule("b", "true")).unwrap();

        let mut seen = Vec::new();
        root.apply(|r| {
            seen.push(r.id.to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["root", "a", "b"]);

        let err = root.apply(|r| {
            if &*r.id == "a" {
                Err(IndigoError::Argument("stop".into()))
            } else {
                Ok(())
            }
        });
        assert!(err.is_err());
    }
}
