//! Shard Router (§4.6): classifies candidate rules into the shard
//! subtrees of a host rule during mutation.

use crate::backend::Backend;
use crate::rule::Rule;
use crate::value::DEFAULT_SHARD_ID;
use std::sync::Arc;

/// A shard's classifier: decides whether `candidate` belongs to this
/// shard. Evaluated only during mutation, against a transient working
/// snapshot (§4.6 concurrency note) — never against a snapshot concurrent
/// readers are traversing.
pub trait ShardPredicate<B: Backend>: Send + Sync {
    fn matches(&self, candidate: &Rule<B>) -> bool;
}

impl<B, F> ShardPredicate<B> for F
where
    B: Backend,
    F: Fn(&Rule<B>) -> bool + Send + Sync,
{
    fn matches(&self, candidate: &Rule<B>) -> bool {
        self(candidate)
    }
}

/// Walk `host`'s shards in declared order, descending into the first
/// matching shard's own shards recursively, per §4.6 step 1–3. Returns the
/// chain of shard ids from `host` down to the deepest matching shard
/// (empty if no shard matched and no `default` shard exists).
pub(crate) fn route<B: Backend>(host: &Rule<B>, candidate: &Rule<B>) -> Vec<Arc<str>> {
    let mut path = Vec::new();
    let mut current = host;

    loop {
        let matched = current.shards.iter().find(|shard| {
            shard
                .shard_predicate
                .as_ref()
                .is_some_and(|p| p.matches(candidate))
        });

        match matched {
            Some(shard) => {
                path.push(Arc::clone(&shard.id));
                current = shard;
            }
            None => {
                if let Some(default_shard) =
                    current.shards.iter().find(|s| &*s.id == DEFAULT_SHARD_ID)
                {
                    path.push(Arc::clone(&default_shard.id));
                }
                break;
            }
        }
    }

    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ExprBackend;

    fn tagged(id: &str, tag: &'static str) -> Rule<ExprBackend> {
        Rule::new_rule(id, "true").with_meta(Arc::new(tag))
    }

    fn has_tag(tag: &'static str) -> impl Fn(&Rule<ExprBackend>) -> bool {
        move |candidate: &Rule<ExprBackend>| {
            candidate
                .meta
                .as_ref()
                .and_then(|m| m.downcast_ref::<&'static str>())
                .is_some_and(|t| *t == tag)
        }
    }

    #[test]
    fn routes_to_first_matching_shard() {
        let mut host = Rule::new_rule("host", "");
        host.add_shard(Rule::new_rule("a", "").with_shard_predicate(has_tag("a")))
            .unwrap();
        host.add_shard(Rule::new_rule("b", "").with_shard_predicate(has_tag("b")))
            .unwrap();

        let candidate = tagged("c1", "b");
        let path = route(&host, &candidate);
        assert_eq!(path.iter().map(|s| &**s).collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn falls_back_to_default_shard() {
        let mut host = Rule::new_rule("host", "");
        host.add_shard(Rule::new_rule("a", "").with_shard_predicate(has_tag("a")))
            .unwrap();
        host.add_shard(Rule::new_rule(DEFAULT_SHARD_ID, "")).unwrap();

        let candidate = tagged("c1", "z");
        let path = route(&host, &candidate);
        assert_eq!(
            path.iter().map(|s| &**s).collect::<Vec<_>>(),
            vec![DEFAULT_SHARD_ID]
        );
    }

    #[test]
    fn no_match_no_default_routes_directly_under_host() {
        let mut host = Rule::new_rule("host", "");
        host.add_shard(Rule::new_rule("a", "").with_shard_predicate(has_tag("a")))
            .unwrap();

        let candidate = tagged("c1", "z");
        assert!(route(&host, &candidate).is_empty());
    }

    #[test]
    fn recurses_into_nested_shards() {
        // "inner" catches every candidate reaching this host (a broad
        // outer bucket); "nested" further splits inner's own catch by tag.
        let mut inner = Rule::new_rule("inner", "").with_shard_predicate(|_: &Rule<ExprBackend>| true);
        inner
            .add_shard(Rule::new_rule("nested", "").with_shard_predicate(has_tag("nested")))
            .unwrap();
        let mut host = Rule::new_rule("host", "");
        host.add_shard(inner).unwrap();

        let candidate = tagged("c1", "nested");
        let path = route(&host, &candidate);
        assert_eq!(
            path.iter().map(|s| &**s).collect::<Vec<_>>(),
            vec!["inner", "nested"]
        );
    }
}
