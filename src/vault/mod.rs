//! The Vault (§4.5): a copy-on-write, snapshot-based container that
//! publishes rule trees atomically and applies batched mutations safely
//! under concurrent reads.
//!
//! Grounded on the teacher's `storage_engine::snapshot::KnowledgeGraphSnapshot`
//! (cheap `Arc`-backed clone, atomic version counter) and its
//! single-writer/lock-free-reader concurrency split: writers serialize on a
//! `parking_lot::Mutex`, readers load through an `arc_swap::ArcSwap` and
//! never block on a writer.

pub(crate) mod mutation;
pub(crate) mod shard;

use crate::backend::Backend;
use crate::engine::{compile_tree, CompileOptions};
use crate::error::Result;
use crate::rule::Rule;
use crate::value::ROOT_ID;
use arc_swap::ArcSwap;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub use mutation::Op;
pub use shard::ShardPredicate;

/// A copy-on-write container publishing a rule tree to concurrent readers
/// via wait-free snapshot loads, and applying batched mutations under a
/// single writer lock (§4.5).
pub struct Vault<B: Backend> {
    backend: Arc<B>,
    compile_opts: CompileOptions,
    current: ArcSwap<Rule<B>>,
    last_update_millis: AtomicI64,
    write_lock: Mutex<()>,
}

impl<B: Backend> Vault<B> {
    /// Create a vault publishing `initial_root` (or an empty rule named
    /// `"root"` if none is given), compiled before first publication.
    pub fn new(
        backend: B,
        initial_root: Option<Rule<B>>,
        compile_opts: CompileOptions,
    ) -> Result<Self> {
        let mut root = initial_root.unwrap_or_else(|| Rule::new_rule(ROOT_ID, ""));
        compile_tree(&backend, &mut root, &compile_opts)?;
        Ok(Vault {
            backend: Arc::new(backend),
            compile_opts,
            current: ArcSwap::new(Arc::new(root)),
            last_update_millis: AtomicI64::new(now_millis()),
            write_lock: Mutex::new(()),
        })
    }

    /// Load the currently published snapshot. Wait-free: never blocks on a
    /// concurrent writer, and the returned `Arc` keeps the snapshot alive
    /// even if a mutation publishes a newer one while it is in use (§4.5).
    pub fn current(&self) -> Arc<Rule<B>> {
        self.current.load_full()
    }

    /// The timestamp of the most recently published snapshot.
    pub fn last_update(&self) -> DateTime<Utc> {
        let millis = self.last_update_millis.load(Ordering::Acquire);
        Utc.timestamp_millis_opt(millis).single().unwrap_or_else(Utc::now)
    }

    /// Apply a batch of mutations atomically against a private working
    /// copy of the current tree: ancestors are cloned only on first touch
    /// (§9), and the result is published in a single `ArcSwap` store. If
    /// any op fails, nothing is published — the currently live snapshot is
    /// untouched (§4.5: "all or nothing").
    ///
    /// Writers serialize on an internal lock; readers of `current` are
    /// never blocked by a writer holding it.
    pub fn mutate(&self, ops: Vec<Op<B>>) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut working: Rule<B> = (*self.current.load_full()).clone();
        let mut explicit_timestamp = None;
        for op in ops {
            if let Some(ts) =
                mutation::apply_op(self.backend.as_ref(), &self.compile_opts, &mut working, op)?
            {
                explicit_timestamp = Some(ts);
            }
        }

        self.current.store(Arc::new(working));
        let millis = explicit_timestamp
            .map(|ts: DateTime<Utc>| ts.timestamp_millis())
            .unwrap_or_else(now_millis);
        self.last_update_millis.store(millis, Ordering::Release);
        Ok(())
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndigoError;
    use crate::testutil::ExprBackend;

    fn vault() -> Vault<ExprBackend> {
        Vault::new(ExprBackend, None, CompileOptions::default()).unwrap()
    }

    #[test]
    fn new_vault_publishes_default_root() {
        let v = vault();
        assert_eq!(&*v.current().id, ROOT_ID);
        assert!(v.current().children.is_empty());
    }

    #[test]
    fn mutate_publishes_new_snapshot_keeping_old_alive() {
        let v = vault();
        let before = v.current();

        v.mutate(vec![Op::Add {
            rule: Rule::new_rule("a", "true"),
            parent_id: ROOT_ID.to_string(),
        }])
        .unwrap();

        assert!(before.children.is_empty());
        let after = v.current();
        assert_eq!(after.children.len(), 1);
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn failed_batch_publishes_nothing() {
        let v = vault();
        v.mutate(vec![Op::Add {
            rule: Rule::new_rule("a", "true"),
            parent_id: ROOT_ID.to_string(),
        }])
        .unwrap();
        let before = v.current();

        let err = v
            .mutate(vec![Op::Add {
                rule: Rule::new_rule("a", "false"),
                parent_id: ROOT_ID.to_string(),
            }])
            .unwrap_err();
        assert!(matches!(err, IndigoError::DuplicateId(_)));

        let after = v.current();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn unrelated_siblings_are_shared_across_snapshots() {
        let mut root = Rule::new_rule(ROOT_ID, "");
        root.add_child(Rule::new_rule("untouched", "true")).unwrap();
        root.add_child(Rule::new_rule("target", "true")).unwrap();
        let v = Vault::new(ExprBackend, Some(root), CompileOptions::default()).unwrap();

        let before = v.current();
        let untouched_before = Arc::clone(&before.children[0]);

        v.mutate(vec![Op::Delete {
            id: "target".to_string(),
        }])
        .unwrap();

        let after = v.current();
        let untouched_after = &after.children[0];
        assert!(Arc::ptr_eq(&untouched_before, untouched_after));
    }

    #[test]
    fn last_update_advances_on_mutation() {
        let v = vault();
        let t0 = v.last_update();
        v.mutate(vec![Op::Add {
            rule: Rule::new_rule("a", "true"),
            parent_id: ROOT_ID.to_string(),
        }])
        .unwrap();
        let t1 = v.last_update();
        assert!(t1 >= t0);
    }

    #[test]
    fn explicit_last_update_op_sets_timestamp() {
        let v = vault();
        let ts = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        v.mutate(vec![Op::LastUpdate { timestamp: ts }]).unwrap();
        assert_eq!(v.last_update(), ts);
    }
}
