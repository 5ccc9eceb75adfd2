//! Snapshot/publication invariants (§8 properties 1, 2, 3).

use indigo::testutil::ExprBackend;
use indigo::{CompileOptions, IndigoError, Op, Rule, Vault};
use std::sync::Arc;
use std::thread;

fn seed_tree() -> Rule<ExprBackend> {
    let mut root = Rule::new_rule("root", "");
    let mut a = Rule::new_rule("a", "true");
    a.add_child(Rule::new_rule("a1", "true")).unwrap();
    root.add_child(a).unwrap();
    root.add_child(Rule::new_rule("b", "true")).unwrap();
    root
}

/// Property 1: a captured snapshot's own `apply(visit)` never changes, no
/// matter what happens to the vault afterwards.
#[test]
fn captured_snapshot_is_immutable_across_later_mutations() {
    let vault = Vault::new(ExprBackend, Some(seed_tree()), CompileOptions::default()).unwrap();
    let snapshot = vault.current();

    let mut ids_before = Vec::new();
    snapshot
        .apply(|r| {
            ids_before.push(r.id.to_string());
            Ok(())
        })
        .unwrap();

    vault
        .mutate(vec![
            Op::Add {
                rule: Rule::new_rule("c", "true"),
                parent_id: "root".to_string(),
            },
            Op::Delete {
                id: "b".to_string(),
            },
            Op::Update {
                rule: Rule::new_rule("a", "false"),
            },
        ])
        .unwrap();

    let mut ids_after_capture = Vec::new();
    snapshot
        .apply(|r| {
            ids_after_capture.push(r.id.to_string());
            Ok(())
        })
        .unwrap();

    assert_eq!(ids_before, ids_after_capture, "the captured Arc's tree never mutates in place");
    assert_eq!(&*snapshot.find("a").unwrap().0.expr, "true");
}

/// Property 3: neither `add` nor `move` can produce a rule that is its own
/// descendant.
#[test]
fn add_and_move_reject_cycles() {
    let vault = Vault::new(ExprBackend, Some(seed_tree()), CompileOptions::default()).unwrap();

    let err = vault
        .mutate(vec![Op::Move {
            id: "a".to_string(),
            new_parent_id: "a1".to_string(),
        }])
        .unwrap_err();
    assert!(matches!(err, IndigoError::CycleError { .. }));

    let err = vault
        .mutate(vec![Op::Move {
            id: "a".to_string(),
            new_parent_id: "a".to_string(),
        }])
        .unwrap_err();
    assert!(matches!(err, IndigoError::CycleError { .. }));
}

/// Property 2: every completed `current()` call under concurrent writers
/// returns either the pre-batch or the post-batch tree for each batch —
/// child counts only ever take values seen at a real publication point.
#[test]
fn concurrent_readers_never_observe_a_partial_batch() {
    let vault = Arc::new(Vault::new(ExprBackend, Some(seed_tree()), CompileOptions::default()).unwrap());

    let writer = {
        let vault = Arc::clone(&vault);
        thread::spawn(move || {
            for i in 0..50 {
                vault
                    .mutate(vec![
                        Op::Add {
                            rule: Rule::new_rule(format!("w{i}-x"), "true"),
                            parent_id: "root".to_string(),
                        },
                        Op::Add {
                            rule: Rule::new_rule(format!("w{i}-y"), "true"),
                            parent_id: "root".to_string(),
                        },
                    ])
                    .unwrap();
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let vault = Arc::clone(&vault);
        readers.push(thread::spawn(move || {
            let mut observed_odd_increment = false;
            let mut last_len = vault.current().children.len();
            for _ in 0..2000 {
                let len = vault.current().children.len();
                if len != last_len && (len - last_len) % 2 != 0 {
                    observed_odd_increment = true;
                }
                last_len = len;
            }
            observed_odd_increment
        }));
    }

    writer.join().unwrap();
    for r in readers {
        assert!(
            !r.join().unwrap(),
            "a batch of 2 adds must never be observed as a single add"
        );
    }

    assert_eq!(vault.current().children.len(), 2 + 50 * 2);
}
