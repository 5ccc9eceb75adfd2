//! Hot Reload Demonstration
//!
//! Shows a reader thread evaluating against a `Vault`'s published snapshot
//! while a writer thread concurrently mutates the tree: the reader always
//! sees a complete, consistent snapshot, never a partially-applied batch.

use indigo::testutil::ExprBackend;
use indigo::{CompileOptions, Data, EvalContext, EvalOptions, Engine, Op, Rule, Vault};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Indigo Hot Reload Demo ===\n");

    let mut root = Rule::new_rule("root", "");
    root.add_child(Rule::new_rule("always_on", "true"))?;
    let vault = Arc::new(Vault::new(ExprBackend, Some(root), CompileOptions::default())?);

    println!("Published initial tree with {} rule(s).", vault.current().children.len());

    let stop = Arc::new(AtomicBool::new(false));

    let reader = {
        let vault = Arc::clone(&vault);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let engine = Engine::new(ExprBackend);
            let ctx = EvalContext::new();
            let mut seen_counts = Vec::new();
            while !stop.load(Ordering::Relaxed) {
                let snapshot = vault.current();
                let mut data = Data::new();
                let result = engine
                    .eval(&ctx, &snapshot, &mut data, EvalOptions::default())
                    .expect("evaluation against a published snapshot never fails here");
                seen_counts.push(snapshot.children.len());
                assert!(result.pass, "every published rule in this demo evaluates true");
                thread::yield_now();
            }
            seen_counts
        })
    };

    println!("Writer publishing 10 rules one at a time...");
    for i in 0..10 {
        vault.mutate(vec![Op::Add {
            rule: Rule::new_rule(format!("rule-{i}"), "true"),
            parent_id: "root".to_string(),
        }])?;
        thread::sleep(Duration::from_millis(2));
    }
    stop.store(true, Ordering::Relaxed);

    let seen_counts = reader.join().expect("reader thread should not panic");
    let distinct: std::collections::BTreeSet<_> = seen_counts.iter().collect();
    println!("Reader observed {} distinct snapshot sizes across {} loads.", distinct.len(), seen_counts.len());
    println!("Final tree has {} rule(s).", vault.current().children.len());

    Ok(())
}
