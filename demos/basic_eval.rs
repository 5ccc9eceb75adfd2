//! Basic Evaluation Demonstration
//!
//! Compiles a small rule tree and evaluates it against a data record,
//! showing how per-rule options shape which results are retained.

use indigo::testutil::ExprBackend;
use indigo::{CompileOptions, Data, EvalContext, EvalOptions, Engine, Rule, Value};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Indigo Basic Evaluation Demo ===\n");

    let mut root = Rule::new_rule("eligibility", "true");

    let mut age_check = Rule::new_rule("age_check", "age");
    age_check.add_child(Rule::new_rule("min_age", "age")).unwrap();
    root.add_child(age_check).unwrap();

    let mut residency = Rule::new_rule("residency", "resident");
    residency.eval_options.discard_pass = Some(true);
    root.add_child(residency).unwrap();

    let engine = Engine::new(ExprBackend);
    engine.compile(&mut root, CompileOptions::default())?;

    println!("--- Rule Tree ---");
    print!("{}", root.tree());
    println!();

    let ctx = EvalContext::new();
    let mut data = Data::new();
    data.insert("age".to_string(), Value::Bool(true));
    data.insert("resident".to_string(), Value::Bool(true));

    let result = engine.eval(&ctx, &root, &mut data, EvalOptions::default())?;
    println!("--- Evaluation (both checks pass) ---");
    println!("root pass: {}", result.pass);
    println!("retained children: {:?}", result.children.keys().collect::<Vec<_>>());
    println!("(residency discards on pass, so only age_check remains)\n");

    data.insert("resident".to_string(), Value::Bool(false));
    let result = engine.eval(&ctx, &root, &mut data, EvalOptions::default())?;
    println!("--- Evaluation (residency fails) ---");
    println!("root pass: {}", result.pass);
    println!("retained children: {:?}", result.children.keys().collect::<Vec<_>>());

    Ok(())
}
