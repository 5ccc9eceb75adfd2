//! Parallel Sibling Evaluation Demonstration
//!
//! Compares sequential and parallel traversal of a wide rule tree, then
//! shows an error in one sibling short-circuiting the whole fan-out
//! without waiting for a much slower sibling to finish.

use indigo::testutil::ExprBackend;
use indigo::{CompileOptions, Data, EvalContext, EvalOptions, Engine, ParallelOptions, Rule};
use std::time::{Duration, Instant};

fn wide_tree(width: u32) -> Rule<ExprBackend> {
    let mut root = Rule::new_rule("root", "true");
    for i in 0..width {
        let expr = if i % 7 == 0 { "false" } else { "true" };
        root.add_child(Rule::new_rule(format!("c{i}"), expr)).unwrap();
    }
    root
}

/// A backend whose programs can sleep or fail after a delay, used only to
/// make the short-circuit timing visible; `testutil::ExprBackend` has no
/// notion of time.
struct TimedBackend;

enum TimedProgram {
    Pass,
    SleepThenPass(Duration),
    ErrorAfter(Duration),
}

impl indigo::Backend for TimedBackend {
    type Program = TimedProgram;

    fn compile(
        &self,
        expr: &str,
        _schema: &dyn indigo::Schema,
        _result_type: indigo::ResultType,
        _collect_diagnostics: bool,
        _dry_run: bool,
    ) -> Result<Self::Program, indigo::IndigoError> {
        if let Some(ms) = expr.strip_prefix("sleep:") {
            return Ok(TimedProgram::SleepThenPass(Duration::from_millis(ms.parse().unwrap())));
        }
        if let Some(ms) = expr.strip_prefix("error:") {
            return Ok(TimedProgram::ErrorAfter(Duration::from_millis(ms.parse().unwrap())));
        }
        Ok(TimedProgram::Pass)
    }

    fn evaluate(
        &self,
        program: Option<&Self::Program>,
        _data: &Data,
        _self_value: Option<&indigo::Value>,
        _result_type: indigo::ResultType,
        _return_diagnostics: bool,
    ) -> Result<(indigo::Value, Option<indigo::Diagnostics>), indigo::IndigoError> {
        match program {
            None | Some(TimedProgram::Pass) => Ok((indigo::Value::Bool(true), None)),
            Some(TimedProgram::SleepThenPass(d)) => {
                std::thread::sleep(*d);
                Ok((indigo::Value::Bool(true), None))
            }
            Some(TimedProgram::ErrorAfter(d)) => {
                std::thread::sleep(*d);
                Err(indigo::IndigoError::Evaluation {
                    rule_id: "timed".to_string(),
                    message: "scheduled failure".to_string(),
                })
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Indigo Parallel Sibling Evaluation Demo ===\n");

    let engine = Engine::new(ExprBackend);
    let ctx = EvalContext::new();

    let width = 5_000;
    let mut root = wide_tree(width);
    engine.compile(&mut root, CompileOptions::default())?;

    println!("--- Demo 1: Sequential vs. parallel on {width} siblings ---");

    let mut data = Data::new();
    let start = Instant::now();
    let sequential = engine.eval(&ctx, &root, &mut data, EvalOptions::default())?;
    println!(
        "sequential: {:?}, pass = {}, retained = {}",
        start.elapsed(),
        sequential.pass,
        sequential.children.len()
    );

    let workers = num_cpus::get();
    let parallel_opts = EvalOptions {
        parallel: Some(ParallelOptions::new(64, workers)),
        ..Default::default()
    };
    let mut data = Data::new();
    let start = Instant::now();
    let parallel = engine.eval(&ctx, &root, &mut data, parallel_opts)?;
    println!(
        "parallel ({workers} workers): {:?}, pass = {}, retained = {}",
        start.elapsed(),
        parallel.pass,
        parallel.children.len()
    );
    println!("result sets agree: {}\n", sequential.pass_shape_eq(&parallel));

    println!("--- Demo 2: one failing sibling short-circuits 15 slow ones ---");

    // A single worker processes chunks strictly in dispatch order, so the
    // failing chunk (dispatched first) always resolves before any of the
    // slow siblings behind it is started. `eval` still joins its worker
    // before returning rather than leaving it running in the background,
    // but since none of the slow siblings were ever dispatched, that join
    // is cheap.
    let mut flaky_root = Rule::new_rule("root", "");
    flaky_root.add_child(Rule::new_rule("c_err", "error:5"))?;
    for i in 0..15 {
        flaky_root.add_child(Rule::new_rule(format!("c{i}"), "sleep:300"))?;
    }
    let timed_engine = Engine::new(TimedBackend);
    timed_engine.compile(&mut flaky_root, CompileOptions::default())?;

    let flaky_opts = EvalOptions {
        parallel: Some(ParallelOptions::new(1, 1)),
        ..Default::default()
    };
    let mut data = Data::new();
    let start = Instant::now();
    let outcome = timed_engine.eval(&ctx, &flaky_root, &mut data, flaky_opts);
    println!(
        "returned in {:?} (15 siblings sleeping 300ms each would have taken 4500ms run back-to-back): {:?}",
        start.elapsed(),
        outcome.err()
    );

    Ok(())
}
