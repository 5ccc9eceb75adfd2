//! The expression compiler/evaluator contract (§4.2).
//!
//! The backend (a CEL-like language, or anything else) is an external
//! collaborator: this crate only defines the two-operation capability the
//! engine needs from it, and ships a trivial reference implementation
//! (`testutil::ExprBackend`) used by this crate's own tests.

use crate::error::IndigoError;
use crate::value::{Data, Diagnostics, ResultType, Value};
use std::fmt::Debug;

/// A variable set available to an expression. Deliberately minimal: the
/// real schema/type system is out of scope for this crate (§1); the engine
/// never inspects a schema beyond handing it to `Backend::compile`.
pub trait Schema: Debug + Send + Sync {
    fn name(&self) -> &str;
}

/// A schema with no declared variables, used for rules that only read
/// `self` or nothing at all.
#[derive(Debug, Clone, Default)]
pub struct EmptySchema;

impl Schema for EmptySchema {
    fn name(&self) -> &str {
        "empty"
    }
}

/// The pluggable expression compiler/evaluator (§4.2).
///
/// `compile` and `evaluate` are the entire surface the engine depends on.
/// `Program` is opaque to the engine; it must be safe to evaluate
/// concurrently from multiple threads once compiled (§5, shared resource
/// policy) since the parallel sibling executor hands the same `Arc<Program>`
/// to every worker evaluating copies of the same rule's children... in
/// practice each rule's program is evaluated by at most one worker per
/// call, but nothing prevents two different evaluations from sharing it.
pub trait Backend: Send + Sync + 'static {
    /// The compiled representation of an expression.
    type Program: Send + Sync + 'static;

    /// Compile `expr` against `schema`, producing a `Program`.
    ///
    /// `dry_run` performs validation without the caller intending to keep
    /// the result (used for compile-time checks that should not count as
    /// "publishing" a program). `collect_diagnostics` requests that the
    /// resulting program retain enough information for `evaluate` to later
    /// produce `Diagnostics` when asked.
    fn compile(
        &self,
        expr: &str,
        schema: &dyn Schema,
        result_type: ResultType,
        collect_diagnostics: bool,
        dry_run: bool,
    ) -> Result<Self::Program, IndigoError>;

    /// Evaluate `program` against `data`. Must not mutate `data` except by
    /// consulting the reserved `self` slot, which the engine manages.
    ///
    /// Returns the produced value and, if `return_diagnostics` was
    /// requested and the program was compiled with `collect_diagnostics`,
    /// diagnostic information about the evaluation.
    fn evaluate(
        &self,
        program: Option<&Self::Program>,
        data: &Data,
        self_value: Option<&Value>,
        result_type: ResultType,
        return_diagnostics: bool,
    ) -> Result<(Value, Option<Diagnostics>), IndigoError>;
}
