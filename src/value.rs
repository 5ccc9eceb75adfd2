//! The tagged value union exchanged between the engine and the backend.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A value produced by evaluating a rule's expression, or injected into
/// data via a rule's `self` slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Duration(chrono::Duration),
    Timestamp(DateTime<Utc>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Message(BTreeMap<String, Value>),
    Any(Box<Value>),
}

impl Value {
    /// The boolean this value represents for pass/fail purposes, per
    /// §4.2: a boolean result is used as-is; anything else (including an
    /// absent/empty expression, which evaluates to `true`) counts as a pass.
    pub fn as_expression_pass(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            _ => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// The declared output type of a rule's expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultType {
    #[default]
    Bool,
    Scalar,
    List,
    Map,
    Message,
    Any,
}

/// Diagnostic information optionally produced during evaluation, for
/// display to the host. Opaque beyond a human-readable rendering: the
/// backend owns the real structure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub text: String,
}

/// The data record an input is evaluated against. Keyed by variable name;
/// the engine manages the reserved `self` key (§4.3 step 2, §9).
pub type Data = std::collections::HashMap<String, Value>;

/// Reserved key under which a rule's `self` value is injected into `Data`
/// for the duration of its own evaluation.
pub const SELF_KEY: &str = "self";

/// Reserved id for the default catch-all shard.
pub const DEFAULT_SHARD_ID: &str = "default";

/// Reserved id used for an implicitly created root rule.
pub const ROOT_ID: &str = "root";
