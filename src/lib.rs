//! Indigo: a hot-reloadable, hierarchical rules engine.
//!
//! Two subsystems compose the crate:
//!
//! - The [`engine`] module walks a [`rule::Rule`] tree against an input
//!   record, honoring per-rule traversal options and optionally fanning
//!   sibling evaluation out to a bounded worker pool.
//! - The [`vault`] module publishes rule trees behind a copy-on-write
//!   snapshot, letting readers traverse a consistent tree while batched
//!   mutations are applied concurrently.
//!
//! Both are generic over a pluggable [`backend::Backend`], which compiles
//! and evaluates each rule's expression; this crate ships a minimal
//! reference backend under [`testutil`] for its own tests, demos, and
//! benchmarks.

pub mod backend;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod result;
pub mod rule;
pub mod value;
pub mod vault;

pub mod testutil;

pub use backend::{Backend, EmptySchema, Schema};
pub use config::EngineConfig;
pub use context::{CancelHandle, EvalContext};
pub use engine::{CompileOptions, Engine};
pub use error::{IndigoError, Result};
pub use result::EvalResult;
pub use rule::{DiscardFail, EvalOptions, ParallelOptions, Rule};
pub use value::{Data, Diagnostics, ResultType, Value};
pub use vault::{Op, ShardPredicate, Vault};
