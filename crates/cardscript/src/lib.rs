//! # Cardscript
//!
//! A stack-based bytecode runtime for the scripts of card templates, with
//! dependency tracking so that derived values are recomputed only when
//! something they read has changed.
//!
//! Scripts are produced by an external compiler (or assembled with
//! [`ScriptBuilder`]) and are immutable and shareable across threads. Each
//! thread evaluates them on its own [`Context`].
//!
//! ## Architecture
//!
//! - **Values**: [`ScriptValue`], reference counted and immutable
//! - **Scripts**: packed [`Instruction`]s plus a constant table
//! - **Context**: operand stack, scoped variables, calls and closures
//! - **Dependency pass**: records which owners a script reads
//! - **Reactive owners**: fields and styles updated in two phases around
//!   layout
//! - **Worker**: a background thread with its own context and a result
//!   cache

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod dependency;
pub mod environment;
pub mod error;
mod eval;
pub mod reactive;
pub mod script;
pub mod value;
pub mod variable;
pub mod worker;

// Re-export main types
pub use config::{EvalConfig, InterruptHandle, DEFAULT_MAX_CALL_DEPTH};
pub use context::{Context, ScopeGuard};
pub use dependency::{
    canonical_name, unify, Dependency, DependencyKind, DependencyRegistry, DependencyUnion,
    DependentScripts, RegistryNode,
};
pub use environment::{Binding, Environment};
pub use error::{EncodeError, EvalError, Result};
pub use reactive::{
    ChangeMask, CollectingReporter, ErrorReporter, FieldValue, FromScript, Measurement, Owner,
    ScriptErrorReport, Scriptable, Style, StyleListener, Template, TracingReporter,
};
pub use script::{
    BinaryOp, Instruction, Label, Opcode, QuaternaryOp, Script, ScriptBuilder, TernaryOp, UnaryOp,
};
pub use value::{
    type_name, BuiltinFn, BuiltinFnPtr, ClosureValue, Collection, Color, Composition,
    DependencyFnPtr, IterState, ScriptIterator, ScriptObject, ScriptValue,
};
pub use variable::Variable;
pub use worker::{CacheEntry, CacheStatus, Finished, Generator, ThumbnailWorker};

/// Cardscript version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }
}
