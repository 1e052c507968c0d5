//! Callable value types: builtins, closures and compositions

use std::sync::Arc;

use super::ScriptValue;
use crate::context::Context;
use crate::dependency::Dependency;
use crate::error::Result;
use crate::variable::Variable;

/// Host function body. Arguments are read from the context's variables.
pub type BuiltinFnPtr = Arc<dyn Fn(&mut Context) -> anyhow::Result<ScriptValue> + Send + Sync>;

/// Host hook run instead of the function during a dependency pass.
pub type DependencyFnPtr =
    Arc<dyn Fn(&mut Context, &Dependency) -> Result<ScriptValue> + Send + Sync>;

/// A native function exposed to scripts.
///
/// Builtins take their arguments from variables bound by the caller, the
/// single-argument convention being the variable `input`.
#[derive(Clone)]
pub struct BuiltinFn {
    /// Function name (for messages and backtraces)
    pub name: String,

    /// The function body
    pub func: BuiltinFnPtr,

    /// What the function reads, for dependency analysis
    pub dependencies: Option<DependencyFnPtr>,
}

impl BuiltinFn {
    /// Wrap a host closure.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut Context) -> anyhow::Result<ScriptValue> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
            dependencies: None,
        }
    }

    /// Attach a dependency hook.
    pub fn with_dependencies<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Context, &Dependency) -> Result<ScriptValue> + Send + Sync + 'static,
    {
        self.dependencies = Some(Arc::new(hook));
        self
    }
}

impl std::fmt::Debug for BuiltinFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BuiltinFn({})", self.name)
    }
}

/// A function together with argument bindings captured by `CLOSURE`.
///
/// Only the arguments given to `CLOSURE` are captured, never the rest of
/// the environment.
#[derive(Debug, Clone)]
pub struct ClosureValue {
    /// The function being partially applied
    pub function: ScriptValue,

    /// Captured argument bindings
    pub bindings: Vec<(Variable, ScriptValue)>,
}

impl ClosureValue {
    /// Flatten closures of closures into a single closure.
    ///
    /// Bindings of the outer closure win over those of the inner one.
    pub fn new(function: ScriptValue, bindings: Vec<(Variable, ScriptValue)>) -> Self {
        match function {
            ScriptValue::Closure(inner) => {
                let mut merged = inner.bindings.clone();
                for (var, value) in bindings {
                    merged.retain(|(v, _)| *v != var);
                    merged.push((var, value));
                }
                Self {
                    function: inner.function.clone(),
                    bindings: merged,
                }
            }
            function => Self { function, bindings },
        }
    }
}

/// `first + second` on functions: `second` applied to the result of `first`.
#[derive(Debug, Clone)]
pub struct Composition {
    /// Applied first
    pub first: ScriptValue,

    /// Applied to the result of `first`, which it sees as `input`
    pub second: ScriptValue,
}
