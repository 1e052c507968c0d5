//! The evaluation context
//!
//! A [`Context`] owns everything one evaluation needs: the operand stack,
//! the scoped variable table, the call depth counter, the dependency
//! registry and the error reporter used at owner boundaries. Scripts are
//! shared; contexts are not. A background worker creates its own.

mod frame;
mod prelude;

pub use frame::ScopeGuard;

use std::sync::Arc;

use crate::config::EvalConfig;
use crate::dependency::DependencyRegistry;
use crate::environment::Environment;
use crate::error::{EvalError, Result};
use crate::reactive::{ErrorReporter, ScriptErrorReport, TracingReporter};
use crate::value::ScriptValue;
use crate::variable::Variable;

/// Mutable evaluation state.
///
/// # Example
///
/// ```
/// use cardscript::{Context, ScriptValue};
///
/// let mut ctx = Context::new();
/// ctx.set_variable("x", ScriptValue::Int(1));
/// {
///     let mut scope = ctx.scope_guard();
///     scope.set_variable("x", ScriptValue::Int(2));
///     assert_eq!(scope.get_variable("x").unwrap(), ScriptValue::Int(2));
/// }
/// assert_eq!(ctx.get_variable("x").unwrap(), ScriptValue::Int(1));
/// ```
pub struct Context {
    /// Variable bindings and the shadow stack
    env: Environment,

    /// Operand stack shared by nested evaluations
    pub(crate) stack: Vec<ScriptValue>,

    /// Limits and flags
    config: EvalConfig,

    /// Current nesting of calls
    call_depth: usize,

    /// Owners consulted by dependency passes
    registry: DependencyRegistry,

    /// Where owners send errors they catch
    reporter: Arc<dyn ErrorReporter>,

    /// Call sites an error unwound through, innermost first
    backtrace: Vec<String>,

    /// Scripts currently being analysed by a dependency pass
    pub(crate) analyzing: Vec<usize>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create an empty context with default settings.
    pub fn new() -> Self {
        Self::with_config(EvalConfig::default())
    }

    /// Create an empty context with custom settings.
    pub fn with_config(config: EvalConfig) -> Self {
        Self {
            env: Environment::new(),
            stack: Vec::new(),
            config,
            call_depth: 0,
            registry: DependencyRegistry::new(),
            reporter: Arc::new(TracingReporter),
            backtrace: Vec::new(),
            analyzing: Vec::new(),
        }
    }

    /// Settings of this context.
    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Change the settings of this context.
    pub fn config_mut(&mut self) -> &mut EvalConfig {
        &mut self.config
    }

    // ═══════════════════════════════════════════════════════════════════
    // Variables and Scopes
    // ═══════════════════════════════════════════════════════════════════

    /// Enter a new scope, returning the mark to pass to `close_scope`.
    pub fn open_scope(&mut self) -> usize {
        self.env.open_scope()
    }

    /// Leave a scope, restoring every binding made inside it.
    pub fn close_scope(&mut self, mark: usize) {
        self.env.close_scope(mark)
    }

    /// Bind a variable in the current scope.
    pub fn set_variable(&mut self, variable: impl Into<Variable>, value: ScriptValue) {
        self.env.set(variable.into(), value)
    }

    /// Look up a variable, failing if it is unbound.
    pub fn get_variable(&self, variable: impl Into<Variable>) -> Result<ScriptValue> {
        let variable = variable.into();
        self.env
            .get(variable)
            .cloned()
            .ok_or_else(|| EvalError::UnboundVariable {
                name: variable.name(),
            })
    }

    /// Look up a variable, `None` if it is unbound.
    pub fn get_variable_opt(&self, variable: impl Into<Variable>) -> Option<ScriptValue> {
        self.env.get(variable.into()).cloned()
    }

    /// Number of scopes between the current one and the binding of
    /// `variable`, `None` if it is unbound.
    pub fn get_variable_scope(&self, variable: impl Into<Variable>) -> Option<u32> {
        self.env.scope_of(variable.into())
    }

    /// The variable table.
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub(crate) fn environment_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Current height of the operand stack.
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Call Depth Tracking (Stack Overflow Protection)
    // ═══════════════════════════════════════════════════════════════════

    /// Enter a function call. Returns error if max depth exceeded.
    pub(crate) fn enter_call(&mut self) -> Result<()> {
        if self.call_depth >= self.config.max_call_depth {
            return Err(EvalError::StackOverflow {
                depth: self.call_depth,
                max: self.config.max_call_depth,
            });
        }
        self.call_depth += 1;
        Ok(())
    }

    /// Exit a function call.
    pub(crate) fn exit_call(&mut self) {
        self.call_depth = self.call_depth.saturating_sub(1);
    }

    /// Get current call depth.
    pub fn call_depth(&self) -> usize {
        self.call_depth
    }

    pub(crate) fn check_interrupt(&self) -> Result<()> {
        if self.config.is_interrupted() {
            return Err(EvalError::Interrupted);
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Dependencies and Error Reporting
    // ═══════════════════════════════════════════════════════════════════

    /// Owners consulted by dependency passes.
    pub fn registry(&self) -> &DependencyRegistry {
        &self.registry
    }

    /// Register owners for dependency passes.
    pub fn registry_mut(&mut self) -> &mut DependencyRegistry {
        &mut self.registry
    }

    /// Replace the collaborator that displays errors caught by owners.
    pub fn set_error_reporter(&mut self, reporter: Arc<dyn ErrorReporter>) {
        self.reporter = reporter;
    }

    /// Hand an error to the reporter.
    pub fn report(&self, report: &ScriptErrorReport) {
        self.reporter.report(report);
    }

    /// Record a call site the current error is unwinding through.
    pub(crate) fn push_backtrace(&mut self, frame: String) {
        self.backtrace.push(frame);
    }

    pub(crate) fn clear_backtrace(&mut self) {
        self.backtrace.clear();
    }

    /// Take the call sites the last error unwound through, innermost first.
    pub fn take_backtrace(&mut self) -> Vec<String> {
        std::mem::take(&mut self.backtrace)
    }
}
