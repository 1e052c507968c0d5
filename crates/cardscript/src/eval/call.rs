//! Function calls, closures and tail calls

use std::sync::Arc;

use tracing::debug;

use super::Flow;
use crate::context::Context;
use crate::error::{type_name, EvalError, Result};
use crate::value::{ClosureValue, ScriptValue};
use crate::variable::Variable;

impl Context {
    /// Call a function value with named arguments.
    ///
    /// Arguments are bound in a fresh scope that is closed when the call
    /// returns. Calling something that is not a function, and failures of
    /// host functions, produce a delayed error rather than failing outright.
    pub fn call_value(
        &mut self,
        function: &ScriptValue,
        args: Vec<(Variable, ScriptValue)>,
    ) -> Result<ScriptValue> {
        match function {
            ScriptValue::Script(script) => {
                self.enter_call()?;
                let mark = self.open_scope();
                for (var, value) in args {
                    self.environment_mut().set(var, value);
                }
                let result = self.execute(script, Some(mark));
                self.exit_call();
                result
            }

            ScriptValue::Builtin(builtin) => {
                if let Some((_, err)) = args.iter().find(|(_, value)| value.is_error()) {
                    return Ok(err.clone());
                }
                self.enter_call()?;
                let result = {
                    let mut scope = self.scope_guard();
                    for (var, value) in args {
                        scope.set_variable(var, value);
                    }
                    (builtin.func)(&mut *scope)
                };
                self.exit_call();
                match result {
                    Ok(value) => Ok(value),
                    Err(err) => match EvalError::from_host(&builtin.name, err) {
                        err @ (EvalError::Interrupted | EvalError::StackOverflow { .. }) => {
                            Err(err)
                        }
                        err => {
                            debug!(builtin = %builtin.name, error = %err, "host function failed");
                            Ok(ScriptValue::delayed(err))
                        }
                    },
                }
            }

            ScriptValue::Closure(closure) => {
                let mut bindings = closure.bindings.clone();
                bindings.extend(args);
                self.call_value(&closure.function, bindings)
            }

            ScriptValue::Composition(composition) => {
                let intermediate = self.call_value(&composition.first, args)?;
                self.call_value(
                    &composition.second,
                    vec![(Variable::intern("input"), intermediate)],
                )
            }

            ScriptValue::Error(_) => Ok(function.clone()),

            other => Ok(ScriptValue::delayed(EvalError::NotCallable {
                type_name: type_name(other),
            })),
        }
    }

    /// Partially apply a function to the arguments of the current call.
    ///
    /// Only `args` are captured; variables of enclosing scopes are not.
    pub fn make_closure(
        &self,
        function: ScriptValue,
        args: Vec<(Variable, ScriptValue)>,
    ) -> ScriptValue {
        if function.is_error() {
            return function;
        }
        ScriptValue::Closure(Arc::new(ClosureValue::new(function, args)))
    }
}

/// Resolve a tail call to a script, or hand the call back unchanged.
pub(super) fn tail_target(
    function: ScriptValue,
    args: Vec<(Variable, ScriptValue)>,
) -> std::result::Result<Flow, (ScriptValue, Vec<(Variable, ScriptValue)>)> {
    let target = match &function {
        ScriptValue::Script(script) => Some((script.clone(), Vec::new())),
        ScriptValue::Closure(closure) => match &closure.function {
            ScriptValue::Script(script) => Some((script.clone(), closure.bindings.clone())),
            _ => None,
        },
        _ => None,
    };
    match target {
        Some((script, mut bindings)) => {
            bindings.extend(args);
            Ok(Flow::TailCall { script, bindings })
        }
        None => Err((function, args)),
    }
}
