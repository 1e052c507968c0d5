//! Standard prelude with built-in functions

use super::Context;
use crate::value::{type_name, BuiltinFn, ScriptValue};

impl Context {
    /// Create a context with the standard built-in functions.
    pub fn with_prelude() -> Self {
        let mut ctx = Self::new();
        ctx.load_prelude();
        ctx
    }

    /// Bind the standard prelude in the current scope.
    ///
    /// Every prelude function takes its argument from the variable `input`.
    pub fn load_prelude(&mut self) {
        // Conversions
        self.define_builtin(BuiltinFn::new("to_string", builtin_to_string));
        self.define_builtin(BuiltinFn::new("to_int", builtin_to_int));
        self.define_builtin(BuiltinFn::new("to_real", builtin_to_real));
        self.define_builtin(BuiltinFn::new("to_boolean", builtin_to_boolean));

        // Inspection
        self.define_builtin(BuiltinFn::new("length", builtin_length));
        self.define_builtin(BuiltinFn::new("type_name", builtin_type_name));

        // Failure
        self.define_builtin(BuiltinFn::new("error", builtin_error));
    }

    /// Bind a host function under its own name.
    pub fn define_builtin(&mut self, builtin: BuiltinFn) {
        let name = builtin.name.clone();
        self.set_variable(name.as_str(), ScriptValue::Builtin(builtin));
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Function Implementations
// ═══════════════════════════════════════════════════════════════════════

fn input(ctx: &Context) -> anyhow::Result<ScriptValue> {
    Ok(ctx.get_variable("input")?)
}

fn builtin_to_string(ctx: &mut Context) -> anyhow::Result<ScriptValue> {
    Ok(ScriptValue::string(input(ctx)?.to_text()?))
}

fn builtin_to_int(ctx: &mut Context) -> anyhow::Result<ScriptValue> {
    Ok(ScriptValue::Int(input(ctx)?.to_int()?))
}

fn builtin_to_real(ctx: &mut Context) -> anyhow::Result<ScriptValue> {
    Ok(ScriptValue::Real(input(ctx)?.to_real()?))
}

fn builtin_to_boolean(ctx: &mut Context) -> anyhow::Result<ScriptValue> {
    Ok(ScriptValue::Bool(input(ctx)?.to_bool()?))
}

fn builtin_length(ctx: &mut Context) -> anyhow::Result<ScriptValue> {
    Ok(ScriptValue::Int(input(ctx)?.length()? as i64))
}

fn builtin_type_name(ctx: &mut Context) -> anyhow::Result<ScriptValue> {
    Ok(ScriptValue::string(type_name(&input(ctx)?)))
}

fn builtin_error(ctx: &mut Context) -> anyhow::Result<ScriptValue> {
    let message = input(ctx)?.to_text()?;
    anyhow::bail!(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_binds_functions() {
        let ctx = Context::with_prelude();
        for name in ["to_string", "to_int", "length", "type_name", "error"] {
            assert!(
                matches!(ctx.get_variable_opt(name), Some(ScriptValue::Builtin(_))),
                "{name} missing"
            );
        }
    }

    #[test]
    fn test_builtin_reads_input() {
        let mut ctx = Context::new();
        ctx.set_variable("input", ScriptValue::list(vec![1.into(), 2.into()]));
        assert_eq!(builtin_length(&mut ctx).unwrap(), ScriptValue::Int(2));
        assert_eq!(
            builtin_type_name(&mut ctx).unwrap(),
            ScriptValue::string("collection")
        );
    }

    #[test]
    fn test_builtin_error_message() {
        let mut ctx = Context::new();
        ctx.set_variable("input", ScriptValue::string("bad card"));
        let err = builtin_error(&mut ctx).unwrap_err();
        assert_eq!(err.to_string(), "bad card");
    }
}
