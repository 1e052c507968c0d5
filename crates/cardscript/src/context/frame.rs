//! RAII scope guard for automatic scope cleanup

use super::Context;

/// RAII guard that closes a scope when dropped.
///
/// The guard dereferences to the [`Context`], so scripts can be evaluated
/// through it; every binding made while it lives is undone on drop, also
/// when evaluation returns early with an error.
///
/// # Example
///
/// ```
/// use cardscript::{Context, ScriptValue};
///
/// let mut ctx = Context::new();
/// {
///     let mut guard = ctx.scope_guard();
///     guard.set_variable("y", ScriptValue::Int(2));
///     // y is visible here
/// }
/// // guard dropped, scope closed, y is gone
/// assert!(ctx.get_variable_opt("y").is_none());
/// ```
pub struct ScopeGuard<'a> {
    ctx: &'a mut Context,
    mark: usize,
}

impl Context {
    /// Create a scope guard that opens a scope now and closes it on drop.
    pub fn scope_guard(&mut self) -> ScopeGuard<'_> {
        let mark = self.open_scope();
        ScopeGuard { ctx: self, mark }
    }
}

impl<'a> Drop for ScopeGuard<'a> {
    fn drop(&mut self) {
        self.ctx.close_scope(self.mark);
    }
}

impl<'a> std::ops::Deref for ScopeGuard<'a> {
    type Target = Context;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl<'a> std::ops::DerefMut for ScopeGuard<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScriptValue;

    #[test]
    fn test_scope_guard_raises_level() {
        let mut ctx = Context::new();
        let initial = ctx.environment().level();
        {
            let guard = ctx.scope_guard();
            assert_eq!(guard.environment().level(), initial + 1);
        }
        assert_eq!(ctx.environment().level(), initial);
    }

    #[test]
    fn test_scope_guard_restores_shadowed_value() {
        let mut ctx = Context::new();
        ctx.set_variable("guard_x", ScriptValue::Int(1));
        {
            let mut guard = ctx.scope_guard();
            guard.set_variable("guard_x", ScriptValue::Int(2));
            assert_eq!(guard.get_variable("guard_x"), Ok(ScriptValue::Int(2)));
        }
        assert_eq!(ctx.get_variable("guard_x"), Ok(ScriptValue::Int(1)));
    }

    #[test]
    fn test_scope_guard_nested_scopes() {
        let mut ctx = Context::new();
        ctx.set_variable("guard_a", ScriptValue::Int(1));
        {
            let mut guard1 = ctx.scope_guard();
            guard1.set_variable("guard_b", ScriptValue::Int(2));
            {
                let mut guard2 = guard1.scope_guard();
                guard2.set_variable("guard_c", ScriptValue::Int(3));
                assert!(guard2.get_variable_opt("guard_a").is_some());
                assert!(guard2.get_variable_opt("guard_b").is_some());
                assert!(guard2.get_variable_opt("guard_c").is_some());
            }
            assert!(guard1.get_variable_opt("guard_c").is_none());
            assert!(guard1.get_variable_opt("guard_b").is_some());
        }
        assert!(ctx.get_variable_opt("guard_b").is_none());
        assert!(ctx.get_variable_opt("guard_a").is_some());
    }

    #[test]
    fn test_scope_guard_cleans_up_on_error_path() {
        fn failing(ctx: &mut Context) -> Result<(), String> {
            let mut guard = ctx.scope_guard();
            guard.set_variable("guard_err", ScriptValue::Int(1));
            Err("boom".to_string())
        }
        let mut ctx = Context::new();
        assert!(failing(&mut ctx).is_err());
        assert!(ctx.get_variable_opt("guard_err").is_none());
        assert_eq!(ctx.environment().level(), 0);
    }
}
