//! Scoped variable storage
//!
//! Every interned [`Variable`] owns one slot in a dense table holding its
//! current value and the scope level it was bound at. Rebinding a variable
//! that belongs to an outer scope first saves the old slot on a shadow
//! stack; closing the scope pops the shadow stack back to the mark taken
//! when the scope was opened, so bindings are restored in LIFO order.

use crate::value::ScriptValue;
use crate::variable::Variable;

/// Current value of one variable.
#[derive(Debug, Clone, Default)]
pub(crate) struct VariableValue {
    /// Scope level the value was bound at
    level: u32,

    /// The value, if bound
    value: Option<ScriptValue>,
}

/// A saved outer binding, restored when its scope closes.
#[derive(Debug, Clone)]
pub struct Binding {
    /// The variable that was rebound
    pub variable: Variable,

    previous: VariableValue,
}

/// The variable table of a [`Context`](crate::Context).
///
/// # Example
///
/// ```
/// use cardscript::{Environment, ScriptValue, Variable};
///
/// let x = Variable::intern("x");
/// let mut env = Environment::new();
/// env.set(x, ScriptValue::Int(1));
///
/// let mark = env.open_scope();
/// env.set(x, ScriptValue::Int(10)); // Shadows outer x
/// assert_eq!(env.get(x), Some(&ScriptValue::Int(10)));
/// env.close_scope(mark);
///
/// assert_eq!(env.get(x), Some(&ScriptValue::Int(1))); // Back to outer x
/// ```
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// One slot per interned variable id
    variables: Vec<VariableValue>,

    /// Outer bindings hidden by inner scopes, most recent at end
    shadowed: Vec<Binding>,

    /// Current scope level, 0 is the outermost
    level: u32,
}

impl Environment {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Scope Entry/Exit
    // ═══════════════════════════════════════════════════════════════════

    /// Enter a new scope, returning the mark to pass to `close_scope`.
    pub fn open_scope(&mut self) -> usize {
        self.level += 1;
        self.shadowed.len()
    }

    /// Leave a scope, restoring every binding it hid.
    pub fn close_scope(&mut self, mark: usize) {
        self.level = self.level.saturating_sub(1);
        self.restore_to(mark);
    }

    /// Undo bindings made since `mark` without leaving the scope.
    pub(crate) fn restore_to(&mut self, mark: usize) {
        while self.shadowed.len() > mark {
            if let Some(binding) = self.shadowed.pop() {
                self.variables[binding.variable.id() as usize] = binding.previous;
            }
        }
    }

    /// Current scope level.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Number of saved outer bindings.
    pub fn shadow_depth(&self) -> usize {
        self.shadowed.len()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Binding and Lookup
    // ═══════════════════════════════════════════════════════════════════

    /// Bind a variable in the current scope.
    ///
    /// A binding from an outer scope, or the absence of one, is saved first
    /// so that closing the current scope brings it back.
    pub fn set(&mut self, variable: Variable, value: ScriptValue) {
        let index = variable.id() as usize;
        if index >= self.variables.len() {
            self.variables.resize_with(index + 1, VariableValue::default);
        }
        let slot = &mut self.variables[index];
        if self.level > 0 && (slot.value.is_none() || slot.level < self.level) {
            self.shadowed.push(Binding {
                variable,
                previous: slot.clone(),
            });
        }
        slot.level = self.level;
        slot.value = Some(value);
    }

    /// Look up a variable.
    pub fn get(&self, variable: Variable) -> Option<&ScriptValue> {
        self.variables
            .get(variable.id() as usize)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Number of scopes between the current one and the binding of
    /// `variable`, or `None` if it is unbound.
    pub fn scope_of(&self, variable: Variable) -> Option<u32> {
        let slot = self.variables.get(variable.id() as usize)?;
        slot.value.as_ref()?;
        Some(self.level.saturating_sub(slot.level))
    }

    /// Variables bound since `mark`, with their current values.
    pub(crate) fn bound_since(&self, mark: usize) -> Vec<(Variable, Option<ScriptValue>)> {
        self.shadowed[mark.min(self.shadowed.len())..]
            .iter()
            .map(|b| (b.variable, self.get(b.variable).cloned()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Variable {
        Variable::intern(name)
    }

    #[test]
    fn test_unbound_variable_is_restored_to_unbound() {
        let x = var("env_fresh");
        let mut env = Environment::new();
        let mark = env.open_scope();
        env.set(x, ScriptValue::Int(1));
        assert!(env.get(x).is_some());
        env.close_scope(mark);
        assert!(env.get(x).is_none());
    }

    #[test]
    fn test_same_scope_rebinding_overwrites() {
        let x = var("env_overwrite");
        let mut env = Environment::new();
        let mark = env.open_scope();
        env.set(x, ScriptValue::Int(1));
        env.set(x, ScriptValue::Int(2));
        assert_eq!(env.shadow_depth(), mark + 1);
        assert_eq!(env.get(x), Some(&ScriptValue::Int(2)));
        env.close_scope(mark);
    }

    #[test]
    fn test_nested_scopes_restore_in_order() {
        let x = var("env_nested");
        let mut env = Environment::new();
        env.set(x, ScriptValue::Int(0));
        let outer = env.open_scope();
        env.set(x, ScriptValue::Int(1));
        let inner = env.open_scope();
        env.set(x, ScriptValue::Int(2));
        assert_eq!(env.scope_of(x), Some(0));
        env.close_scope(inner);
        assert_eq!(env.get(x), Some(&ScriptValue::Int(1)));
        env.close_scope(outer);
        assert_eq!(env.get(x), Some(&ScriptValue::Int(0)));
        assert_eq!(env.shadow_depth(), 0);
    }

    #[test]
    fn test_scope_of_counts_levels() {
        let x = var("env_levels");
        let mut env = Environment::new();
        assert_eq!(env.scope_of(x), None);
        env.set(x, ScriptValue::Nil);
        let a = env.open_scope();
        let b = env.open_scope();
        assert_eq!(env.scope_of(x), Some(2));
        env.close_scope(b);
        env.close_scope(a);
        assert_eq!(env.scope_of(x), Some(0));
    }

    #[test]
    fn test_bound_since_lists_scope_bindings() {
        let x = var("env_since_x");
        let y = var("env_since_y");
        let mut env = Environment::new();
        let mark = env.open_scope();
        env.set(x, ScriptValue::Int(1));
        env.set(y, ScriptValue::Int(2));
        let bound = env.bound_since(mark);
        assert_eq!(
            bound,
            vec![(x, Some(ScriptValue::Int(1))), (y, Some(ScriptValue::Int(2)))]
        );
        env.restore_to(mark);
        assert!(env.get(x).is_none());
        assert_eq!(env.level(), 1);
        env.close_scope(mark);
    }
}
