//! Values that may be one of several things
//!
//! Where control flow joins, a dependency pass cannot know which path ran,
//! so it keeps both values. Reading a member of a union reads it from
//! each alternative.

use std::sync::Arc;

use super::Dependency;
use crate::context::Context;
use crate::error::Result;
use crate::value::{ScriptObject, ScriptValue};

/// Either of two values.
pub struct DependencyUnion {
    a: ScriptValue,
    b: ScriptValue,
}

/// Combine the values of two paths.
///
/// Equal values and nil collapse, so a union only appears where the
/// alternatives actually differ.
pub fn unify(a: ScriptValue, b: ScriptValue) -> ScriptValue {
    if a.is_nil() || a == b {
        return b;
    }
    if b.is_nil() {
        return a;
    }
    ScriptValue::Object(Arc::new(DependencyUnion { a, b }))
}

impl DependencyUnion {
    /// The two alternatives.
    pub fn alternatives(&self) -> (&ScriptValue, &ScriptValue) {
        (&self.a, &self.b)
    }
}

impl ScriptObject for DependencyUnion {
    fn type_name(&self) -> String {
        "union".to_string()
    }

    fn member(&self, _name: &str) -> Option<ScriptValue> {
        None
    }

    fn dependency_member(&self, name: &str, dep: &Dependency) -> ScriptValue {
        unify(
            super::pass::dependency_member(&self.a, name, dep),
            super::pass::dependency_member(&self.b, name, dep),
        )
    }

    fn dependency_iterator(&self, dep: &Dependency) -> ScriptValue {
        // Both sides are signalled; the first stands in for the loop
        let first = super::pass::dependency_iterator(&self.a, dep);
        super::pass::dependency_iterator(&self.b, dep);
        first
    }

    fn dependencies(&self, ctx: &mut Context, dep: &Dependency) -> Result<ScriptValue> {
        let a = ctx.call_dependencies(&self.a, Vec::new(), dep)?;
        let b = ctx.call_dependencies(&self.b, Vec::new(), dep)?;
        Ok(unify(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unify_collapses_nil_and_equal() {
        assert_eq!(unify(ScriptValue::Nil, ScriptValue::Int(1)), ScriptValue::Int(1));
        assert_eq!(unify(ScriptValue::Int(1), ScriptValue::Nil), ScriptValue::Int(1));
        assert_eq!(unify(ScriptValue::Int(2), ScriptValue::Int(2)), ScriptValue::Int(2));
    }

    #[test]
    fn test_unify_keeps_both() {
        let u = unify(ScriptValue::Int(1), ScriptValue::string("x"));
        assert!(matches!(u, ScriptValue::Object(_)));
    }
}
