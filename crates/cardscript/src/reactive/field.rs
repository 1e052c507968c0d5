//! Template field values

use std::sync::Arc;

use tracing::debug;

use super::{ChangeMask, Owner, ScriptErrorReport, Scriptable};
use crate::context::Context;
use crate::dependency::{Dependency, DependentScripts};
use crate::error::Result;
use crate::script::Script;
use crate::value::ScriptValue;

/// A field of a card.
///
/// The value script sees the stored value as the variable `value`, so a
/// script can normalise what the user typed as well as derive a value
/// from other fields.
#[derive(Debug, Clone)]
pub struct FieldValue {
    name: String,
    value: Scriptable<ScriptValue>,
    dependents: Arc<DependentScripts>,
}

impl FieldValue {
    /// A field holding `value` with no script.
    pub fn new(name: impl Into<String>, value: ScriptValue) -> Self {
        Self {
            name: name.into(),
            value: Scriptable::new(value),
            dependents: Arc::new(DependentScripts::new()),
        }
    }

    /// A field computed by `script`.
    pub fn scripted(name: impl Into<String>, initial: ScriptValue, script: Arc<Script>) -> Self {
        Self {
            name: name.into(),
            value: Scriptable::scripted(initial, script),
            dependents: Arc::new(DependentScripts::new()),
        }
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    pub fn value(&self) -> &ScriptValue {
        self.value.value()
    }

    /// Store a new value, as from user input. Returns whether it changed.
    pub fn set_value(&mut self, value: ScriptValue) -> bool {
        if *self.value.value() == value {
            return false;
        }
        self.value.set_value(value);
        true
    }

    fn try_update(&mut self, ctx: &mut Context) -> Result<bool> {
        let mut scope = ctx.scope_guard();
        scope.set_variable("value", self.value.value().clone());
        self.value.update(&mut scope)
    }
}

impl Owner for FieldValue {
    fn init_dependencies(&self, ctx: &mut Context, dep: &Dependency) -> Result<()> {
        self.value.init_dependencies(ctx, dep)
    }

    fn update(&mut self, ctx: &mut Context, only_content_dependent: bool) -> ChangeMask {
        if only_content_dependent {
            return ChangeMask::NONE;
        }
        match self.try_update(ctx) {
            Ok(true) => {
                debug!(field = %self.name, "field changed");
                ChangeMask::OTHER
            }
            Ok(false) => ChangeMask::NONE,
            Err(err) => {
                let report = ScriptErrorReport::new(ctx, &self.name, "value", err);
                ctx.report(&report);
                ChangeMask::NONE
            }
        }
    }

    fn dependent_scripts(&self) -> &Arc<DependentScripts> {
        &self.dependents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{BinaryOp, ScriptBuilder};

    #[test]
    fn test_script_sees_stored_value() {
        let mut b = ScriptBuilder::new();
        b.get_var("value");
        b.push_const(ScriptValue::string("!"));
        b.binary(BinaryOp::Add);
        b.ret();
        let mut field = FieldValue::scripted(
            "title",
            ScriptValue::string("hi"),
            Arc::new(b.build().unwrap()),
        );
        let mut ctx = Context::new();
        assert_eq!(field.update(&mut ctx, false), ChangeMask::OTHER);
        assert_eq!(field.value(), &ScriptValue::string("hi!"));
        assert!(ctx.get_variable_opt("value").is_none());
    }

    #[test]
    fn test_content_phase_skips_fields() {
        let mut field = FieldValue::new("title", ScriptValue::Nil);
        let mut ctx = Context::new();
        assert!(field.update(&mut ctx, true).is_empty());
    }
}
