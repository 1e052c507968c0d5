//! A value that may be computed by a script

use std::sync::Arc;

use crate::context::Context;
use crate::dependency::Dependency;
use crate::error::{type_name, EvalError, Result};
use crate::script::Script;
use crate::value::{Color, ScriptValue};

/// Conversion from a script result to a host value.
pub trait FromScript: Sized {
    /// Convert, failing for values of the wrong type.
    fn from_script(value: &ScriptValue) -> Result<Self>;
}

impl FromScript for ScriptValue {
    fn from_script(value: &ScriptValue) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromScript for f64 {
    fn from_script(value: &ScriptValue) -> Result<Self> {
        value.to_real()
    }
}

impl FromScript for i64 {
    fn from_script(value: &ScriptValue) -> Result<Self> {
        value.to_int()
    }
}

impl FromScript for bool {
    fn from_script(value: &ScriptValue) -> Result<Self> {
        value.to_bool()
    }
}

impl FromScript for String {
    fn from_script(value: &ScriptValue) -> Result<Self> {
        value.to_text()
    }
}

impl FromScript for Color {
    fn from_script(value: &ScriptValue) -> Result<Self> {
        match value {
            ScriptValue::Color(c) => Ok(*c),
            other => Err(EvalError::conversion(&type_name(other), "color")),
        }
    }
}

/// A host value, optionally computed by a script.
///
/// Without a script the value is fixed. With one, [`update`](Self::update)
/// evaluates the script and stores the converted result, leaving the old
/// value untouched if evaluation or conversion fails.
#[derive(Debug, Clone)]
pub struct Scriptable<T> {
    value: T,
    script: Option<Arc<Script>>,
    content_dependent: bool,
}

impl<T: Default> Default for Scriptable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Scriptable<T> {
    /// A fixed value.
    pub fn new(value: T) -> Self {
        Self {
            value,
            script: None,
            content_dependent: false,
        }
    }

    /// A value computed by `script`, starting at `initial`.
    pub fn scripted(initial: T, script: Arc<Script>) -> Self {
        Self {
            value: initial,
            script: Some(script),
            content_dependent: false,
        }
    }

    /// The current value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Overwrite the value.
    pub fn set_value(&mut self, value: T) {
        self.value = value;
    }

    /// The script, if any.
    pub fn script(&self) -> Option<&Arc<Script>> {
        self.script.as_ref()
    }

    /// True if the value comes from a script.
    pub fn is_scripted(&self) -> bool {
        self.script.is_some()
    }

    /// True if the script reads measured content.
    pub fn is_content_dependent(&self) -> bool {
        self.content_dependent
    }

    /// Register `dep` with everything the script reads.
    pub fn init_dependencies(&self, ctx: &mut Context, dep: &Dependency) -> Result<()> {
        if let Some(script) = &self.script {
            ctx.dependencies(dep, script)?;
        }
        Ok(())
    }

    /// Find out whether the script reads measured content.
    pub fn check_content_dependency(&mut self, ctx: &mut Context) -> Result<bool> {
        if let Some(script) = &self.script {
            let dummy = Dependency::dummy();
            ctx.dependencies(&dummy, script)?;
            self.content_dependent = dummy.is_content_dependent();
        }
        Ok(self.content_dependent)
    }
}

impl<T: FromScript + PartialEq> Scriptable<T> {
    /// Re-run the script. Returns whether the value changed.
    pub fn update(&mut self, ctx: &mut Context) -> Result<bool> {
        let Some(script) = &self.script else {
            return Ok(false);
        };
        let result = ctx.eval(script, true)?;
        let value = T::from_script(&result)?;
        if value == self.value {
            return Ok(false);
        }
        self.value = value;
        Ok(true)
    }
}
