//! Value representation for script values

mod callable;
mod compound;
mod display;
mod impls;
mod iter;

pub use callable::{BuiltinFn, BuiltinFnPtr, ClosureValue, Composition, DependencyFnPtr};
pub use compound::{Collection, Color, ScriptObject};
pub use iter::{IterState, ScriptIterator};
pub(crate) use impls::truncate_to_int;

use std::sync::Arc;

use crate::error::EvalError;
use crate::script::Script;

/// Runtime value of the scripting language.
///
/// Values are immutable once built. Heap payloads sit behind `Arc` so
/// copying a value is cheap and values can be handed to other threads.
/// Iterators are the one stateful variant: advancing an iterator is seen
/// by every copy of it.
#[derive(Clone)]
pub enum ScriptValue {
    // ═══════════════════════════════════════════════════════════════════
    // Scalars
    // ═══════════════════════════════════════════════════════════════════
    /// Absence of a value
    Nil,

    /// Boolean: `true` or `false`
    Bool(bool),

    /// 64-bit signed integer
    Int(i64),

    /// 64-bit floating point
    Real(f64),

    /// Immutable string
    String(Arc<String>),

    /// RGBA color
    Color(Color),

    // ═══════════════════════════════════════════════════════════════════
    // Compound Values
    // ═══════════════════════════════════════════════════════════════════
    /// Ordered mapping from string key to value; lists use positional keys
    Collection(Arc<Collection>),

    /// Host object with named members
    Object(Arc<dyn ScriptObject>),

    /// Iterator state for `LOOP`
    Iterator(ScriptIterator),

    // ═══════════════════════════════════════════════════════════════════
    // Callables
    // ═══════════════════════════════════════════════════════════════════
    /// Compiled script used as a function
    Script(Arc<Script>),

    /// Native function provided by the host
    Builtin(BuiltinFn),

    /// Function with some arguments already bound
    Closure(Arc<ClosureValue>),

    /// Two functions applied one after the other
    Composition(Arc<Composition>),

    // ═══════════════════════════════════════════════════════════════════
    // Delayed Errors
    // ═══════════════════════════════════════════════════════════════════
    /// A failure carried as a value until something forces it
    Error(Arc<EvalError>),
}

/// Get a human-readable type name for a value.
pub fn type_name(value: &ScriptValue) -> String {
    match value {
        ScriptValue::Nil => "nil".to_string(),
        ScriptValue::Bool(_) => "boolean".to_string(),
        ScriptValue::Int(_) => "integer".to_string(),
        ScriptValue::Real(_) => "real".to_string(),
        ScriptValue::String(_) => "string".to_string(),
        ScriptValue::Color(_) => "color".to_string(),
        ScriptValue::Collection(_) => "collection".to_string(),
        ScriptValue::Object(obj) => obj.type_name(),
        ScriptValue::Iterator(_) => "iterator".to_string(),
        ScriptValue::Script(_)
        | ScriptValue::Builtin(_)
        | ScriptValue::Closure(_)
        | ScriptValue::Composition(_) => "function".to_string(),
        ScriptValue::Error(_) => "error".to_string(),
    }
}
