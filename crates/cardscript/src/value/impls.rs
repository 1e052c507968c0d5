//! ScriptValue implementations: constructors, conversions, member access, PartialEq

use std::sync::Arc;

use super::*;
use crate::error::Result;

/// Truncate a real toward zero, failing when the result is not an `i64`.
pub(crate) fn truncate_to_int(x: f64) -> Result<i64> {
    let t = x.trunc();
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    if !t.is_finite() || t < i64::MIN as f64 || t >= i64::MAX as f64 {
        return Err(EvalError::IntegerOverflow);
    }
    Ok(t as i64)
}

impl ScriptValue {
    // ═══════════════════════════════════════════════════════════════════
    // Constructors
    // ═══════════════════════════════════════════════════════════════════

    /// Create a string value.
    pub fn string(s: impl Into<String>) -> Self {
        ScriptValue::String(Arc::new(s.into()))
    }

    /// Create a list value.
    pub fn list(items: Vec<ScriptValue>) -> Self {
        ScriptValue::Collection(Arc::new(Collection::list(items)))
    }

    /// Wrap a collection.
    pub fn collection(items: Collection) -> Self {
        ScriptValue::Collection(Arc::new(items))
    }

    /// Wrap a host object.
    pub fn object(obj: impl ScriptObject + 'static) -> Self {
        ScriptValue::Object(Arc::new(obj))
    }

    /// Wrap a host function.
    pub fn builtin<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut crate::Context) -> anyhow::Result<ScriptValue> + Send + Sync + 'static,
    {
        ScriptValue::Builtin(BuiltinFn::new(name, func))
    }

    /// Wrap a script so it can be called.
    pub fn script(script: crate::Script) -> Self {
        ScriptValue::Script(Arc::new(script))
    }

    /// Carry an error as a value.
    pub fn delayed(err: EvalError) -> Self {
        ScriptValue::Error(Arc::new(err))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Predicates
    // ═══════════════════════════════════════════════════════════════════

    /// Check if this is nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, ScriptValue::Nil)
    }

    /// Check if this is a delayed error.
    pub fn is_error(&self) -> bool {
        matches!(self, ScriptValue::Error(_))
    }

    /// Check if this is an integer or a real.
    pub fn is_numeric(&self) -> bool {
        matches!(self, ScriptValue::Int(_) | ScriptValue::Real(_))
    }

    /// Check if this can be called.
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            ScriptValue::Script(_)
                | ScriptValue::Builtin(_)
                | ScriptValue::Closure(_)
                | ScriptValue::Composition(_)
        )
    }

    /// Borrow the string payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Borrow the collection payload.
    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            ScriptValue::Collection(c) => Some(c),
            _ => None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Conversions
    // ═══════════════════════════════════════════════════════════════════

    /// Raise a delayed error, pass anything else through.
    pub fn force(self) -> Result<ScriptValue> {
        match self {
            ScriptValue::Error(err) => Err(err.as_ref().clone()),
            other => Ok(other),
        }
    }

    /// Convert to an integer. Reals are truncated, strings parsed.
    pub fn to_int(&self) -> Result<i64> {
        match self {
            ScriptValue::Int(n) => Ok(*n),
            ScriptValue::Real(n) if n.is_finite() => truncate_to_int(*n),
            ScriptValue::Bool(b) => Ok(i64::from(*b)),
            ScriptValue::String(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| EvalError::conversion("string", "integer")),
            ScriptValue::Error(err) => Err(err.as_ref().clone()),
            other => Err(EvalError::conversion(&type_name(other), "integer")),
        }
    }

    /// Convert to a real.
    pub fn to_real(&self) -> Result<f64> {
        match self {
            ScriptValue::Int(n) => Ok(*n as f64),
            ScriptValue::Real(n) => Ok(*n),
            ScriptValue::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            ScriptValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| EvalError::conversion("string", "real")),
            ScriptValue::Error(err) => Err(err.as_ref().clone()),
            other => Err(EvalError::conversion(&type_name(other), "real")),
        }
    }

    /// Convert to a boolean for conditions.
    pub fn to_bool(&self) -> Result<bool> {
        match self {
            ScriptValue::Bool(b) => Ok(*b),
            ScriptValue::Nil => Ok(false),
            ScriptValue::Int(n) => Ok(*n != 0),
            ScriptValue::Real(n) => Ok(*n != 0.0),
            ScriptValue::String(s) => match s.as_str() {
                "true" | "yes" => Ok(true),
                "false" | "no" | "" => Ok(false),
                _ => Err(EvalError::conversion("string", "boolean")),
            },
            ScriptValue::Error(err) => Err(err.as_ref().clone()),
            other => Err(EvalError::conversion(&type_name(other), "boolean")),
        }
    }

    /// Convert to text. Nil is the empty string.
    pub fn to_text(&self) -> Result<String> {
        match self {
            ScriptValue::Nil => Ok(String::new()),
            ScriptValue::String(s) => Ok(s.as_str().to_string()),
            ScriptValue::Bool(_)
            | ScriptValue::Int(_)
            | ScriptValue::Real(_)
            | ScriptValue::Color(_) => Ok(self.to_string()),
            ScriptValue::Error(err) => Err(err.as_ref().clone()),
            other => Err(EvalError::conversion(&type_name(other), "string")),
        }
    }

    /// Convert to a color.
    pub fn to_color(&self) -> Result<Color> {
        match self {
            ScriptValue::Color(c) => Ok(*c),
            ScriptValue::Error(err) => Err(err.as_ref().clone()),
            other => Err(EvalError::conversion(&type_name(other), "color")),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Members and Iteration
    // ═══════════════════════════════════════════════════════════════════

    /// Look up a member. Failures come back as a delayed error.
    pub fn member(&self, key: &ScriptValue) -> ScriptValue {
        let found = match (self, key) {
            (ScriptValue::Error(_), _) => return self.clone(),
            (_, ScriptValue::Error(_)) => return key.clone(),
            (ScriptValue::Collection(items), ScriptValue::Int(i)) => usize::try_from(*i)
                .ok()
                .and_then(|i| items.get_index(i))
                .cloned(),
            (ScriptValue::Collection(items), ScriptValue::String(name)) => {
                items.get(name).cloned().or_else(|| {
                    name.parse::<usize>()
                        .ok()
                        .and_then(|i| items.get_index(i).cloned())
                })
            }
            (ScriptValue::Object(obj), key) => match key.to_text() {
                Ok(name) => obj.member(&name),
                Err(_) => None,
            },
            (ScriptValue::Color(c), ScriptValue::String(name)) => match name.as_str() {
                "r" | "red" => Some(ScriptValue::Int(i64::from(c.r))),
                "g" | "green" => Some(ScriptValue::Int(i64::from(c.g))),
                "b" | "blue" => Some(ScriptValue::Int(i64::from(c.b))),
                "a" | "alpha" => Some(ScriptValue::Int(i64::from(c.a))),
                _ => None,
            },
            (ScriptValue::String(s), ScriptValue::String(name)) if name.as_str() == "length" => {
                Some(ScriptValue::Int(s.chars().count() as i64))
            }
            _ => None,
        };
        found.unwrap_or_else(|| {
            ScriptValue::delayed(EvalError::NoMember {
                type_name: type_name(self),
                member: key.to_string(),
            })
        })
    }

    /// Turn a value into an iterator. Failures come back as a delayed error.
    pub fn make_iterator(&self) -> ScriptValue {
        match self {
            ScriptValue::Iterator(_) | ScriptValue::Error(_) => self.clone(),
            ScriptValue::Nil => ScriptValue::Iterator(ScriptIterator::empty()),
            ScriptValue::Collection(items) => {
                ScriptValue::Iterator(ScriptIterator::over(items.clone()))
            }
            ScriptValue::Object(obj) => match obj.make_iterator() {
                Some(it) => ScriptValue::Iterator(it),
                None => ScriptValue::delayed(EvalError::NotIterator {
                    type_name: obj.type_name(),
                }),
            },
            other => ScriptValue::delayed(EvalError::NotIterator {
                type_name: type_name(other),
            }),
        }
    }

    /// Number of entries of a collection or characters of a string.
    pub fn length(&self) -> Result<usize> {
        match self {
            ScriptValue::Collection(items) => Ok(items.len()),
            ScriptValue::String(s) => Ok(s.chars().count()),
            ScriptValue::Nil => Ok(0),
            ScriptValue::Error(err) => Err(err.as_ref().clone()),
            other => Err(EvalError::conversion(&type_name(other), "collection")),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Equality
// ═══════════════════════════════════════════════════════════════════════

/// Reals compare equal when they differ only by rounding noise.
pub(crate) fn approx_equal(a: f64, b: f64) -> bool {
    a == b || (a - b).abs() <= 1e-14 * a.abs().max(b.abs()).max(1.0)
}

impl PartialEq for ScriptValue {
    fn eq(&self, other: &Self) -> bool {
        use ScriptValue::*;
        match (self, other) {
            (Nil, Nil) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Real(a), Real(b)) => approx_equal(*a, *b),
            (Int(a), Real(b)) | (Real(b), Int(a)) => approx_equal(*a as f64, *b),
            (String(a), String(b)) => a == b,
            (Color(a), Color(b)) => a == b,
            (Collection(a), Collection(b)) => Arc::ptr_eq(a, b) || a == b,
            (Object(a), Object(b)) => Arc::ptr_eq(a, b),
            (Iterator(a), Iterator(b)) => a.ptr_eq(b),
            (Script(a), Script(b)) => Arc::ptr_eq(a, b),
            (Builtin(a), Builtin(b)) => Arc::ptr_eq(&a.func, &b.func),
            (Closure(a), Closure(b)) => Arc::ptr_eq(a, b),
            (Composition(a), Composition(b)) => Arc::ptr_eq(a, b),
            (Error(a), Error(b)) => a == b,
            _ => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════════

impl Default for ScriptValue {
    fn default() -> Self {
        ScriptValue::Nil
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        ScriptValue::Bool(b)
    }
}

impl From<i64> for ScriptValue {
    fn from(n: i64) -> Self {
        ScriptValue::Int(n)
    }
}

impl From<i32> for ScriptValue {
    fn from(n: i32) -> Self {
        ScriptValue::Int(i64::from(n))
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        ScriptValue::Real(n)
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        ScriptValue::string(s)
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        ScriptValue::string(s)
    }
}

impl From<Color> for ScriptValue {
    fn from(c: Color) -> Self {
        ScriptValue::Color(c)
    }
}

impl From<Collection> for ScriptValue {
    fn from(c: Collection) -> Self {
        ScriptValue::collection(c)
    }
}
