//! Operator semantics for UNARY, BINARY, TERNARY and QUATERNARY
//!
//! Operators never fail the evaluation directly: a failure becomes a
//! delayed error value, and a delayed error operand passes through
//! unchanged. `OR_ELSE` is the one operator that looks inside errors.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{type_name, EvalError, Result};
use crate::script::{BinaryOp, QuaternaryOp, TernaryOp, UnaryOp};
use crate::value::{truncate_to_int, Color, ScriptIterator, ScriptValue};

/// Apply a unary operator.
pub(crate) fn unary(op: UnaryOp, a: ScriptValue) -> ScriptValue {
    if a.is_error() {
        return a;
    }
    let result = match op {
        UnaryOp::IteratorC => return a.make_iterator(),
        UnaryOp::Negate => match a {
            ScriptValue::Int(n) => n
                .checked_neg()
                .map(ScriptValue::Int)
                .ok_or(EvalError::IntegerOverflow),
            ScriptValue::Real(n) => Ok(ScriptValue::Real(-n)),
            other => Err(EvalError::conversion(&type_name(&other), "number")),
        },
        UnaryOp::Not => a.to_bool().map(|b| ScriptValue::Bool(!b)),
    };
    result.unwrap_or_else(ScriptValue::delayed)
}

/// Apply a binary operator to `a op b`.
pub(crate) fn binary(op: BinaryOp, a: ScriptValue, b: ScriptValue) -> ScriptValue {
    if op == BinaryOp::OrElse {
        return if a.is_error() { b } else { a };
    }
    if a.is_error() {
        return a;
    }
    if b.is_error() {
        return b;
    }
    match op {
        BinaryOp::Member => a.member(&b),
        BinaryOp::Add => add(a, b),
        _ => try_binary(op, &a, &b).unwrap_or_else(ScriptValue::delayed),
    }
}

/// Apply a ternary operator.
pub(crate) fn ternary(
    op: TernaryOp,
    a: ScriptValue,
    b: ScriptValue,
    c: ScriptValue,
) -> ScriptValue {
    let result = match op {
        TernaryOp::Rgb => {
            channels(&[a, b, c]).map(|[r, g, b]| ScriptValue::Color(Color::rgb(r, g, b)))
        }
    };
    result.unwrap_or_else(ScriptValue::delayed)
}

/// Apply a quaternary operator.
pub(crate) fn quaternary(
    op: QuaternaryOp,
    a: ScriptValue,
    b: ScriptValue,
    c: ScriptValue,
    d: ScriptValue,
) -> ScriptValue {
    let result = match op {
        QuaternaryOp::Rgba => {
            channels(&[a, b, c, d])
                .map(|[r, g, b, a]| ScriptValue::Color(Color::rgba(r, g, b, a)))
        }
    };
    result.unwrap_or_else(ScriptValue::delayed)
}

fn channels<const N: usize>(values: &[ScriptValue; N]) -> Result<[u8; N]> {
    let mut out = [0u8; N];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = value.to_int()?.clamp(0, 255) as u8;
    }
    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════
// Arithmetic
// ═══════════════════════════════════════════════════════════════════════

/// Addition is overloaded: nil is the identity, functions compose,
/// collections concatenate and strings concatenate.
fn add(a: ScriptValue, b: ScriptValue) -> ScriptValue {
    use ScriptValue::*;
    let result = match (&a, &b) {
        (Nil, _) => Ok(b.clone()),
        (_, Nil) => Ok(a.clone()),
        _ if a.is_callable() && b.is_callable() => Ok(Composition(Arc::new(
            crate::value::Composition {
                first: a.clone(),
                second: b.clone(),
            },
        ))),
        (Collection(x), Collection(y)) => Ok(ScriptValue::collection(x.concat(y))),
        (String(_), _) | (_, String(_)) => match (a.to_text(), b.to_text()) {
            (Ok(x), Ok(y)) => Ok(ScriptValue::string(x + &y)),
            _ => Err(EvalError::operands("+", &type_name(&a), &type_name(&b))),
        },
        (Int(x), Int(y)) => x
            .checked_add(*y)
            .map(Int)
            .ok_or(EvalError::IntegerOverflow),
        _ => real_pair("+", &a, &b).map(|(x, y)| Real(x + y)),
    };
    result.unwrap_or_else(ScriptValue::delayed)
}

/// Both operands as reals, if both are numbers.
fn real_pair(op: &str, a: &ScriptValue, b: &ScriptValue) -> Result<(f64, f64)> {
    if a.is_numeric() && b.is_numeric() {
        return Ok((a.to_real()?, b.to_real()?));
    }
    Err(EvalError::operands(op, &type_name(a), &type_name(b)))
}

/// Checked integer arithmetic with real fallback for mixed operands.
macro_rules! arithmetic {
    ($a:expr, $b:expr, $sym:literal, $checked:ident, $real:expr) => {
        match ($a, $b) {
            (ScriptValue::Int(x), ScriptValue::Int(y)) => x
                .$checked(*y)
                .map(ScriptValue::Int)
                .ok_or(EvalError::IntegerOverflow),
            (a, b) => real_pair($sym, a, b).map(|(x, y)| ScriptValue::Real($real(x, y))),
        }
    };
}

fn try_binary(op: BinaryOp, a: &ScriptValue, b: &ScriptValue) -> Result<ScriptValue> {
    match op {
        BinaryOp::IteratorR => Ok(ScriptValue::Iterator(ScriptIterator::range(
            range_bound(a)?,
            range_bound(b)?,
        ))),
        BinaryOp::Sub => arithmetic!(a, b, "-", checked_sub, |x: f64, y: f64| x - y),
        BinaryOp::Mul => arithmetic!(a, b, "*", checked_mul, |x: f64, y: f64| x * y),
        BinaryOp::FDiv => {
            let (x, y) = real_pair("/", a, b)?;
            if y == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(ScriptValue::Real(x / y))
        }
        BinaryOp::Div => match (a, b) {
            (ScriptValue::Int(_), ScriptValue::Int(0)) => Err(EvalError::DivisionByZero),
            (ScriptValue::Int(x), ScriptValue::Int(y)) => x
                .checked_div(*y)
                .map(ScriptValue::Int)
                .ok_or(EvalError::IntegerOverflow),
            _ => {
                let (x, y) = real_pair("div", a, b)?;
                if y == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                truncate_to_int(x / y).map(ScriptValue::Int)
            }
        },
        BinaryOp::Mod => match (a, b) {
            (ScriptValue::Int(_), ScriptValue::Int(0)) => Err(EvalError::DivisionByZero),
            (ScriptValue::Int(x), ScriptValue::Int(y)) => x
                .checked_rem(*y)
                .map(ScriptValue::Int)
                .ok_or(EvalError::IntegerOverflow),
            _ => {
                let (x, y) = real_pair("mod", a, b)?;
                if y == 0.0 {
                    return Err(EvalError::DivisionByZero);
                }
                Ok(ScriptValue::Real(x % y))
            }
        },
        BinaryOp::Pow => match (a, b) {
            (ScriptValue::Int(x), ScriptValue::Int(y)) if *y >= 0 => u32::try_from(*y)
                .ok()
                .and_then(|y| x.checked_pow(y))
                .map(ScriptValue::Int)
                .ok_or(EvalError::IntegerOverflow),
            _ => real_pair("^", a, b).map(|(x, y)| ScriptValue::Real(x.powf(y))),
        },

        BinaryOp::And => Ok(ScriptValue::Bool(a.to_bool()? && b.to_bool()?)),
        BinaryOp::Or => Ok(ScriptValue::Bool(a.to_bool()? || b.to_bool()?)),
        BinaryOp::Xor => Ok(ScriptValue::Bool(a.to_bool()? != b.to_bool()?)),

        BinaryOp::Eq => Ok(ScriptValue::Bool(script_equal(a, b))),
        BinaryOp::Neq => Ok(ScriptValue::Bool(!script_equal(a, b))),
        BinaryOp::Lt => compare(op, a, b).map(|o| ScriptValue::Bool(o == Ordering::Less)),
        BinaryOp::Gt => compare(op, a, b).map(|o| ScriptValue::Bool(o == Ordering::Greater)),
        BinaryOp::Le => compare(op, a, b).map(|o| ScriptValue::Bool(o != Ordering::Greater)),
        BinaryOp::Ge => compare(op, a, b).map(|o| ScriptValue::Bool(o != Ordering::Less)),
        BinaryOp::Min => compare(op, a, b).map(|o| {
            if o == Ordering::Greater {
                b.clone()
            } else {
                a.clone()
            }
        }),
        BinaryOp::Max => compare(op, a, b).map(|o| {
            if o == Ordering::Less {
                b.clone()
            } else {
                a.clone()
            }
        }),

        // Handled before dispatch
        BinaryOp::Add | BinaryOp::Member | BinaryOp::OrElse => {
            Ok(binary(op, a.clone(), b.clone()))
        }
    }
}

fn range_bound(value: &ScriptValue) -> Result<i64> {
    match value {
        ScriptValue::Int(n) => Ok(*n),
        other => Err(EvalError::conversion(&type_name(other), "integer")),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Comparison
// ═══════════════════════════════════════════════════════════════════════

/// Equality as scripts see it: a string equals a scalar with the same text.
pub(crate) fn script_equal(a: &ScriptValue, b: &ScriptValue) -> bool {
    use ScriptValue::*;
    match (a, b) {
        (String(s), Int(_) | Real(_) | Bool(_)) | (Int(_) | Real(_) | Bool(_), String(s)) => {
            let other = if matches!(a, String(_)) { b } else { a };
            other.to_text().map(|t| t == **s).unwrap_or(false)
        }
        _ => a == b,
    }
}

/// Order two values; numbers with numbers, strings with strings.
fn compare(op: BinaryOp, a: &ScriptValue, b: &ScriptValue) -> Result<Ordering> {
    use ScriptValue::*;
    let ordering = match (a, b) {
        (Int(x), Int(y)) => Some(x.cmp(y)),
        (Int(_) | Real(_), Int(_) | Real(_)) => a.to_real()?.partial_cmp(&b.to_real()?),
        (String(x), String(y)) => Some(x.cmp(y)),
        (Bool(x), Bool(y)) => Some(x.cmp(y)),
        _ => None,
    };
    ordering.ok_or_else(|| EvalError::operands(op.name(), &type_name(a), &type_name(b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> ScriptValue {
        ScriptValue::Int(n)
    }

    #[test]
    fn test_integer_and_real_division_differ() {
        assert_eq!(binary(BinaryOp::Div, int(7), int(2)), int(3));
        assert_eq!(
            binary(BinaryOp::FDiv, int(7), int(2)),
            ScriptValue::Real(3.5)
        );
    }

    #[test]
    fn test_add_overloads() {
        assert_eq!(
            binary(BinaryOp::Add, "a".into(), "b".into()),
            ScriptValue::string("ab")
        );
        assert_eq!(binary(BinaryOp::Add, int(1), int(2)), int(3));
        assert_eq!(
            binary(BinaryOp::Add, int(1), ScriptValue::Real(0.5)),
            ScriptValue::Real(1.5)
        );
        assert_eq!(binary(BinaryOp::Add, ScriptValue::Nil, int(4)), int(4));
        assert_eq!(
            binary(BinaryOp::Add, "n".into(), int(1)),
            ScriptValue::string("n1")
        );
    }

    #[test]
    fn test_overflow_is_delayed() {
        let result = binary(BinaryOp::Add, int(i64::MAX), int(1));
        assert_eq!(result.force(), Err(EvalError::IntegerOverflow));
    }

    #[test]
    fn test_real_integer_division_out_of_range() {
        let huge = ScriptValue::Real(1e300);
        assert_eq!(
            binary(BinaryOp::Div, huge, ScriptValue::Real(2.0)).force(),
            Err(EvalError::IntegerOverflow)
        );
        let nan = ScriptValue::Real(f64::NAN);
        assert_eq!(
            binary(BinaryOp::Div, nan, int(2)).force(),
            Err(EvalError::IntegerOverflow)
        );
        let infinite = ScriptValue::Real(f64::INFINITY);
        assert_eq!(
            binary(BinaryOp::Div, infinite, int(3)).force(),
            Err(EvalError::IntegerOverflow)
        );
        assert_eq!(
            binary(BinaryOp::Div, ScriptValue::Real(-7.5), int(2)),
            int(-3)
        );
    }

    #[test]
    fn test_division_by_zero_is_delayed() {
        assert_eq!(
            binary(BinaryOp::Div, int(1), int(0)).force(),
            Err(EvalError::DivisionByZero)
        );
        assert_eq!(
            binary(BinaryOp::Mod, ScriptValue::Real(1.0), int(0)).force(),
            Err(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn test_or_else_recovers_only_errors() {
        let err = ScriptValue::delayed(EvalError::DivisionByZero);
        assert_eq!(binary(BinaryOp::OrElse, err, int(5)), int(5));
        assert_eq!(binary(BinaryOp::OrElse, int(1), int(5)), int(1));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(binary(BinaryOp::Lt, int(1), ScriptValue::Real(1.5)), ScriptValue::Bool(true));
        assert_eq!(binary(BinaryOp::Ge, "b".into(), "a".into()), ScriptValue::Bool(true));
        assert_eq!(binary(BinaryOp::Max, int(3), int(9)), int(9));
        assert!(binary(BinaryOp::Lt, int(1), "a".into()).is_error());
        assert_eq!(binary(BinaryOp::Eq, int(1), "1".into()), ScriptValue::Bool(true));
        assert_eq!(binary(BinaryOp::Neq, int(1), ScriptValue::Nil), ScriptValue::Bool(true));
    }

    #[test]
    fn test_mod_and_pow() {
        assert_eq!(binary(BinaryOp::Mod, int(7), int(3)), int(1));
        assert_eq!(
            binary(BinaryOp::Mod, ScriptValue::Real(7.5), int(2)),
            ScriptValue::Real(1.5)
        );
        assert_eq!(binary(BinaryOp::Pow, int(2), int(10)), int(1024));
        assert_eq!(
            binary(BinaryOp::Pow, int(2), int(-1)),
            ScriptValue::Real(0.5)
        );
    }

    #[test]
    fn test_unary_ops() {
        assert_eq!(unary(UnaryOp::Negate, int(3)), int(-3));
        assert_eq!(unary(UnaryOp::Not, ScriptValue::Bool(true)), ScriptValue::Bool(false));
        assert!(unary(UnaryOp::Negate, "x".into()).is_error());
    }

    #[test]
    fn test_rgb_clamps_channels() {
        assert_eq!(
            ternary(TernaryOp::Rgb, int(300), int(-5), int(128)),
            ScriptValue::Color(Color::rgb(255, 0, 128))
        );
    }
}
