//! Error types for script evaluation

use thiserror::Error;

pub use crate::value::type_name;

/// Errors raised while evaluating a script.
///
/// Errors are plain data so they can be stored inside a delayed error
/// value and re-raised later by whoever forces that value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    /// `GET_VAR` on a variable that has no binding
    #[error("Variable not set: {name}")]
    UnboundVariable {
        /// Name of the variable
        name: String,
    },

    /// Member lookup on a value that has no such member
    #[error("{type_name} has no member '{member}'")]
    NoMember {
        /// Type of the value being indexed
        type_name: String,
        /// The requested member
        member: String,
    },

    /// An operator applied to operands it does not support
    #[error("Invalid operands for {op}: {left_type} and {right_type}")]
    InvalidOperands {
        /// The operator
        op: String,
        /// Type of the left operand
        left_type: String,
        /// Type of the right operand
        right_type: String,
    },

    /// A value could not be converted to the requested type
    #[error("Can not convert from {from} to {to}")]
    Conversion {
        /// Source type
        from: String,
        /// Target type
        to: String,
    },

    /// `LOOP` or `ITERATOR_C` on something that can not be iterated
    #[error("Can not iterate over {type_name}")]
    NotIterator {
        /// Type of the offending value
        type_name: String,
    },

    /// `CALL` on something that is not a function
    #[error("Can not call {type_name}, it is not a function")]
    NotCallable {
        /// Type of the offending value
        type_name: String,
    },

    /// Division or remainder by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Integer arithmetic overflowed
    #[error("Integer overflow")]
    IntegerOverflow,

    /// Failure signalled by a host function or by the script itself
    #[error("{name}: {message}")]
    Builtin {
        /// Function that failed
        name: String,
        /// Error message
        message: String,
    },

    /// Call depth limit exceeded
    #[error("Stack overflow: call depth {depth} exceeds maximum {max}")]
    StackOverflow {
        /// Current depth
        depth: usize,
        /// Maximum allowed depth
        max: usize,
    },

    /// Bytecode that the VM can not execute
    #[error("Malformed script at instruction {position}: {message}")]
    MalformedScript {
        /// Instruction index
        position: usize,
        /// What went wrong
        message: String,
    },

    /// Evaluation was interrupted through the interrupt flag
    #[error("Evaluation interrupted")]
    Interrupted,
}

impl EvalError {
    /// Create a type error for an operator and its two operand types.
    pub fn operands(op: impl Into<String>, left: &str, right: &str) -> Self {
        EvalError::InvalidOperands {
            op: op.into(),
            left_type: left.to_string(),
            right_type: right.to_string(),
        }
    }

    /// Create a conversion error.
    pub fn conversion(from: &str, to: &str) -> Self {
        EvalError::Conversion {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a malformed script error at an instruction position.
    pub fn malformed(position: usize, message: impl Into<String>) -> Self {
        EvalError::MalformedScript {
            position,
            message: message.into(),
        }
    }

    /// Convert the error of a host function.
    ///
    /// An `anyhow::Error` that wraps an `EvalError` (for instance from a nested
    /// `eval` inside the host function) is unwrapped unchanged.
    pub fn from_host(name: &str, err: anyhow::Error) -> Self {
        match err.downcast::<EvalError>() {
            Ok(inner) => inner,
            Err(other) => EvalError::Builtin {
                name: name.to_string(),
                message: format!("{other:#}"),
            },
        }
    }
}

/// Errors raised while encoding instructions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Operand does not fit in the 26 operand bits
    #[error("Operand {0} does not fit in an instruction")]
    OperandOverflow(u32),

    /// Opcode byte that names no instruction
    #[error("Unknown opcode {0}")]
    UnknownOpcode(u8),

    /// Sub-operation number that names no operator
    #[error("Unknown {kind} operator {code}")]
    UnknownOperator {
        /// Operator family
        kind: &'static str,
        /// The offending number
        code: u32,
    },
}

/// Result type alias for evaluation
pub type Result<T> = std::result::Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_host_unwraps_eval_error() {
        let err = anyhow::Error::new(EvalError::DivisionByZero);
        assert_eq!(EvalError::from_host("f", err), EvalError::DivisionByZero);
    }

    #[test]
    fn test_from_host_wraps_other_errors() {
        let err = anyhow::anyhow!("bad input");
        assert_eq!(
            EvalError::from_host("f", err),
            EvalError::Builtin {
                name: "f".to_string(),
                message: "bad input".to_string()
            }
        );
    }

    #[test]
    fn test_display_messages() {
        let err = EvalError::UnboundVariable {
            name: "x".to_string(),
        };
        assert_eq!(err.to_string(), "Variable not set: x");
        assert_eq!(
            EvalError::operands("+", "int", "bool").to_string(),
            "Invalid operands for +: int and bool"
        );
    }
}
