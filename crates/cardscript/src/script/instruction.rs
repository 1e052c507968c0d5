//! Packed 32-bit instructions
//!
//! The high 6 bits hold the opcode, the low 26 bits the operand: a
//! constant index, a variable id, a jump target, an argument count or a
//! sub-operation selector.

use std::fmt;

use crate::error::EncodeError;
use crate::variable::Variable;

/// Number of operand bits in an instruction.
pub const OPERAND_BITS: u32 = 26;

/// Largest operand an instruction can carry.
pub const MAX_OPERAND: u32 = (1 << OPERAND_BITS) - 1;

/// Define an enum of numbered operations with lookup by number and name.
macro_rules! code_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $( $(#[$vmeta:meta])* $variant:ident = $code:literal => $text:literal, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $code, )*
        }

        impl $name {
            /// Look up an operation by number.
            pub fn from_code(code: u32) -> Result<Self, EncodeError> {
                match code {
                    $( $code => Ok($name::$variant), )*
                    _ => Err(EncodeError::UnknownOperator { kind: $kind, code }),
                }
            }

            /// The number stored in instructions.
            pub fn code(self) -> u32 {
                self as u32
            }

            /// Mnemonic used in disassembly.
            pub fn name(self) -> &'static str {
                match self {
                    $( $name::$variant => $text, )*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

code_enum! {
    /// Instruction opcodes.
    Opcode ("opcode") {
        /// Do nothing
        Nop = 0 => "NOP",
        /// Push constant `operand`
        PushConst = 1 => "PUSH_CONST",
        /// Discard the top of the stack
        Pop = 2 => "POP",
        /// Jump to `operand`
        Jump = 3 => "JUMP",
        /// Pop a condition, jump to `operand` if it is false
        JumpIfNot = 4 => "JUMP_IF_NOT",
        /// Jump keeping the top if it is false, otherwise pop it
        JumpScAnd = 5 => "JUMP_SC_AND",
        /// Jump keeping the top if it is true, otherwise pop it
        JumpScOr = 6 => "JUMP_SC_OR",
        /// Push the value of variable `operand`
        GetVar = 7 => "GET_VAR",
        /// Bind variable `operand` to the top, without popping
        SetVar = 8 => "SET_VAR",
        /// Replace the top by its member named by constant `operand`
        MemberC = 9 => "MEMBER_C",
        /// Advance the iterator on top; jump to `operand` when exhausted
        Loop = 10 => "LOOP",
        /// Like `LOOP`, also pushing the key
        LoopWithKey = 11 => "LOOP_WITH_KEY",
        /// Build a collection from `operand` key/value pairs
        MakeObject = 12 => "MAKE_OBJECT",
        /// Call with `operand` arguments
        Call = 13 => "CALL",
        /// Partially apply `operand` arguments
        Closure = 14 => "CLOSURE",
        /// Call with `operand` arguments, reusing the frame
        TailCall = 15 => "TAILCALL",
        /// Return the top of the stack
        Ret = 16 => "RET",
        /// Apply a unary operator
        Unary = 17 => "UNARY",
        /// Apply a binary operator
        Binary = 18 => "BINARY",
        /// Apply a ternary operator
        Ternary = 19 => "TERNARY",
        /// Apply a quaternary operator
        Quaternary = 20 => "QUATERNARY",
        /// Push a copy of the value `operand` places below the top
        Dup = 21 => "DUP",
    }
}

code_enum! {
    /// Operators taking one operand.
    UnaryOp ("unary") {
        /// Make an iterator from a collection
        IteratorC = 0 => "ITERATOR_C",
        /// Arithmetic negation
        Negate = 1 => "NEGATE",
        /// Boolean negation
        Not = 2 => "NOT",
    }
}

code_enum! {
    /// Operators taking two operands.
    BinaryOp ("binary") {
        /// Inclusive integer range
        IteratorR = 0 => "ITERATOR_R",
        /// Member lookup with a computed name
        Member = 1 => "MEMBER",
        /// Addition, concatenation or composition
        Add = 2 => "ADD",
        /// Subtraction
        Sub = 3 => "SUB",
        /// Multiplication
        Mul = 4 => "MUL",
        /// Real division
        FDiv = 5 => "FDIV",
        /// Integer division
        Div = 6 => "DIV",
        /// Remainder
        Mod = 7 => "MOD",
        /// Exponentiation
        Pow = 8 => "POW",
        /// Boolean and
        And = 9 => "AND",
        /// Boolean or
        Or = 10 => "OR",
        /// Boolean exclusive or
        Xor = 11 => "XOR",
        /// Equality
        Eq = 12 => "EQ",
        /// Inequality
        Neq = 13 => "NEQ",
        /// Less than
        Lt = 14 => "LT",
        /// Greater than
        Gt = 15 => "GT",
        /// Less than or equal
        Le = 16 => "LE",
        /// Greater than or equal
        Ge = 17 => "GE",
        /// Smaller operand
        Min = 18 => "MIN",
        /// Larger operand
        Max = 19 => "MAX",
        /// Left operand, or the right one if the left is an error
        OrElse = 20 => "OR_ELSE",
    }
}

code_enum! {
    /// Operators taking three operands.
    TernaryOp ("ternary") {
        /// Opaque color from red, green and blue
        Rgb = 0 => "RGB",
    }
}

code_enum! {
    /// Operators taking four operands.
    QuaternaryOp ("quaternary") {
        /// Color from red, green, blue and alpha
        Rgba = 0 => "RGBA",
    }
}

/// A single VM instruction.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(u32);

impl Instruction {
    /// The instruction that does nothing.
    pub const NOP: Instruction = Instruction(0);

    /// Encode an opcode and operand.
    pub fn new(opcode: Opcode, operand: u32) -> Result<Self, EncodeError> {
        if operand > MAX_OPERAND {
            return Err(EncodeError::OperandOverflow(operand));
        }
        Ok(Self((opcode.code() << OPERAND_BITS) | operand))
    }

    /// Decode a raw instruction word.
    pub fn from_raw(raw: u32) -> Result<Self, EncodeError> {
        let code = raw >> OPERAND_BITS;
        Opcode::from_code(code).map_err(|_| EncodeError::UnknownOpcode(code as u8))?;
        Ok(Self(raw))
    }

    /// The raw instruction word.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// The opcode.
    pub fn opcode(self) -> Opcode {
        // Instructions are only built from known opcodes
        Opcode::from_code(self.0 >> OPERAND_BITS).unwrap_or(Opcode::Nop)
    }

    /// The operand.
    pub fn operand(self) -> u32 {
        self.0 & MAX_OPERAND
    }

    /// Same opcode, different operand.
    pub fn with_operand(self, operand: u32) -> Result<Self, EncodeError> {
        Self::new(self.opcode(), operand)
    }

    /// Net number of stack values consumed and produced.
    ///
    /// Jumps that only sometimes pop are counted as not popping. The answer
    /// is used to reconstruct call sites for error messages, not for
    /// execution.
    pub fn stack_effect(self) -> (usize, usize) {
        let n = self.operand() as usize;
        match self.opcode() {
            Opcode::Nop | Opcode::Jump | Opcode::SetVar => (0, 0),
            Opcode::JumpScAnd | Opcode::JumpScOr => (0, 0),
            Opcode::PushConst | Opcode::GetVar | Opcode::Dup => (0, 1),
            Opcode::Pop | Opcode::JumpIfNot | Opcode::Ret => (1, 0),
            Opcode::MemberC | Opcode::Unary => (1, 1),
            Opcode::Loop => (0, 1),
            Opcode::LoopWithKey => (0, 2),
            Opcode::MakeObject => (2 * n, 1),
            Opcode::Call | Opcode::Closure | Opcode::TailCall => (n + 1, 1),
            Opcode::Binary => (2, 1),
            Opcode::Ternary => (3, 1),
            Opcode::Quaternary => (4, 1),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arg = self.operand();
        let op = self.opcode();
        match op {
            Opcode::Nop | Opcode::Pop | Opcode::Ret => write!(f, "{}", op),
            Opcode::GetVar | Opcode::SetVar => write!(f, "{} {}", op, Variable::from_id(arg)),
            Opcode::Unary => match UnaryOp::from_code(arg) {
                Ok(sub) => write!(f, "{} {}", op, sub),
                Err(_) => write!(f, "{} ?{}", op, arg),
            },
            Opcode::Binary => match BinaryOp::from_code(arg) {
                Ok(sub) => write!(f, "{} {}", op, sub),
                Err(_) => write!(f, "{} ?{}", op, arg),
            },
            Opcode::Ternary => match TernaryOp::from_code(arg) {
                Ok(sub) => write!(f, "{} {}", op, sub),
                Err(_) => write!(f, "{} ?{}", op, arg),
            },
            Opcode::Quaternary => match QuaternaryOp::from_code(arg) {
                Ok(sub) => write!(f, "{} {}", op, sub),
                Err(_) => write!(f, "{} ?{}", op, arg),
            },
            _ => write!(f, "{} {}", op, arg),
        }
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instruction({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_and_unpack() {
        let instr = Instruction::new(Opcode::Jump, 1234).unwrap();
        assert_eq!(instr.opcode(), Opcode::Jump);
        assert_eq!(instr.operand(), 1234);
        assert_eq!(instr.raw() >> OPERAND_BITS, 3);
    }

    #[test]
    fn test_operand_limit() {
        assert!(Instruction::new(Opcode::PushConst, MAX_OPERAND).is_ok());
        assert_eq!(
            Instruction::new(Opcode::PushConst, MAX_OPERAND + 1),
            Err(EncodeError::OperandOverflow(MAX_OPERAND + 1))
        );
    }

    #[test]
    fn test_from_raw_rejects_unknown_opcode() {
        assert_eq!(
            Instruction::from_raw(63 << OPERAND_BITS),
            Err(EncodeError::UnknownOpcode(63))
        );
        let raw = Instruction::new(Opcode::Dup, 2).unwrap().raw();
        assert_eq!(Instruction::from_raw(raw).unwrap().operand(), 2);
    }

    #[test]
    fn test_sub_operator_lookup() {
        assert_eq!(BinaryOp::from_code(5), Ok(BinaryOp::FDiv));
        assert_eq!(BinaryOp::from_code(6), Ok(BinaryOp::Div));
        assert!(UnaryOp::from_code(99).is_err());
        assert_eq!(BinaryOp::OrElse.name(), "OR_ELSE");
    }

    #[test]
    fn test_display() {
        let add = Instruction::new(Opcode::Binary, BinaryOp::Add.code()).unwrap();
        assert_eq!(add.to_string(), "BINARY ADD");
        let var = Variable::intern("display_x");
        let get = Instruction::new(Opcode::GetVar, var.id()).unwrap();
        assert_eq!(get.to_string(), "GET_VAR display_x");
    }
}
