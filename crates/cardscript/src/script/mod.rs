//! Compiled scripts and the builder used to assemble them

mod instruction;

pub use instruction::{
    BinaryOp, Instruction, Opcode, QuaternaryOp, TernaryOp, UnaryOp, MAX_OPERAND, OPERAND_BITS,
};

use std::fmt;

use crate::error::EncodeError;
use crate::value::ScriptValue;
use crate::variable::Variable;

/// An immutable unit of bytecode with its constant table.
///
/// Scripts are shared behind `Arc` and may be evaluated by several
/// contexts at once.
#[derive(Debug, Clone, Default)]
pub struct Script {
    instructions: Vec<Instruction>,
    constants: Vec<ScriptValue>,
}

impl Script {
    /// Create a script from raw parts.
    pub fn new(instructions: Vec<Instruction>, constants: Vec<ScriptValue>) -> Self {
        Self {
            instructions,
            constants,
        }
    }

    /// Start assembling a script.
    pub fn builder() -> ScriptBuilder {
        ScriptBuilder::new()
    }

    /// The instruction stream.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// The constant table.
    pub fn constants(&self) -> &[ScriptValue] {
        &self.constants
    }

    /// Look up a constant.
    pub fn constant(&self, index: u32) -> Option<&ScriptValue> {
        self.constants.get(index as usize)
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// True if the script has no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Backtrace Reconstruction
    // ═══════════════════════════════════════════════════════════════════

    /// Find the first instruction that contributes to the `values` topmost
    /// stack entries at position `end`.
    ///
    /// Walks backward summing stack effects. Control flow is ignored, so
    /// the answer is a best guess for code containing jumps.
    pub fn operand_start(&self, end: usize, values: usize) -> Option<usize> {
        if values == 0 {
            return Some(end);
        }
        let mut need = values as isize;
        for pos in (0..end.min(self.instructions.len())).rev() {
            let (pops, pushes) = self.instructions[pos].stack_effect();
            need = need - pushes as isize + pops as isize;
            if need <= 0 {
                return Some(pos);
            }
        }
        None
    }

    /// Name of the function called by the `CALL` at `call_pos`, if it can
    /// be recovered from the code that pushed it.
    pub fn callee_name(&self, call_pos: usize) -> Option<String> {
        let call = self.instructions.get(call_pos)?;
        let args_start = self.operand_start(call_pos, call.operand() as usize)?;
        let pusher = self.instructions.get(args_start.checked_sub(1)?)?;
        match pusher.opcode() {
            Opcode::GetVar => Some(Variable::from_id(pusher.operand()).name()),
            Opcode::MemberC => self.constant(pusher.operand()).map(|c| c.to_string()),
            Opcode::PushConst => self.constant(pusher.operand()).map(|c| format!("{:?}", c)),
            _ => None,
        }
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pos, instr) in self.instructions.iter().enumerate() {
            write!(f, "{:4}: {}", pos, instr)?;
            match instr.opcode() {
                Opcode::PushConst => match self.constant(instr.operand()) {
                    Some(value) => write!(f, "\t; {:?}", value)?,
                    None => write!(f, "\t; <missing constant>")?,
                },
                Opcode::MemberC => {
                    if let Some(name) = self.constant(instr.operand()) {
                        write!(f, "\t; .{}", name)?;
                    }
                }
                _ => {}
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════

/// A forward jump waiting for its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a forward jump must be resolved with come_from"]
pub struct Label(usize);

/// Assembles a [`Script`] instruction by instruction.
///
/// Encoding errors are remembered and reported by [`build`](Self::build),
/// so calls can be chained.
///
/// # Example
///
/// ```
/// use cardscript::{BinaryOp, Context, Script, ScriptValue};
///
/// let script = Script::builder()
///     .push_const(ScriptValue::Int(7))
///     .push_const(ScriptValue::Int(2))
///     .binary(BinaryOp::Div)
///     .ret()
///     .build()
///     .unwrap();
///
/// let mut ctx = Context::new();
/// assert_eq!(ctx.eval(&script, true).unwrap(), ScriptValue::Int(3));
/// ```
#[derive(Debug, Default)]
pub struct ScriptBuilder {
    instructions: Vec<Instruction>,
    constants: Vec<ScriptValue>,
    error: Option<EncodeError>,
}

impl ScriptBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction.
    pub fn instr(&mut self, opcode: Opcode, operand: u32) -> &mut Self {
        match Instruction::new(opcode, operand) {
            Ok(instr) => self.instructions.push(instr),
            Err(err) => {
                self.error.get_or_insert(err);
                self.instructions.push(Instruction::NOP);
            }
        }
        self
    }

    /// Add a constant to the table, returning its index.
    pub fn constant(&mut self, value: ScriptValue) -> u32 {
        self.constants.push(value);
        (self.constants.len() - 1) as u32
    }

    /// Push a constant.
    pub fn push_const(&mut self, value: ScriptValue) -> &mut Self {
        let index = self.constant(value);
        self.instr(Opcode::PushConst, index)
    }

    /// Discard the top of the stack.
    pub fn pop(&mut self) -> &mut Self {
        self.instr(Opcode::Pop, 0)
    }

    /// Copy the value `depth` places below the top.
    pub fn dup(&mut self, depth: u32) -> &mut Self {
        self.instr(Opcode::Dup, depth)
    }

    /// Return the top of the stack.
    pub fn ret(&mut self) -> &mut Self {
        self.instr(Opcode::Ret, 0)
    }

    /// Push a variable.
    pub fn get_var(&mut self, name: &str) -> &mut Self {
        self.instr(Opcode::GetVar, Variable::intern(name).id())
    }

    /// Bind a variable to the top of the stack.
    pub fn set_var(&mut self, name: &str) -> &mut Self {
        self.instr(Opcode::SetVar, Variable::intern(name).id())
    }

    /// Replace the top by its member `name`.
    pub fn member(&mut self, name: &str) -> &mut Self {
        let index = self.constant(ScriptValue::string(name));
        self.instr(Opcode::MemberC, index)
    }

    /// Apply a unary operator.
    pub fn unary(&mut self, op: UnaryOp) -> &mut Self {
        self.instr(Opcode::Unary, op.code())
    }

    /// Apply a binary operator.
    pub fn binary(&mut self, op: BinaryOp) -> &mut Self {
        self.instr(Opcode::Binary, op.code())
    }

    /// Apply a ternary operator.
    pub fn ternary(&mut self, op: TernaryOp) -> &mut Self {
        self.instr(Opcode::Ternary, op.code())
    }

    /// Apply a quaternary operator.
    pub fn quaternary(&mut self, op: QuaternaryOp) -> &mut Self {
        self.instr(Opcode::Quaternary, op.code())
    }

    /// Build a collection from `pairs` key/value pairs on the stack.
    pub fn make_object(&mut self, pairs: u32) -> &mut Self {
        self.instr(Opcode::MakeObject, pairs)
    }

    fn call_like(&mut self, opcode: Opcode, params: &[&str]) -> &mut Self {
        self.instr(opcode, params.len() as u32);
        for param in params {
            self.set_var(param);
        }
        self
    }

    /// Call the function below the arguments, binding them to `params`.
    pub fn call(&mut self, params: &[&str]) -> &mut Self {
        self.call_like(Opcode::Call, params)
    }

    /// Like [`call`](Self::call), reusing the current frame.
    pub fn tail_call(&mut self, params: &[&str]) -> &mut Self {
        self.call_like(Opcode::TailCall, params)
    }

    /// Bind arguments to `params` without calling.
    pub fn closure(&mut self, params: &[&str]) -> &mut Self {
        self.call_like(Opcode::Closure, params)
    }

    /// Position of the next instruction, as a target for backward jumps.
    pub fn label(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Emit a jump to a known target.
    pub fn jump_to(&mut self, opcode: Opcode, target: u32) -> &mut Self {
        self.instr(opcode, target)
    }

    /// Emit a jump whose target is set later by [`come_from`](Self::come_from).
    pub fn jump_forward(&mut self, opcode: Opcode) -> Label {
        let at = self.instructions.len();
        self.instr(opcode, 0);
        Label(at)
    }

    /// Point a forward jump at the next instruction.
    pub fn come_from(&mut self, label: Label) -> &mut Self {
        let target = self.label();
        if let Some(slot) = self.instructions.get_mut(label.0) {
            match slot.with_operand(target) {
                Ok(patched) => *slot = patched,
                Err(err) => {
                    self.error.get_or_insert(err);
                }
            }
        }
        self
    }

    /// Finish, reporting the first encoding error.
    pub fn build(&mut self) -> Result<Script, EncodeError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        Ok(Script::new(
            std::mem::take(&mut self.instructions),
            std::mem::take(&mut self.constants),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_come_from_patches_jump() {
        let mut b = Script::builder();
        b.push_const(ScriptValue::Bool(true));
        let skip = b.jump_forward(Opcode::JumpIfNot);
        b.push_const(ScriptValue::Int(1)).pop();
        b.come_from(skip);
        let script = b.push_const(ScriptValue::Nil).ret().build().unwrap();
        assert_eq!(script.instructions()[1].operand(), 4);
    }

    #[test]
    fn test_build_reports_operand_overflow() {
        let result = Script::builder().dup(MAX_OPERAND + 1).ret().build();
        assert_eq!(result.err(), Some(EncodeError::OperandOverflow(MAX_OPERAND + 1)));
    }

    #[test]
    fn test_operand_start_skips_nested_expression() {
        // f(a + 1)
        let script = Script::builder()
            .get_var("f")
            .get_var("a")
            .push_const(ScriptValue::Int(1))
            .binary(BinaryOp::Add)
            .call(&["x"])
            .ret()
            .build()
            .unwrap();
        assert_eq!(script.operand_start(4, 1), Some(1));
        assert_eq!(script.operand_start(4, 2), Some(0));
        assert_eq!(script.callee_name(4), Some("f".to_string()));
    }

    #[test]
    fn test_disassembly_lists_constants() {
        let script = Script::builder()
            .push_const(ScriptValue::string("hi"))
            .member("length")
            .ret()
            .build()
            .unwrap();
        let listing = script.to_string();
        assert!(listing.contains("PUSH_CONST 0\t; \"hi\""));
        assert!(listing.contains("MEMBER_C 1\t; .length"));
        assert!(listing.contains("RET"));
    }
}
