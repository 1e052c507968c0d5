//! Bytecode execution
//!
//! [`Context::eval`] runs one script on the shared operand stack. Nested
//! evaluations (calls, host functions calling back into scripts) start at
//! the current stack height and never touch what lies below it. On error
//! the stack is cut back to that height and the scope opened by the
//! evaluation is closed, so the context is reusable afterwards.

mod call;
mod operators;

pub(crate) use operators::{binary, quaternary, ternary, unary};

use std::sync::Arc;

use tracing::trace;

use crate::context::Context;
use crate::error::{type_name, EvalError, Result};
use crate::script::{BinaryOp, Opcode, QuaternaryOp, Script, TernaryOp, UnaryOp};
use crate::value::{Collection, ScriptValue};
use crate::variable::Variable;

/// How a run of instructions ended.
pub(crate) enum Flow {
    /// `RET` or end of code
    Return(ScriptValue),

    /// `TAILCALL` to a script: continue with it in a fresh scope
    TailCall {
        script: Arc<Script>,
        bindings: Vec<(Variable, ScriptValue)>,
    },
}

impl Context {
    /// Evaluate a script and return its result.
    ///
    /// With `open_scope` the script's variable bindings are undone when it
    /// finishes; without it they stay visible to the caller. A delayed
    /// error left as the result is raised.
    pub fn eval(&mut self, script: &Script, open_scope: bool) -> Result<ScriptValue> {
        if self.call_depth() == 0 {
            self.clear_backtrace();
        }
        self.eval_value(script, open_scope)?.force()
    }

    /// Evaluate without raising a delayed error result.
    pub(crate) fn eval_value(&mut self, script: &Script, open_scope: bool) -> Result<ScriptValue> {
        let scope = if open_scope {
            Some(self.open_scope())
        } else {
            None
        };
        self.execute(script, scope)
    }

    /// Run a script, closing `scope` when done.
    pub(crate) fn execute(
        &mut self,
        script: &Script,
        mut scope: Option<usize>,
    ) -> Result<ScriptValue> {
        let base = self.stack.len();
        let mut step = self.run(script, base);
        let result = loop {
            match step {
                Ok(Flow::Return(value)) => break Ok(value),
                Ok(Flow::TailCall { script, bindings }) => {
                    if let Err(err) = self.check_interrupt() {
                        break Err(err);
                    }
                    if let Some(mark) = scope.take() {
                        self.close_scope(mark);
                    }
                    scope = Some(self.open_scope());
                    for (var, value) in bindings {
                        self.environment_mut().set(var, value);
                    }
                    step = self.run(&script, base);
                }
                Err(err) => break Err(err),
            }
        };
        if let Some(mark) = scope {
            self.close_scope(mark);
        }
        if result.is_err() {
            self.stack.truncate(base);
        }
        result
    }

    fn run(&mut self, script: &Script, base: usize) -> Result<Flow> {
        let code = script.instructions();
        let mut ip = 0;
        while let Some(&instr) = code.get(ip) {
            if self.config().trace {
                trace!(ip, instr = %instr, depth = self.stack.len(), "exec");
            }
            let at = ip;
            ip += 1;
            let arg = instr.operand();
            match instr.opcode() {
                Opcode::Nop => {}

                // ═══════════════════════════════════════════════════════
                // Stack
                // ═══════════════════════════════════════════════════════
                Opcode::PushConst => {
                    let value = constant(script, at, arg)?;
                    self.stack.push(value);
                }
                Opcode::Pop => {
                    self.pop(base, at)?;
                }
                Opcode::Dup => {
                    let depth = arg as usize;
                    let available = self.stack.len().saturating_sub(base);
                    if depth >= available {
                        return Err(EvalError::malformed(at, "DUP below frame"));
                    }
                    let value = self.stack[self.stack.len() - 1 - depth].clone();
                    self.stack.push(value);
                }

                // ═══════════════════════════════════════════════════════
                // Control Flow
                // ═══════════════════════════════════════════════════════
                Opcode::Jump => {
                    ip = self.jump(script, at, arg)?;
                }
                Opcode::JumpIfNot => {
                    let condition = self.pop(base, at)?;
                    if !condition.to_bool()? {
                        ip = self.jump(script, at, arg)?;
                    }
                }
                Opcode::JumpScAnd => {
                    if self.top(base, at)?.to_bool()? {
                        self.pop(base, at)?;
                    } else {
                        ip = self.jump(script, at, arg)?;
                    }
                }
                Opcode::JumpScOr => {
                    if self.top(base, at)?.to_bool()? {
                        ip = self.jump(script, at, arg)?;
                    } else {
                        self.pop(base, at)?;
                    }
                }
                op @ (Opcode::Loop | Opcode::LoopWithKey) => {
                    self.check_interrupt()?;
                    let slot = self.iterator_slot(base, at)?;
                    let iterator = match &self.stack[slot] {
                        ScriptValue::Iterator(it) => it.clone(),
                        ScriptValue::Error(err) => return Err(err.as_ref().clone()),
                        other => {
                            return Err(EvalError::NotIterator {
                                type_name: type_name(other),
                            })
                        }
                    };
                    match iterator.next_entry() {
                        Some((key, value)) => {
                            if op == Opcode::LoopWithKey {
                                self.stack.push(key);
                            }
                            self.stack.push(value);
                        }
                        None => {
                            self.stack.remove(slot);
                            ip = self.jump(script, at, arg)?;
                        }
                    }
                }
                Opcode::Ret => return self.finish(base, at).map(Flow::Return),

                // ═══════════════════════════════════════════════════════
                // Variables and Members
                // ═══════════════════════════════════════════════════════
                Opcode::GetVar => {
                    let var = Variable::from_id(arg);
                    let value = self.environment().get(var).cloned().ok_or_else(|| {
                        EvalError::UnboundVariable { name: var.name() }
                    })?;
                    self.stack.push(value);
                }
                Opcode::SetVar => {
                    let value = self.top(base, at)?.clone();
                    self.environment_mut().set(Variable::from_id(arg), value);
                }
                Opcode::MemberC => {
                    let name = constant(script, at, arg)?;
                    let object = self.pop(base, at)?;
                    self.stack.push(object.member(&name));
                }
                Opcode::MakeObject => {
                    let values = self.pop_n(base, at, 2 * arg as usize)?;
                    self.stack.push(make_object(values));
                }

                // ═══════════════════════════════════════════════════════
                // Calls
                // ═══════════════════════════════════════════════════════
                op @ (Opcode::Call | Opcode::TailCall | Opcode::Closure) => {
                    let n = arg as usize;
                    let params = call_params(script, ip, n)?;
                    ip += n;
                    let args = self.pop_n(base, at, n)?;
                    let function = self.pop(base, at)?;
                    let bindings: Vec<_> = params.into_iter().zip(args).collect();
                    if op == Opcode::Closure {
                        let closure = self.make_closure(function, bindings);
                        self.stack.push(closure);
                        continue;
                    }
                    let tail = op == Opcode::TailCall && self.stack.len() == base;
                    let (function, bindings) = if tail {
                        match call::tail_target(function, bindings) {
                            Ok(flow) => return Ok(flow),
                            Err(not_a_script) => not_a_script,
                        }
                    } else {
                        (function, bindings)
                    };
                    match self.call_value(&function, bindings) {
                        Ok(result) => self.stack.push(result),
                        Err(err) => {
                            let name = script
                                .callee_name(at)
                                .unwrap_or_else(|| "<anonymous>".to_string());
                            self.push_backtrace(format!("in function {}", name));
                            return Err(err);
                        }
                    }
                }

                // ═══════════════════════════════════════════════════════
                // Operators
                // ═══════════════════════════════════════════════════════
                Opcode::Unary => {
                    let op = UnaryOp::from_code(arg)
                        .map_err(|e| EvalError::malformed(at, e.to_string()))?;
                    let a = self.pop(base, at)?;
                    self.stack.push(unary(op, a));
                }
                Opcode::Binary => {
                    let op = BinaryOp::from_code(arg)
                        .map_err(|e| EvalError::malformed(at, e.to_string()))?;
                    let b = self.pop(base, at)?;
                    let a = self.pop(base, at)?;
                    self.stack.push(binary(op, a, b));
                }
                Opcode::Ternary => {
                    let op = TernaryOp::from_code(arg)
                        .map_err(|e| EvalError::malformed(at, e.to_string()))?;
                    let mut v = self.pop_n(base, at, 3)?.into_iter();
                    let (a, b, c) = (next(&mut v), next(&mut v), next(&mut v));
                    self.stack.push(ternary(op, a, b, c));
                }
                Opcode::Quaternary => {
                    let op = QuaternaryOp::from_code(arg)
                        .map_err(|e| EvalError::malformed(at, e.to_string()))?;
                    let mut v = self.pop_n(base, at, 4)?.into_iter();
                    let (a, b, c, d) = (next(&mut v), next(&mut v), next(&mut v), next(&mut v));
                    self.stack.push(quaternary(op, a, b, c, d));
                }
            }
        }
        // Falling off the end returns like RET
        self.finish(base, code.len()).map(Flow::Return)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Stack Helpers
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn pop(&mut self, base: usize, at: usize) -> Result<ScriptValue> {
        if self.stack.len() <= base {
            return Err(EvalError::malformed(at, "stack underflow"));
        }
        self.stack
            .pop()
            .ok_or_else(|| EvalError::malformed(at, "stack underflow"))
    }

    pub(crate) fn pop_n(&mut self, base: usize, at: usize, n: usize) -> Result<Vec<ScriptValue>> {
        if self.stack.len() < base + n {
            return Err(EvalError::malformed(at, "stack underflow"));
        }
        let from = self.stack.len() - n;
        Ok(self.stack.split_off(from))
    }

    pub(crate) fn top(&self, base: usize, at: usize) -> Result<&ScriptValue> {
        if self.stack.len() <= base {
            return Err(EvalError::malformed(at, "stack underflow"));
        }
        self.stack
            .last()
            .ok_or_else(|| EvalError::malformed(at, "stack underflow"))
    }

    /// Position of the loop iterator, just below the accumulated result.
    fn iterator_slot(&self, base: usize, at: usize) -> Result<usize> {
        if self.stack.len() < base + 2 {
            return Err(EvalError::malformed(at, "LOOP without iterator"));
        }
        Ok(self.stack.len() - 2)
    }

    /// Pop the result and discard whatever else the frame left behind.
    pub(crate) fn finish(&mut self, base: usize, at: usize) -> Result<ScriptValue> {
        let result = self.pop(base, at)?;
        self.stack.truncate(base);
        Ok(result)
    }

    fn jump(&self, script: &Script, at: usize, target: u32) -> Result<usize> {
        let target = target as usize;
        if target > script.len() {
            return Err(EvalError::malformed(at, "jump target out of range"));
        }
        if target <= at {
            self.check_interrupt()?;
        }
        Ok(target)
    }
}

pub(crate) fn constant(script: &Script, at: usize, index: u32) -> Result<ScriptValue> {
    script
        .constant(index)
        .cloned()
        .ok_or_else(|| EvalError::malformed(at, "constant index out of range"))
}

/// Parameter names recorded by the `SET_VAR` instructions after a call.
pub(crate) fn call_params(script: &Script, from: usize, n: usize) -> Result<Vec<Variable>> {
    (from..from + n)
        .map(|pos| match script.instructions().get(pos) {
            Some(instr) if instr.opcode() == Opcode::SetVar => {
                Ok(Variable::from_id(instr.operand()))
            }
            _ => Err(EvalError::malformed(pos, "expected argument name")),
        })
        .collect()
}

/// Build a collection from alternating keys and values; nil keys are
/// positional.
pub(crate) fn make_object(values: Vec<ScriptValue>) -> ScriptValue {
    let mut collection = Collection::new();
    let mut values = values.into_iter();
    while let (Some(key), Some(value)) = (values.next(), values.next()) {
        let key = match key {
            ScriptValue::Nil => None,
            ScriptValue::Error(_) => return key,
            other => match other.to_text() {
                Ok(text) => Some(text),
                Err(err) => return ScriptValue::delayed(err),
            },
        };
        collection.push(key, value);
    }
    ScriptValue::collection(collection)
}

fn next(values: &mut impl Iterator<Item = ScriptValue>) -> ScriptValue {
    values.next().unwrap_or(ScriptValue::Nil)
}
