//! The dependency pass
//!
//! An abstract interpretation of a script. Instead of taking branches it
//! follows every path: a conditional jump forks a pending path, and when
//! the current path ends the pass resumes the pending path with the lowest
//! target. Paths that reach the same position are joined by unifying their
//! stacks and variables. A loop body runs once with a stand-in element.
//!
//! Nothing fails for lack of data. Unbound variables and missing members
//! read as nil, and operators other than `+` and `or else` produce nil.
//! The result over-approximates what the script reads: every owner that
//! some execution could read gets the dependency.

use std::collections::HashSet;

use tracing::{debug, instrument};

use super::registry::placeholder;
use super::{unify, Dependency};
use crate::context::Context;
use crate::error::{EvalError, Result};
use crate::eval::{binary, call_params, constant, make_object};
use crate::script::{BinaryOp, Opcode, Script, UnaryOp};
use crate::value::{ScriptIterator, ScriptValue};
use crate::variable::Variable;

/// Machine state of a path waiting at a jump target.
struct PendingPath {
    target: usize,
    stack: Vec<ScriptValue>,
    bindings: Vec<(Variable, Option<ScriptValue>)>,
}

impl Context {
    /// Register `dep` with every owner `script` might read.
    ///
    /// Returns an approximation of the script's result, which may itself
    /// stand for owners (for example when the script returns a card field
    /// that the caller then reads a member of).
    #[instrument(level = "debug", skip_all, fields(kind = ?dep.kind, index = dep.index))]
    pub fn dependencies(&mut self, dep: &Dependency, script: &Script) -> Result<ScriptValue> {
        self.dependency_pass(dep, script, Vec::new())
    }

    /// Dependencies of calling a function value with the given arguments.
    ///
    /// Scripts are analysed recursively, unless they are already being
    /// analysed further up. Builtins contribute through their dependency
    /// hook, if they have one.
    pub fn call_dependencies(
        &mut self,
        function: &ScriptValue,
        args: Vec<(Variable, ScriptValue)>,
        dep: &Dependency,
    ) -> Result<ScriptValue> {
        match function {
            ScriptValue::Script(script) => {
                let key = script_key(script);
                if self.analyzing.contains(&key) {
                    debug!("skipping recursive analysis");
                    return Ok(ScriptValue::Nil);
                }
                self.enter_call()?;
                let result = self.dependency_pass(dep, script, args);
                self.exit_call();
                result
            }
            ScriptValue::Builtin(builtin) => match &builtin.dependencies {
                Some(hook) => {
                    let hook = hook.clone();
                    let mut scope = self.scope_guard();
                    for (var, value) in args {
                        scope.set_variable(var, value);
                    }
                    hook(&mut *scope, dep)
                }
                None => Ok(ScriptValue::Nil),
            },
            ScriptValue::Closure(closure) => {
                let mut bindings = closure.bindings.clone();
                bindings.extend(args);
                self.call_dependencies(&closure.function, bindings, dep)
            }
            ScriptValue::Composition(composition) => {
                let intermediate = self.call_dependencies(&composition.first, args, dep)?;
                self.call_dependencies(
                    &composition.second,
                    vec![(Variable::intern("input"), intermediate)],
                    dep,
                )
            }
            ScriptValue::Object(object) => {
                let object = object.clone();
                let mut scope = self.scope_guard();
                for (var, value) in args {
                    scope.set_variable(var, value);
                }
                object.dependencies(&mut *scope, dep)
            }
            _ => Ok(ScriptValue::Nil),
        }
    }

    fn dependency_pass(
        &mut self,
        dep: &Dependency,
        script: &Script,
        args: Vec<(Variable, ScriptValue)>,
    ) -> Result<ScriptValue> {
        let key = script_key(script);
        self.analyzing.push(key);
        let base = self.stack.len();
        let mark = self.open_scope();
        for (var, value) in args {
            self.environment_mut().set(var, value);
        }
        let result = self.walk(dep, script, base, mark);
        self.close_scope(mark);
        self.stack.truncate(base);
        self.analyzing.retain(|k| *k != key);
        result
    }

    fn walk(
        &mut self,
        dep: &Dependency,
        script: &Script,
        base: usize,
        mark: usize,
    ) -> Result<ScriptValue> {
        let code = script.instructions();
        let mut pending: Vec<PendingPath> = Vec::new();
        let mut back_edges: HashSet<usize> = HashSet::new();
        let mut entered_loops: HashSet<usize> = HashSet::new();
        let mut result = ScriptValue::Nil;
        let mut ip = 0;
        let mut live = true;

        loop {
            // ═══════════════════════════════════════════════════════════
            // Path Scheduling
            // ═══════════════════════════════════════════════════════════
            if !live {
                let next = pending
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, p)| p.target)
                    .map(|(i, _)| i);
                let Some(index) = next else {
                    break;
                };
                let path = pending.swap_remove(index);
                ip = path.target;
                self.restore_path(base, mark, path);
                live = true;
            }
            while let Some(index) = pending.iter().position(|p| p.target == ip) {
                let path = pending.swap_remove(index);
                self.join_path(base, path);
            }

            let Some(&instr) = code.get(ip) else {
                result = unify(result, self.stack_top(base));
                live = false;
                continue;
            };
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
                    self.pop_or_nil(base);
                }
                Opcode::Dup => {
                    let depth = arg as usize;
                    let value = match self.stack.len().checked_sub(depth + 1) {
                        Some(i) if i >= base => self.stack[i].clone(),
                        _ => ScriptValue::Nil,
                    };
                    self.stack.push(value);
                }

                // ═══════════════════════════════════════════════════════
                // Control Flow
                // ═══════════════════════════════════════════════════════
                Opcode::Jump => {
                    let target = jump_target(script, at, arg)?;
                    if target > at {
                        pending.push(self.save_path(base, mark, target));
                        live = false;
                    } else if back_edges.insert(at) {
                        self.check_interrupt()?;
                        ip = target;
                    } else {
                        live = false;
                    }
                }
                Opcode::JumpIfNot => {
                    let target = jump_target(script, at, arg)?;
                    self.pop_or_nil(base);
                    if target > at || back_edges.insert(at) {
                        pending.push(self.save_path(base, mark, target));
                    }
                }
                Opcode::JumpScAnd | Opcode::JumpScOr => {
                    let target = jump_target(script, at, arg)?;
                    if target > at || back_edges.insert(at) {
                        pending.push(self.save_path(base, mark, target));
                    }
                    self.pop_or_nil(base);
                }
                op @ (Opcode::Loop | Opcode::LoopWithKey) => {
                    let target = jump_target(script, at, arg)?;
                    let slot = self.stack.len().checked_sub(2).filter(|&i| i >= base);
                    if entered_loops.insert(at) {
                        // The loop may run zero times
                        let mut exit = self.save_path(base, mark, target);
                        if let Some(i) = slot {
                            exit.stack.remove(i - base);
                        }
                        pending.push(exit);

                        let (key, value) = match slot.map(|i| &self.stack[i]) {
                            Some(ScriptValue::Iterator(it)) => it
                                .next_entry()
                                .unwrap_or((ScriptValue::Nil, ScriptValue::Nil)),
                            _ => (ScriptValue::Nil, ScriptValue::Nil),
                        };
                        if op == Opcode::LoopWithKey {
                            self.stack.push(key);
                        }
                        self.stack.push(value);
                    } else {
                        if let Some(i) = slot {
                            self.stack.remove(i);
                        }
                        pending.push(self.save_path(base, mark, target));
                        live = false;
                    }
                }
                Opcode::Ret => {
                    result = unify(result, self.stack_top(base));
                    live = false;
                }

                // ═══════════════════════════════════════════════════════
                // Variables and Members
                // ═══════════════════════════════════════════════════════
                Opcode::GetVar => {
                    let var = Variable::from_id(arg);
                    let value = match self.registry().lookup(var) {
                        Some(node) => {
                            node.signal(dep);
                            placeholder(node)
                        }
                        None => self.environment().get(var).cloned().unwrap_or_default(),
                    };
                    self.stack.push(value);
                }
                Opcode::SetVar => {
                    let value = self.stack_top(base);
                    self.environment_mut().set(Variable::from_id(arg), value);
                }
                Opcode::MemberC => {
                    let name = constant(script, at, arg)?;
                    let object = self.pop_or_nil(base);
                    self.stack.push(member_of(&object, &name, dep));
                }
                Opcode::MakeObject => {
                    let values = self.pop_n_or_nil(base, 2 * arg as usize);
                    self.stack.push(make_object(values));
                }

                // ═══════════════════════════════════════════════════════
                // Calls
                // ═══════════════════════════════════════════════════════
                op @ (Opcode::Call | Opcode::TailCall | Opcode::Closure) => {
                    let n = arg as usize;
                    let params = call_params(script, ip, n)?;
                    ip += n;
                    let args = self.pop_n_or_nil(base, n);
                    let function = self.pop_or_nil(base);
                    let bindings: Vec<_> = params.into_iter().zip(args).collect();
                    let value = if op == Opcode::Closure {
                        self.make_closure(function, bindings)
                    } else {
                        self.call_dependencies(&function, bindings, dep)?
                    };
                    self.stack.push(value);
                }

                // ═══════════════════════════════════════════════════════
                // Operators
                // ═══════════════════════════════════════════════════════
                Opcode::Unary => {
                    let a = self.pop_or_nil(base);
                    let value = match UnaryOp::from_code(arg) {
                        Ok(UnaryOp::IteratorC) => dependency_iterator(&a, dep),
                        Ok(_) => ScriptValue::Nil,
                        Err(e) => return Err(EvalError::malformed(at, e.to_string())),
                    };
                    self.stack.push(value);
                }
                Opcode::Binary => {
                    let op = BinaryOp::from_code(arg)
                        .map_err(|e| EvalError::malformed(at, e.to_string()))?;
                    let b = self.pop_or_nil(base);
                    let a = self.pop_or_nil(base);
                    let value = match op {
                        BinaryOp::Member => member_of(&a, &b, dep),
                        BinaryOp::Add if a.is_callable() && b.is_callable() => {
                            binary(BinaryOp::Add, a, b)
                        }
                        BinaryOp::Add | BinaryOp::OrElse => unify(a, b),
                        BinaryOp::IteratorR => match binary(op, a, b) {
                            it @ ScriptValue::Iterator(_) => it,
                            _ => stand_in_iterator(),
                        },
                        _ => ScriptValue::Nil,
                    };
                    self.stack.push(value);
                }
                Opcode::Ternary => {
                    self.pop_n_or_nil(base, 3);
                    self.stack.push(ScriptValue::Nil);
                }
                Opcode::Quaternary => {
                    self.pop_n_or_nil(base, 4);
                    self.stack.push(ScriptValue::Nil);
                }
            }
        }
        Ok(result)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Path State
    // ═══════════════════════════════════════════════════════════════════

    fn save_path(&self, base: usize, mark: usize, target: usize) -> PendingPath {
        PendingPath {
            target,
            stack: self.stack[base.min(self.stack.len())..].to_vec(),
            bindings: self.environment().bound_since(mark),
        }
    }

    fn restore_path(&mut self, base: usize, mark: usize, path: PendingPath) {
        self.stack.truncate(base);
        self.stack.extend(path.stack);
        let env = self.environment_mut();
        env.restore_to(mark);
        for (var, value) in path.bindings {
            if let Some(value) = value {
                env.set(var, value);
            }
        }
    }

    fn join_path(&mut self, base: usize, path: PendingPath) {
        for (offset, value) in path.stack.into_iter().enumerate() {
            match self.stack.get_mut(base + offset) {
                Some(slot) => *slot = unify(std::mem::take(slot), value),
                None => self.stack.push(value),
            }
        }
        let env = self.environment_mut();
        for (var, value) in path.bindings {
            let joined = match (env.get(var).cloned(), value) {
                (Some(current), Some(other)) => unify(current, other),
                (None, Some(other)) => other,
                _ => continue,
            };
            env.set(var, joined);
        }
    }

    fn pop_or_nil(&mut self, base: usize) -> ScriptValue {
        if self.stack.len() > base {
            self.stack.pop().unwrap_or_default()
        } else {
            ScriptValue::Nil
        }
    }

    fn pop_n_or_nil(&mut self, base: usize, n: usize) -> Vec<ScriptValue> {
        let mut values: Vec<_> = (0..n).map(|_| self.pop_or_nil(base)).collect();
        values.reverse();
        values
    }

    fn stack_top(&self, base: usize) -> ScriptValue {
        if self.stack.len() > base {
            self.stack.last().cloned().unwrap_or_default()
        } else {
            ScriptValue::Nil
        }
    }
}

fn script_key(script: &Script) -> usize {
    script as *const Script as usize
}

fn jump_target(script: &Script, at: usize, target: u32) -> Result<usize> {
    let target = target as usize;
    if target > script.len() {
        return Err(EvalError::malformed(at, "jump target out of range"));
    }
    Ok(target)
}

fn member_of(object: &ScriptValue, key: &ScriptValue, dep: &Dependency) -> ScriptValue {
    match key.to_text() {
        Ok(name) => dependency_member(object, &name, dep),
        Err(_) => ScriptValue::Nil,
    }
}

/// Read a member during a pass. Missing members are nil.
pub(crate) fn dependency_member(object: &ScriptValue, name: &str, dep: &Dependency) -> ScriptValue {
    match object {
        ScriptValue::Object(obj) => obj.dependency_member(name, dep),
        ScriptValue::Collection(_) => match object.member(&ScriptValue::string(name)) {
            ScriptValue::Error(_) => ScriptValue::Nil,
            value => value,
        },
        _ => ScriptValue::Nil,
    }
}

/// Iterate during a pass. Anything that cannot be iterated yields one nil.
pub(crate) fn dependency_iterator(value: &ScriptValue, dep: &Dependency) -> ScriptValue {
    match value {
        ScriptValue::Object(obj) => obj.dependency_iterator(dep),
        ScriptValue::Iterator(_) => value.clone(),
        ScriptValue::Collection(items) if !items.is_empty() => value.make_iterator(),
        _ => stand_in_iterator(),
    }
}

fn stand_in_iterator() -> ScriptValue {
    ScriptValue::Iterator(ScriptIterator::custom(std::iter::once((
        ScriptValue::Int(0),
        ScriptValue::Nil,
    ))))
}
