//! Tests for delayed errors, recovery with `or else`, and backtraces

use cardscript::*;
use pretty_assertions::assert_eq;

fn script(build: impl FnOnce(&mut ScriptBuilder)) -> Script {
    let mut b = ScriptBuilder::new();
    build(&mut b);
    b.build().expect("encoding failed")
}

fn int(n: i64) -> ScriptValue {
    ScriptValue::Int(n)
}

fn push_list(s: &mut ScriptBuilder, items: &[i64]) {
    for item in items {
        s.push_const(ScriptValue::Nil);
        s.push_const(int(*item));
    }
    s.make_object(items.len() as u32);
}

// ═══════════════════════════════════════════════════════════════════════
// Recovery Tests
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_or_else_recovers_missing_index() {
    let mut ctx = Context::new();
    let main = script(|s| {
        push_list(s, &[1]);
        s.push_const(int(5)).binary(BinaryOp::Member);
        s.push_const(int(7)).binary(BinaryOp::OrElse).ret();
    });
    assert_eq!(ctx.eval(&main, true), Ok(int(7)));
}

#[test]
fn test_or_else_keeps_good_value() {
    let mut ctx = Context::new();
    let main = script(|s| {
        s.push_const(int(3)).push_const(int(5));
        s.binary(BinaryOp::OrElse).ret();
    });
    assert_eq!(ctx.eval(&main, true), Ok(int(3)));
}

#[test]
fn test_or_else_recovers_host_error() {
    let mut ctx = Context::with_prelude();
    let main = script(|s| {
        s.get_var("error").push_const("nope".into()).call(&["input"]);
        s.push_const("fallback".into()).binary(BinaryOp::OrElse).ret();
    });
    assert_eq!(ctx.eval(&main, true), Ok(ScriptValue::string("fallback")));
}

#[test]
fn test_delayed_error_flows_through_operators() {
    let mut ctx = Context::new();
    let main = script(|s| {
        s.push_const(int(1)).push_const(int(0)).binary(BinaryOp::Div);
        s.push_const(int(1)).binary(BinaryOp::Add);
        s.push_const(int(2)).binary(BinaryOp::Mul);
        s.push_const(int(0)).binary(BinaryOp::OrElse).ret();
    });
    assert_eq!(ctx.eval(&main, true), Ok(int(0)));
}

#[test]
fn test_unused_error_is_harmless() {
    let mut ctx = Context::new();
    let main = script(|s| {
        s.push_const(int(1)).push_const(int(0)).binary(BinaryOp::Div).pop();
        s.push_const(int(4)).ret();
    });
    assert_eq!(ctx.eval(&main, true), Ok(int(4)));
}

#[test]
fn test_unrecovered_error_is_raised() {
    let mut ctx = Context::new();
    let main = script(|s| {
        push_list(s, &[1]);
        s.push_const(int(5)).binary(BinaryOp::Member).ret();
    });
    assert!(matches!(
        ctx.eval(&main, true),
        Err(EvalError::NoMember { .. })
    ));
}

#[test]
fn test_unbound_variable_is_immediate() {
    let mut ctx = Context::new();
    let main = script(|s| {
        s.get_var("never_bound_anywhere");
        s.push_const(int(7)).binary(BinaryOp::OrElse).ret();
    });
    assert_eq!(
        ctx.eval(&main, true),
        Err(EvalError::UnboundVariable {
            name: "never_bound_anywhere".to_string()
        })
    );
}

#[test]
fn test_error_message_text() {
    let mut ctx = Context::new();
    let main = script(|s| {
        s.get_var("not_set_here").ret();
    });
    let err = ctx.eval(&main, true).unwrap_err();
    assert_eq!(err.to_string(), "Variable not set: not_set_here");
}

// ═══════════════════════════════════════════════════════════════════════
// Context Recovery Tests
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_context_is_clean_after_error() {
    let mut ctx = Context::new();
    let failing = script(|s| {
        s.push_const(int(1)).set_var("half_done");
        s.push_const(int(2)).push_const(int(3));
        s.get_var("missing").ret();
    });
    assert!(ctx.eval(&failing, true).is_err());
    assert_eq!(ctx.stack_depth(), 0);
    assert_eq!(ctx.call_depth(), 0);
    assert_eq!(ctx.environment().level(), 0);
    assert!(ctx.get_variable_opt("half_done").is_none());

    let fine = script(|s| {
        s.push_const(int(2)).ret();
    });
    assert_eq!(ctx.eval(&fine, true), Ok(int(2)));
}

#[test]
fn test_backtrace_lists_call_sites_innermost_first() {
    let mut ctx = Context::new();
    ctx.set_variable(
        "inner",
        ScriptValue::script(script(|s| {
            s.get_var("missing").ret();
        })),
    );
    ctx.set_variable(
        "middle",
        ScriptValue::script(script(|s| {
            s.get_var("inner").call(&[]).ret();
        })),
    );
    let main = script(|s| {
        s.get_var("middle").call(&[]).ret();
    });
    assert!(ctx.eval(&main, true).is_err());
    assert_eq!(
        ctx.take_backtrace(),
        vec!["in function inner".to_string(), "in function middle".to_string()]
    );
    assert!(ctx.take_backtrace().is_empty());
}

#[test]
fn test_backtrace_reset_by_next_eval() {
    let mut ctx = Context::new();
    ctx.set_variable(
        "fails",
        ScriptValue::script(script(|s| {
            s.get_var("missing").ret();
        })),
    );
    let main = script(|s| {
        s.get_var("fails").call(&[]).ret();
    });
    assert!(ctx.eval(&main, true).is_err());
    assert!(ctx.eval(&main, true).is_err());
    assert_eq!(ctx.take_backtrace(), vec!["in function fails".to_string()]);
}

// ═══════════════════════════════════════════════════════════════════════
// Malformed Script Tests
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_stack_underflow() {
    let mut ctx = Context::new();
    let main = script(|s| {
        s.push_const(int(1)).binary(BinaryOp::Add).ret();
    });
    assert!(matches!(
        ctx.eval(&main, true),
        Err(EvalError::MalformedScript { .. })
    ));
    assert_eq!(ctx.stack_depth(), 0);
}

#[test]
fn test_jump_out_of_range() {
    let mut ctx = Context::new();
    let main = script(|s| {
        s.push_const(int(1)).jump_to(Opcode::Jump, 99);
    });
    assert!(matches!(
        ctx.eval(&main, true),
        Err(EvalError::MalformedScript { position: 1, .. })
    ));
}

#[test]
fn test_missing_argument_names() {
    let mut ctx = Context::new();
    let main = Script::new(
        vec![
            Instruction::new(Opcode::PushConst, 0).unwrap(),
            Instruction::new(Opcode::PushConst, 0).unwrap(),
            Instruction::new(Opcode::Call, 1).unwrap(),
            Instruction::new(Opcode::Ret, 0).unwrap(),
        ],
        vec![int(1)],
    );
    assert!(matches!(
        ctx.eval(&main, true),
        Err(EvalError::MalformedScript { position: 3, .. })
    ));
}

#[test]
fn test_unknown_operator_code() {
    let mut ctx = Context::new();
    let main = Script::new(
        vec![
            Instruction::new(Opcode::PushConst, 0).unwrap(),
            Instruction::new(Opcode::Unary, 99).unwrap(),
            Instruction::new(Opcode::Ret, 0).unwrap(),
        ],
        vec![int(1)],
    );
    assert!(matches!(
        ctx.eval(&main, true),
        Err(EvalError::MalformedScript { position: 1, .. })
    ));
}
