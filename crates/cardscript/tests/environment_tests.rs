//! Environment tests: scopes, shadowing and restore order

use cardscript::*;
use pretty_assertions::assert_eq;

fn int(n: i64) -> ScriptValue {
    ScriptValue::Int(n)
}

fn script(build: impl FnOnce(&mut ScriptBuilder)) -> Script {
    let mut b = ScriptBuilder::new();
    build(&mut b);
    b.build().expect("encoding failed")
}

// ═══════════════════════════════════════════════════════════════════════
// Scoping and Shadowing
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_outermost_binding_is_not_shadowed() {
    let x = Variable::intern("envt_outermost");
    let mut env = Environment::new();
    env.set(x, int(1));
    env.set(x, int(2));
    assert_eq!(env.shadow_depth(), 0);
    assert_eq!(env.level(), 0);
    assert_eq!(env.get(x), Some(&int(2)));
}

#[test]
fn test_close_scope_restores_outer_value() {
    let x = Variable::intern("envt_restore");
    let mut env = Environment::new();
    env.set(x, int(1));

    let mark = env.open_scope();
    env.set(x, int(10));
    env.set(x, int(11));
    env.set(x, int(12));
    assert_eq!(env.shadow_depth(), 1);
    env.close_scope(mark);

    assert_eq!(env.get(x), Some(&int(1)));
    assert_eq!(env.level(), 0);
}

#[test]
fn test_inner_binding_is_dropped() {
    let y = Variable::intern("envt_inner_only");
    let mut env = Environment::new();
    let mark = env.open_scope();
    env.set(y, int(3));
    assert_eq!(env.scope_of(y), Some(0));
    env.close_scope(mark);
    assert_eq!(env.get(y), None);
    assert_eq!(env.scope_of(y), None);
}

#[test]
fn test_random_nesting_restores_every_scope() {
    let names: Vec<Variable> = (0..4)
        .map(|i| Variable::intern(&format!("envt_random_{}", i)))
        .collect();
    let mut env = Environment::new();
    for (i, v) in names.iter().enumerate() {
        env.set(*v, int(i as i64));
    }

    // Deterministic pseudo-random walk of opens, closes and writes
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };
    let snapshot = |env: &Environment| -> Vec<Option<ScriptValue>> {
        names.iter().map(|v| env.get(*v).cloned()).collect()
    };

    let mut open: Vec<(usize, Vec<Option<ScriptValue>>)> = Vec::new();
    for step in 0..2000 {
        match next() % 3 {
            0 => {
                let before = snapshot(&env);
                open.push((env.open_scope(), before));
            }
            1 => {
                if let Some((mark, before)) = open.pop() {
                    env.close_scope(mark);
                    assert_eq!(snapshot(&env), before, "step {}", step);
                }
            }
            _ => {
                let v = names[(next() % names.len() as u64) as usize];
                env.set(v, int(step));
            }
        }
    }
    while let Some((mark, before)) = open.pop() {
        env.close_scope(mark);
        assert_eq!(snapshot(&env), before);
    }
    assert_eq!(env.level(), 0);
    assert_eq!(env.shadow_depth(), 0);
}

// ═══════════════════════════════════════════════════════════════════════
// Context Scopes
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_scope_guard_closes_on_drop() {
    let mut ctx = Context::new();
    ctx.set_variable("envt_guarded", int(1));
    {
        let mut scope = ctx.scope_guard();
        scope.set_variable("envt_guarded", int(2));
        scope.set_variable("envt_guard_local", int(3));
        assert_eq!(scope.get_variable_scope("envt_guarded"), Some(0));
    }
    assert_eq!(ctx.get_variable("envt_guarded"), Ok(int(1)));
    assert!(ctx.get_variable_opt("envt_guard_local").is_none());
}

#[test]
fn test_variable_scope_distance() {
    let mut ctx = Context::new();
    ctx.set_variable("envt_far", int(1));
    let outer = ctx.open_scope();
    ctx.set_variable("envt_near", int(2));
    let inner = ctx.open_scope();
    assert_eq!(ctx.get_variable_scope("envt_far"), Some(2));
    assert_eq!(ctx.get_variable_scope("envt_near"), Some(1));
    assert_eq!(ctx.get_variable_scope("envt_nowhere"), None);
    ctx.close_scope(inner);
    ctx.close_scope(outer);
}

#[test]
fn test_eval_without_scope_leaks_bindings() {
    let mut ctx = Context::new();
    let declare = script(|s| {
        s.push_const(int(9)).set_var("envt_leaked").ret();
    });
    assert_eq!(ctx.eval(&declare, false), Ok(int(9)));
    assert_eq!(ctx.get_variable("envt_leaked"), Ok(int(9)));
}

#[test]
fn test_eval_with_scope_keeps_bindings_local() {
    let mut ctx = Context::new();
    ctx.set_variable("envt_kept", int(1));
    let rebind = script(|s| {
        s.push_const(int(2)).set_var("envt_kept").pop();
        s.push_const(int(3)).set_var("envt_scratch").ret();
    });
    assert_eq!(ctx.eval(&rebind, true), Ok(int(3)));
    assert_eq!(ctx.get_variable("envt_kept"), Ok(int(1)));
    assert!(ctx.get_variable_opt("envt_scratch").is_none());
}

// ═══════════════════════════════════════════════════════════════════════
// Variable Interning
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_interning_is_stable() {
    let a = Variable::intern("envt_same_name");
    let b = Variable::intern("envt_same_name");
    assert_eq!(a, b);
    assert_eq!(a.name(), "envt_same_name");
    assert_ne!(a, Variable::intern("envt_other_name"));
}

#[test]
fn test_interning_agrees_across_threads() {
    let here = Variable::intern("envt_threaded");
    let there = std::thread::spawn(|| Variable::intern("envt_threaded"))
        .join()
        .unwrap();
    assert_eq!(here, there);
}
