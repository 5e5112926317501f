// 批量安装的全或无与尽力而为卸载场景
use crate::test_ctx::{
    self, FakeKernel, ORIG_A, ORIG_B, PARENT_OUTSIDE, REPL_CALLS_A, REPL_CALLS_B, caller_origin,
};
use kfx_hook::{Errno, FtraceHook, HookEngine, HookState};
use std::sync::atomic::Ordering;

pub fn scenario_batch_atomic_rollback() {
    test_ctx::reset();
    let kernel = FakeKernel::new(false);
    kernel.add_symbol("sys_foo", test_ctx::body_a);
    let repl_a = kernel.add_replacement(test_ctx::repl_a);
    let repl_b = kernel.add_replacement(test_ctx::repl_b);
    let engine = HookEngine::new(&kernel, &kernel, caller_origin());

    let mut hooks = [
        FtraceHook::new("sys_foo", repl_a, ORIG_A.as_ptr()),
        FtraceHook::new("sys_missing", repl_b, ORIG_B.as_ptr()),
    ];

    // 第二个 hook 解析失败,第一个被回退,整批无效
    assert_eq!(engine.install_all(&mut hooks), Err(Errno::NoSym));
    assert_eq!(hooks[0].state(), HookState::Resolved);
    assert_eq!(hooks[1].state(), HookState::Created);
    assert!(!kernel.interception_active());
    assert_eq!(kernel.call_symbol("sys_foo", PARENT_OUTSIDE, 1), 2);
    assert_eq!(REPL_CALLS_A.load(Ordering::Relaxed), 0);

    // 缺失符号出现后重试,第一个 hook 从 Resolved 续装
    kernel.add_symbol("sys_missing", test_ctx::body_b);
    engine.install_all(&mut hooks).unwrap();
    assert!(hooks.iter().all(FtraceHook::is_installed));
    assert_eq!(kernel.call_symbol("sys_foo", PARENT_OUTSIDE, 1), 102);
    assert_eq!(kernel.call_symbol("sys_missing", PARENT_OUTSIDE, 1), 203);

    engine.remove_all(&mut hooks);
}

pub fn scenario_batch_success_remove_all() {
    test_ctx::reset();
    let kernel = FakeKernel::new(false);
    kernel.add_symbol("sys_foo", test_ctx::body_a);
    kernel.add_symbol("sys_bar", test_ctx::body_b);
    let repl_a = kernel.add_replacement(test_ctx::repl_a);
    let repl_b = kernel.add_replacement(test_ctx::repl_b);
    let engine = HookEngine::new(&kernel, &kernel, caller_origin());

    let mut hooks = [
        FtraceHook::new("sys_foo", repl_a, ORIG_A.as_ptr()),
        FtraceHook::new("sys_bar", repl_b, ORIG_B.as_ptr()),
    ];
    engine.install_all(&mut hooks).unwrap();

    assert_eq!(kernel.call_symbol("sys_foo", PARENT_OUTSIDE, 1), 102);
    assert_eq!(kernel.call_symbol("sys_bar", PARENT_OUTSIDE, 1), 203);
    assert_eq!(REPL_CALLS_A.load(Ordering::Relaxed), 1);
    assert_eq!(REPL_CALLS_B.load(Ordering::Relaxed), 1);

    engine.remove_all(&mut hooks);
    assert!(hooks.iter().all(|hook| hook.state() == HookState::Removed));
    assert_eq!(kernel.call_symbol("sys_foo", PARENT_OUTSIDE, 1), 2);
    assert_eq!(kernel.call_symbol("sys_bar", PARENT_OUTSIDE, 1), 3);
    assert!(!kernel.interception_active());
}
