// 单 hook 生命周期场景
use crate::test_ctx::{
    self, FakeKernel, ORIG_A, ORIG_CALLS_A, PARENT_OUTSIDE, REPL_CALLS_A, caller_origin,
};
use kfx_hook::{
    Errno, FtraceHook, HookEngine, HookState, RECORD_ITEM_ERRNO, RECORD_ITEM_OP,
    RECORD_ITEM_SYM_NAME,
};
use std::sync::atomic::Ordering;

pub fn scenario_install_roundtrip() {
    test_ctx::reset();
    let kernel = FakeKernel::new(false);
    let addr = kernel.add_symbol("sys_foo", test_ctx::body_a);
    let repl = kernel.add_replacement(test_ctx::repl_a);
    let engine = HookEngine::new(&kernel, &kernel, caller_origin());

    // 安装前直达原函数
    assert_eq!(kernel.call_symbol("sys_foo", PARENT_OUTSIDE, 1), 2);
    assert_eq!(ORIG_CALLS_A.load(Ordering::Relaxed), 1);

    let mut hooks = [FtraceHook::new("sys_foo", repl, ORIG_A.as_ptr())];
    engine.install_all(&mut hooks).unwrap();
    assert_eq!(hooks[0].state(), HookState::Installed);
    assert_eq!(ORIG_A.load(Ordering::Acquire), addr);

    // 外部调用改走 replacement,replacement 内部经 original 槽抵达原函数
    assert_eq!(kernel.call_symbol("sys_foo", PARENT_OUTSIDE, 1), 102);
    assert_eq!(REPL_CALLS_A.load(Ordering::Relaxed), 1);
    assert_eq!(ORIG_CALLS_A.load(Ordering::Relaxed), 2);

    engine.remove_all(&mut hooks);
    assert_eq!(hooks[0].state(), HookState::Removed);

    // 卸载后无残留重定向
    assert_eq!(kernel.call_symbol("sys_foo", PARENT_OUTSIDE, 1), 2);
    assert_eq!(REPL_CALLS_A.load(Ordering::Relaxed), 1);
    assert!(!kernel.interception_active());
}

pub fn scenario_remove_idempotent() {
    test_ctx::reset();
    let kernel = FakeKernel::new(false);
    kernel.add_symbol("sys_foo", test_ctx::body_a);
    let repl = kernel.add_replacement(test_ctx::repl_takeover);
    let engine = HookEngine::new(&kernel, &kernel, caller_origin());

    let mut hook = FtraceHook::new("sys_foo", repl, ORIG_A.as_ptr());
    engine.install(&mut hook).unwrap();
    engine.remove(&mut hook);
    engine.remove(&mut hook);
    assert_eq!(hook.state(), HookState::Removed);
    assert_eq!(kernel.call_symbol("sys_foo", PARENT_OUTSIDE, 5), 6);
}

pub fn scenario_unknown_symbol() {
    test_ctx::reset();
    let kernel = FakeKernel::new(false);
    let repl = kernel.add_replacement(test_ctx::repl_takeover);
    let engine = HookEngine::new(&kernel, &kernel, caller_origin());

    let mut hook = FtraceHook::new("sys_nope", repl, ORIG_A.as_ptr());
    assert_eq!(engine.install(&mut hook), Err(Errno::NoSym));
    assert_eq!(hook.state(), HookState::Created);
    assert!(!kernel.interception_active());
}

pub fn scenario_thunk_failure_undo() {
    test_ctx::reset();
    let kernel = FakeKernel::new(false);
    kernel.add_symbol("sys_foo", test_ctx::body_a);
    let repl = kernel.add_replacement(test_ctx::repl_takeover);
    let engine = HookEngine::new(&kernel, &kernel, caller_origin());

    kernel.set_fail_thunk(true);
    let mut hook = FtraceHook::new("sys_foo", repl, ORIG_A.as_ptr());
    assert_eq!(engine.install(&mut hook), Err(Errno::ThunkReg));
    // 已完成的过滤登记被回退,调用直达原函数
    assert_eq!(hook.state(), HookState::Resolved);
    assert!(!kernel.interception_active());
    assert_eq!(kernel.call_symbol("sys_foo", PARENT_OUTSIDE, 1), 2);

    // 故障消除后从 Resolved 重试安装
    kernel.set_fail_thunk(false);
    engine.install(&mut hook).unwrap();
    assert_eq!(kernel.call_symbol("sys_foo", PARENT_OUTSIDE, 1), 10);
    engine.remove(&mut hook);
}

pub fn scenario_records() {
    test_ctx::reset();
    let kernel = FakeKernel::new(false);
    kernel.add_symbol("sys_foo", test_ctx::body_a);
    let repl = kernel.add_replacement(test_ctx::repl_takeover);
    let engine = HookEngine::new(&kernel, &kernel, caller_origin());

    assert!(!engine.get_recordable());
    engine.set_recordable(true);

    let mut hook = FtraceHook::new("sys_foo", repl, ORIG_A.as_ptr());
    engine.install(&mut hook).unwrap();
    engine.remove(&mut hook);

    let text = engine
        .get_records(RECORD_ITEM_OP | RECORD_ITEM_SYM_NAME | RECORD_ITEM_ERRNO)
        .unwrap();
    assert_eq!(text, "install,sys_foo,0\nremove,sys_foo,0\n");
}

pub fn scenario_hidden_lookup_probe_once() {
    test_ctx::reset();
    let kernel = FakeKernel::new(true);
    let addr_a = kernel.add_symbol("sys_foo", test_ctx::body_a);
    kernel.add_symbol("sys_bar", test_ctx::body_b);
    let repl = kernel.add_replacement(test_ctx::repl_takeover);
    let engine = HookEngine::new(&kernel, &kernel, caller_origin());

    // 查询例程被隐藏,解析经探针间接进行且只探测一次
    assert_eq!(engine.lookup("sys_foo"), Ok(addr_a));

    let mut hooks = [
        FtraceHook::new("sys_foo", repl, ORIG_A.as_ptr()),
        FtraceHook::new("sys_bar", repl, test_ctx::ORIG_B.as_ptr()),
    ];
    engine.install_all(&mut hooks).unwrap();
    assert_eq!(kernel.probe_count(), 1);

    engine.remove_all(&mut hooks);
}
