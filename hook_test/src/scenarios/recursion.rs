// 防递归策略场景:caller-origin 检查与偏移入口绕过
use crate::test_ctx::{
    self, FakeKernel, ORIG_A, ORIG_CALLS_A, PARENT_INSIDE, PARENT_OUTSIDE, REPL_CALLS_A,
    caller_origin,
};
use kfx_hook::{FENTRY_INSN_SIZE, FtraceHook, HookEngine, RedirectPolicy};
use std::sync::atomic::Ordering;

pub fn scenario_caller_origin_guard() {
    test_ctx::reset();
    let kernel = FakeKernel::new(false);
    kernel.add_symbol("sys_foo", test_ctx::body_a);
    let repl = kernel.add_replacement(test_ctx::repl_takeover);
    let engine = HookEngine::new(&kernel, &kernel, caller_origin());

    let mut hook = FtraceHook::new("sys_foo", repl, ORIG_A.as_ptr());
    engine.install(&mut hook).unwrap();

    // owner 模块内部发起的调用走原始逻辑,不触发 replacement
    assert_eq!(kernel.call_symbol("sys_foo", PARENT_INSIDE, 1), 2);
    assert_eq!(REPL_CALLS_A.load(Ordering::Relaxed), 0);
    assert_eq!(ORIG_CALLS_A.load(Ordering::Relaxed), 1);

    // 外部调用被重定向
    assert_eq!(kernel.call_symbol("sys_foo", PARENT_OUTSIDE, 1), 10);
    assert_eq!(REPL_CALLS_A.load(Ordering::Relaxed), 1);

    engine.remove(&mut hook);
}

pub fn scenario_entry_offset_bypass() {
    test_ctx::reset();
    let kernel = FakeKernel::new(false);
    let addr = kernel.add_symbol("sys_foo", test_ctx::body_a);
    let repl = kernel.add_replacement(test_ctx::repl_a);
    let engine = HookEngine::new(&kernel, &kernel, RedirectPolicy::EntryOffset);

    let mut hook = FtraceHook::new("sys_foo", repl, ORIG_A.as_ptr());
    engine.install(&mut hook).unwrap();
    // original 槽指向插桩点之后
    assert_eq!(ORIG_A.load(Ordering::Acquire), addr + FENTRY_INSN_SIZE);

    // 偏移模式下重定向无条件,即使调用来自 owner 模块内部
    // replacement 经偏移入口抵达原函数,不会再次进入分发
    assert_eq!(kernel.call_symbol("sys_foo", PARENT_INSIDE, 1), 102);
    assert_eq!(REPL_CALLS_A.load(Ordering::Relaxed), 1);
    assert_eq!(ORIG_CALLS_A.load(Ordering::Relaxed), 1);

    engine.remove(&mut hook);
    assert_eq!(kernel.call_symbol("sys_foo", PARENT_INSIDE, 1), 2);
}

pub fn scenario_mixed_callers() {
    test_ctx::reset();
    let kernel = FakeKernel::new(false);
    kernel.add_symbol("sys_foo", test_ctx::body_a);
    let repl = kernel.add_replacement(test_ctx::repl_a);
    let engine = HookEngine::new(&kernel, &kernel, caller_origin());

    let mut hook = FtraceHook::new("sys_foo", repl, ORIG_A.as_ptr());
    engine.install(&mut hook).unwrap();

    // 内外部调用交替,互不影响
    for round in 0..3 {
        assert_eq!(kernel.call_symbol("sys_foo", PARENT_OUTSIDE, 1), 102);
        assert_eq!(kernel.call_symbol("sys_foo", PARENT_INSIDE, 1), 2);
        assert_eq!(REPL_CALLS_A.load(Ordering::Relaxed), round + 1);
    }
    // 每轮外部调用经 replacement 回调原函数一次,内部调用直达一次
    assert_eq!(ORIG_CALLS_A.load(Ordering::Relaxed), 6);

    engine.remove(&mut hook);
}
