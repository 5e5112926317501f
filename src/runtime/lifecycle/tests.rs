// 生命周期与批量安装的单元测试
use super::HookEngine;
use crate::api::{FtraceHook, HookState};
use crate::errno::Errno;
use crate::runtime::engine::{CallFrame, DispatchSlot, FENTRY_INSN_SIZE, RedirectPolicy};
use crate::runtime::resolver::LookupPort;
use crate::runtime::table::InterceptTable;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const OWNER_START: usize = 0x4000_0000;
const OWNER_END: usize = 0x4000_1000;
const PARENT_OUTSIDE: usize = 0x1234;
const REPLACEMENT: usize = 0xdead_0000;

const CALLER_ORIGIN: RedirectPolicy = RedirectPolicy::CallerOrigin {
    owner_start: OWNER_START,
    owner_end: OWNER_END,
};

const SYM_OPENAT: &str = "__x64_sys_openat";
const ADDR_OPENAT: usize = 0x8000_0100;
const SYM_CLONE: &str = "__x64_sys_clone";
const ADDR_CLONE: usize = 0x8000_0200;

struct FakePort {
    symbols: HashMap<String, usize>,
}

impl FakePort {
    fn new() -> Self {
        let mut symbols = HashMap::new();
        symbols.insert(SYM_OPENAT.to_string(), ADDR_OPENAT);
        symbols.insert(SYM_CLONE.to_string(), ADDR_CLONE);
        Self { symbols }
    }
}

impl LookupPort for FakePort {
    fn has_exported_lookup(&self) -> bool {
        true
    }

    fn exported_lookup(&self, name: &str) -> usize {
        self.symbols.get(name).copied().unwrap_or(0)
    }

    fn probe_lookup_routine(&self) -> usize {
        0
    }

    fn indirect_lookup(&self, _routine: usize, _name: &str) -> usize {
        0
    }
}

// 进程内拦截表:地址 -> slot 登记,外加 thunk 注册集合与故障注入开关
struct FakeTable {
    filters: Mutex<HashMap<usize, Arc<DispatchSlot>>>,
    thunks: Mutex<Vec<Arc<DispatchSlot>>>,
    fail_filter_at: Mutex<Option<usize>>,
    fail_thunk: AtomicBool,
}

impl FakeTable {
    fn new() -> Self {
        Self {
            filters: Mutex::new(HashMap::new()),
            thunks: Mutex::new(Vec::new()),
            fail_filter_at: Mutex::new(None),
            fail_thunk: AtomicBool::new(false),
        }
    }

    fn fail_filter_at(&self, address: usize) {
        *self.fail_filter_at.lock().unwrap() = Some(address);
    }

    fn fail_thunk(&self, fail: bool) {
        self.fail_thunk.store(fail, Ordering::SeqCst);
    }

    fn is_empty(&self) -> bool {
        self.filters.lock().unwrap().is_empty() && self.thunks.lock().unwrap().is_empty()
    }

    fn routed(&self, address: usize) -> Option<Arc<DispatchSlot>> {
        let slot = self.filters.lock().unwrap().get(&address).cloned()?;
        let registered = self
            .thunks
            .lock()
            .unwrap()
            .iter()
            .any(|thunk| Arc::ptr_eq(thunk, &slot));
        registered.then_some(slot)
    }

    // 模拟一次对 address 的调用路由,返回最终执行地址
    fn dispatch_ip(&self, address: usize, parent_ip: usize) -> usize {
        let mut frame = CallFrame {
            ip: address,
            parent_ip,
        };
        if let Some(slot) = self.routed(address) {
            slot.dispatch(&mut frame);
        }
        frame.ip
    }
}

impl InterceptTable for FakeTable {
    fn set_filter(&self, slot: &Arc<DispatchSlot>, address: usize) -> Result<(), Errno> {
        if *self.fail_filter_at.lock().unwrap() == Some(address) {
            return Err(Errno::FilterReg);
        }
        let mut filters = self.filters.lock().unwrap();
        // 同一地址同时只允许一个 hook
        if filters.contains_key(&address) {
            return Err(Errno::FilterReg);
        }
        filters.insert(address, Arc::clone(slot));
        Ok(())
    }

    fn clear_filter(&self, slot: &Arc<DispatchSlot>, address: usize) -> Result<(), Errno> {
        let mut filters = self.filters.lock().unwrap();
        match filters.get(&address) {
            Some(existing) if Arc::ptr_eq(existing, slot) => {
                filters.remove(&address);
                Ok(())
            }
            _ => Err(Errno::FilterReg),
        }
    }

    fn register_thunk(&self, slot: &Arc<DispatchSlot>) -> Result<(), Errno> {
        if self.fail_thunk.load(Ordering::SeqCst) {
            return Err(Errno::ThunkReg);
        }
        // 注册成功上报前 live 标志必须已发布
        assert!(slot.is_live());
        self.thunks.lock().unwrap().push(Arc::clone(slot));
        Ok(())
    }

    fn unregister_thunk(&self, slot: &Arc<DispatchSlot>) -> Result<(), Errno> {
        let mut thunks = self.thunks.lock().unwrap();
        let before = thunks.len();
        thunks.retain(|thunk| !Arc::ptr_eq(thunk, slot));
        if thunks.len() == before {
            return Err(Errno::ThunkReg);
        }
        Ok(())
    }
}

#[test]
fn install_then_remove_roundtrip() {
    let table = FakeTable::new();
    let port = FakePort::new();
    let engine = HookEngine::new(&table, &port, CALLER_ORIGIN);

    let mut orig: usize = 0;
    let mut hook = FtraceHook::new(SYM_OPENAT, REPLACEMENT, &raw mut orig);

    assert_eq!(engine.install(&mut hook), Ok(()));
    assert_eq!(hook.state(), HookState::Installed);
    assert_eq!(hook.address(), ADDR_OPENAT);
    assert_eq!(orig, ADDR_OPENAT);
    assert_eq!(table.dispatch_ip(ADDR_OPENAT, PARENT_OUTSIDE), REPLACEMENT);

    engine.remove(&mut hook);
    assert_eq!(hook.state(), HookState::Removed);
    assert_eq!(hook.address(), 0);
    // 无残留重定向,直达原函数
    assert_eq!(table.dispatch_ip(ADDR_OPENAT, PARENT_OUTSIDE), ADDR_OPENAT);
    assert!(table.is_empty());
}

#[test]
fn entry_offset_slot_skips_interception_site() {
    let table = FakeTable::new();
    let port = FakePort::new();
    let engine = HookEngine::new(&table, &port, RedirectPolicy::EntryOffset);

    let mut orig: usize = 0;
    let mut hook = FtraceHook::new(SYM_OPENAT, REPLACEMENT, &raw mut orig);

    assert_eq!(engine.install(&mut hook), Ok(()));
    assert_eq!(orig, ADDR_OPENAT + FENTRY_INSN_SIZE);
    // 偏移入口未登记拦截,经槽调用不经过分发
    assert_eq!(
        table.dispatch_ip(ADDR_OPENAT + FENTRY_INSN_SIZE, PARENT_OUTSIDE),
        ADDR_OPENAT + FENTRY_INSN_SIZE
    );

    engine.remove(&mut hook);
}

#[test]
fn caller_origin_guard_lets_owner_calls_through() {
    let table = FakeTable::new();
    let port = FakePort::new();
    let engine = HookEngine::new(&table, &port, CALLER_ORIGIN);

    let mut orig: usize = 0;
    let mut hook = FtraceHook::new(SYM_OPENAT, REPLACEMENT, &raw mut orig);
    assert_eq!(engine.install(&mut hook), Ok(()));

    assert_eq!(
        table.dispatch_ip(ADDR_OPENAT, OWNER_START + 0x10),
        ADDR_OPENAT
    );
    assert_eq!(table.dispatch_ip(ADDR_OPENAT, PARENT_OUTSIDE), REPLACEMENT);

    engine.remove(&mut hook);
}

#[test]
fn remove_is_idempotent() {
    let table = FakeTable::new();
    let port = FakePort::new();
    let engine = HookEngine::new(&table, &port, CALLER_ORIGIN);

    let mut orig: usize = 0;
    let mut hook = FtraceHook::new(SYM_OPENAT, REPLACEMENT, &raw mut orig);
    assert_eq!(engine.install(&mut hook), Ok(()));

    engine.remove(&mut hook);
    engine.remove(&mut hook);
    assert_eq!(hook.state(), HookState::Removed);

    // 从未安装的 hook 卸载同样是无操作
    let mut never = FtraceHook::new(SYM_CLONE, REPLACEMENT, &raw mut orig);
    engine.remove(&mut never);
    assert_eq!(never.state(), HookState::Created);
}

#[test]
fn removed_hook_can_be_reinstalled() {
    let table = FakeTable::new();
    let port = FakePort::new();
    let engine = HookEngine::new(&table, &port, CALLER_ORIGIN);

    let mut orig: usize = 0;
    let mut hook = FtraceHook::new(SYM_OPENAT, REPLACEMENT, &raw mut orig);
    assert_eq!(engine.install(&mut hook), Ok(()));
    engine.remove(&mut hook);

    assert_eq!(engine.install(&mut hook), Ok(()));
    assert_eq!(hook.state(), HookState::Installed);
    assert_eq!(orig, ADDR_OPENAT);
    engine.remove(&mut hook);
}

#[test]
fn repeated_install_is_rejected() {
    let table = FakeTable::new();
    let port = FakePort::new();
    let engine = HookEngine::new(&table, &port, CALLER_ORIGIN);

    let mut orig: usize = 0;
    let mut hook = FtraceHook::new(SYM_OPENAT, REPLACEMENT, &raw mut orig);
    assert_eq!(engine.install(&mut hook), Ok(()));
    assert_eq!(engine.install(&mut hook), Err(Errno::Repeat));
    assert_eq!(hook.state(), HookState::Installed);

    engine.remove(&mut hook);
}

#[test]
fn unknown_symbol_fails_install() {
    let table = FakeTable::new();
    let port = FakePort::new();
    let engine = HookEngine::new(&table, &port, CALLER_ORIGIN);

    let mut orig: usize = 0;
    let mut hook = FtraceHook::new("no_such_symbol", REPLACEMENT, &raw mut orig);
    assert_eq!(engine.install(&mut hook), Err(Errno::NoSym));
    assert_eq!(hook.state(), HookState::Created);
    assert_eq!(orig, 0);
    assert!(table.is_empty());
}

#[test]
fn null_original_slot_is_rejected() {
    let table = FakeTable::new();
    let port = FakePort::new();
    let engine = HookEngine::new(&table, &port, CALLER_ORIGIN);

    let mut hook = FtraceHook::new(SYM_OPENAT, REPLACEMENT, std::ptr::null_mut());
    assert_eq!(engine.install(&mut hook), Err(Errno::InvalidArg));
    assert_eq!(hook.state(), HookState::Created);
}

#[test]
fn filter_failure_leaves_hook_resolved() {
    let table = FakeTable::new();
    let port = FakePort::new();
    let engine = HookEngine::new(&table, &port, CALLER_ORIGIN);
    table.fail_filter_at(ADDR_OPENAT);

    let mut orig: usize = 0;
    let mut hook = FtraceHook::new(SYM_OPENAT, REPLACEMENT, &raw mut orig);
    assert_eq!(engine.install(&mut hook), Err(Errno::FilterReg));
    assert_eq!(hook.state(), HookState::Resolved);
    assert!(table.is_empty());
}

#[test]
fn thunk_failure_undoes_filter_registration() {
    let table = FakeTable::new();
    let port = FakePort::new();
    let engine = HookEngine::new(&table, &port, CALLER_ORIGIN);
    table.fail_thunk(true);

    let mut orig: usize = 0;
    let mut hook = FtraceHook::new(SYM_OPENAT, REPLACEMENT, &raw mut orig);
    assert_eq!(engine.install(&mut hook), Err(Errno::ThunkReg));
    assert_eq!(hook.state(), HookState::Resolved);
    assert!(table.is_empty());
    assert_eq!(table.dispatch_ip(ADDR_OPENAT, PARENT_OUTSIDE), ADDR_OPENAT);
}

#[test]
fn install_all_is_atomic_on_failure() {
    let table = FakeTable::new();
    let port = FakePort::new();
    let engine = HookEngine::new(&table, &port, CALLER_ORIGIN);

    let mut orig_a: usize = 0;
    let mut orig_b: usize = 0;
    let mut orig_c: usize = 0;
    let mut hooks = [
        FtraceHook::new(SYM_OPENAT, REPLACEMENT, &raw mut orig_a),
        FtraceHook::new("no_such_symbol", REPLACEMENT, &raw mut orig_b),
        FtraceHook::new(SYM_CLONE, REPLACEMENT, &raw mut orig_c),
    ];

    assert_eq!(engine.install_all(&mut hooks), Err(Errno::NoSym));
    // 已安装的第一个被回退到 Resolved,失败点之后的保持 Created
    assert_eq!(hooks[0].state(), HookState::Resolved);
    assert_eq!(hooks[1].state(), HookState::Created);
    assert_eq!(hooks[2].state(), HookState::Created);
    assert_eq!(table.dispatch_ip(ADDR_OPENAT, PARENT_OUTSIDE), ADDR_OPENAT);
    assert!(table.is_empty());
}

#[test]
fn install_all_then_remove_all() {
    let table = FakeTable::new();
    let port = FakePort::new();
    let engine = HookEngine::new(&table, &port, CALLER_ORIGIN);

    let mut orig_a: usize = 0;
    let mut orig_b: usize = 0;
    let mut hooks = [
        FtraceHook::new(SYM_OPENAT, REPLACEMENT, &raw mut orig_a),
        FtraceHook::new(SYM_CLONE, REPLACEMENT, &raw mut orig_b),
    ];

    assert_eq!(engine.install_all(&mut hooks), Ok(()));
    assert!(hooks.iter().all(FtraceHook::is_installed));
    assert_eq!(table.dispatch_ip(ADDR_OPENAT, PARENT_OUTSIDE), REPLACEMENT);
    assert_eq!(table.dispatch_ip(ADDR_CLONE, PARENT_OUTSIDE), REPLACEMENT);

    engine.remove_all(&mut hooks);
    assert!(hooks.iter().all(|hook| hook.state() == HookState::Removed));
    assert_eq!(table.dispatch_ip(ADDR_OPENAT, PARENT_OUTSIDE), ADDR_OPENAT);
    assert_eq!(table.dispatch_ip(ADDR_CLONE, PARENT_OUTSIDE), ADDR_CLONE);
    assert!(table.is_empty());
}

#[test]
fn records_capture_install_and_remove() {
    use crate::api::{RECORD_ITEM_ERRNO, RECORD_ITEM_OP, RECORD_ITEM_SYM_NAME};

    let table = FakeTable::new();
    let port = FakePort::new();
    let engine = HookEngine::new(&table, &port, CALLER_ORIGIN);
    engine.set_recordable(true);

    let mut orig: usize = 0;
    let mut hook = FtraceHook::new(SYM_OPENAT, REPLACEMENT, &raw mut orig);
    assert_eq!(engine.install(&mut hook), Ok(()));
    engine.remove(&mut hook);

    let mut missing = FtraceHook::new("no_such_symbol", REPLACEMENT, &raw mut orig);
    assert_eq!(engine.install(&mut missing), Err(Errno::NoSym));

    let text = engine
        .get_records(RECORD_ITEM_OP | RECORD_ITEM_SYM_NAME | RECORD_ITEM_ERRNO)
        .unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], format!("install,{SYM_OPENAT},0"));
    assert_eq!(lines[1], format!("remove,{SYM_OPENAT},0"));
    assert_eq!(
        lines[2],
        format!("install,no_such_symbol,{}", Errno::NoSym.as_i32())
    );
}
