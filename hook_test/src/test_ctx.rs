// 进程内模拟的宿主内核:符号表、拦截表与调用模拟
use kfx_hook::{
    CallFrame, DispatchSlot, Errno, FENTRY_INSN_SIZE, InterceptTable, LookupPort, RedirectPolicy,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// hook 宿主模块的地址范围,replacement 回调原函数时使用范围内的返回地址
pub const OWNER_START: usize = 0x4000_0000;
pub const OWNER_END: usize = 0x4001_0000;
pub const PARENT_INSIDE: usize = OWNER_START + 0x10;
pub const PARENT_OUTSIDE: usize = 0x1234;

const LOOKUP_ROUTINE_ADDR: usize = 0x6000_0000;
const TEXT_BASE: usize = 0x8000_0000;
const TEXT_STRIDE: usize = 0x100;

pub fn caller_origin() -> RedirectPolicy {
    RedirectPolicy::CallerOrigin {
        owner_start: OWNER_START,
        owner_end: OWNER_END,
    }
}

// 模拟函数体:接收内核引用与单个参数
pub type BodyFn = fn(&FakeKernel, usize) -> usize;

// original 槽与调用计数,每个场景开始前复位
pub static ORIG_A: AtomicUsize = AtomicUsize::new(0);
pub static ORIG_B: AtomicUsize = AtomicUsize::new(0);
pub static ORIG_CALLS_A: AtomicUsize = AtomicUsize::new(0);
pub static ORIG_CALLS_B: AtomicUsize = AtomicUsize::new(0);
pub static REPL_CALLS_A: AtomicUsize = AtomicUsize::new(0);
pub static REPL_CALLS_B: AtomicUsize = AtomicUsize::new(0);

pub fn reset() {
    ORIG_A.store(0, Ordering::SeqCst);
    ORIG_B.store(0, Ordering::SeqCst);
    ORIG_CALLS_A.store(0, Ordering::SeqCst);
    ORIG_CALLS_B.store(0, Ordering::SeqCst);
    REPL_CALLS_A.store(0, Ordering::SeqCst);
    REPL_CALLS_B.store(0, Ordering::SeqCst);
}

pub fn body_a(_kernel: &FakeKernel, arg: usize) -> usize {
    ORIG_CALLS_A.fetch_add(1, Ordering::Relaxed);
    arg + 1
}

pub fn body_b(_kernel: &FakeKernel, arg: usize) -> usize {
    ORIG_CALLS_B.fetch_add(1, Ordering::Relaxed);
    arg + 2
}

// replacement:经 original 槽回调原函数,再对结果加 100
// black_box 固定栈帧,回调不得被尾调用优化省略返回地址
pub fn repl_a(kernel: &FakeKernel, arg: usize) -> usize {
    REPL_CALLS_A.fetch_add(1, Ordering::Relaxed);
    let orig = ORIG_A.load(Ordering::Acquire);
    let ret = std::hint::black_box(kernel.call_from(orig, PARENT_INSIDE, arg));
    ret + 100
}

pub fn repl_b(kernel: &FakeKernel, arg: usize) -> usize {
    REPL_CALLS_B.fetch_add(1, Ordering::Relaxed);
    let orig = ORIG_B.load(Ordering::Acquire);
    let ret = std::hint::black_box(kernel.call_from(orig, PARENT_INSIDE, arg));
    ret + 200
}

// replacement:不回调原函数,直接接管
pub fn repl_takeover(_kernel: &FakeKernel, arg: usize) -> usize {
    REPL_CALLS_A.fetch_add(1, Ordering::Relaxed);
    arg * 10
}

pub struct FakeKernel {
    // 是否隐藏导出的符号查询例程,隐藏时解析器必须走探针路径
    hidden_lookup: bool,
    probe_count: AtomicUsize,
    next_addr: AtomicUsize,
    symbols: Mutex<HashMap<String, usize>>,
    bodies: Mutex<HashMap<usize, BodyFn>>,
    filters: Mutex<HashMap<usize, Arc<DispatchSlot>>>,
    thunks: Mutex<Vec<Arc<DispatchSlot>>>,
    fail_thunk: AtomicBool,
}

impl FakeKernel {
    pub fn new(hidden_lookup: bool) -> Self {
        Self {
            hidden_lookup,
            probe_count: AtomicUsize::new(0),
            next_addr: AtomicUsize::new(TEXT_BASE),
            symbols: Mutex::new(HashMap::new()),
            bodies: Mutex::new(HashMap::new()),
            filters: Mutex::new(HashMap::new()),
            thunks: Mutex::new(Vec::new()),
            fail_thunk: AtomicBool::new(false),
        }
    }

    // 注册一个带符号的内核函数,入口与偏移入口映射到同一函数体
    pub fn add_symbol(&self, name: &str, body: BodyFn) -> usize {
        let address = self.next_addr.fetch_add(TEXT_STRIDE, Ordering::Relaxed);
        self.symbols.lock().unwrap().insert(name.to_string(), address);
        let mut bodies = self.bodies.lock().unwrap();
        bodies.insert(address, body);
        bodies.insert(address + FENTRY_INSN_SIZE, body);
        address
    }

    // 注册一个 replacement 函数体,只分配地址不进符号表
    pub fn add_replacement(&self, body: BodyFn) -> usize {
        let address = self.next_addr.fetch_add(TEXT_STRIDE, Ordering::Relaxed);
        self.bodies.lock().unwrap().insert(address, body);
        address
    }

    pub fn symbol_addr(&self, name: &str) -> usize {
        self.symbols.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn probe_count(&self) -> usize {
        self.probe_count.load(Ordering::Relaxed)
    }

    pub fn set_fail_thunk(&self, fail: bool) {
        self.fail_thunk.store(fail, Ordering::SeqCst);
    }

    pub fn interception_active(&self) -> bool {
        !self.filters.lock().unwrap().is_empty() || !self.thunks.lock().unwrap().is_empty()
    }

    fn routed_slot(&self, address: usize) -> Option<Arc<DispatchSlot>> {
        let slot = self.filters.lock().unwrap().get(&address).cloned()?;
        let registered = self
            .thunks
            .lock()
            .unwrap()
            .iter()
            .any(|thunk| Arc::ptr_eq(thunk, &slot));
        registered.then_some(slot)
    }

    // 模拟一次对 address 的调用:命中拦截登记时先经分发 thunk 决定实际目标
    pub fn call_from(&self, address: usize, parent_ip: usize, arg: usize) -> usize {
        let mut frame = CallFrame {
            ip: address,
            parent_ip,
        };
        if let Some(slot) = self.routed_slot(address) {
            slot.dispatch(&mut frame);
        }
        let body = {
            let bodies = self.bodies.lock().unwrap();
            bodies
                .get(&frame.ip)
                .copied()
                .unwrap_or_else(|| panic!("call to unmapped address 0x{:x}", frame.ip))
        };
        body(self, arg)
    }

    pub fn call_symbol(&self, name: &str, parent_ip: usize, arg: usize) -> usize {
        let address = self.symbol_addr(name);
        assert_ne!(address, 0, "unknown symbol {name}");
        self.call_from(address, parent_ip, arg)
    }
}

impl LookupPort for FakeKernel {
    fn has_exported_lookup(&self) -> bool {
        !self.hidden_lookup
    }

    fn exported_lookup(&self, name: &str) -> usize {
        self.symbol_addr(name)
    }

    fn probe_lookup_routine(&self) -> usize {
        self.probe_count.fetch_add(1, Ordering::Relaxed);
        LOOKUP_ROUTINE_ADDR
    }

    fn indirect_lookup(&self, routine: usize, name: &str) -> usize {
        assert_eq!(routine, LOOKUP_ROUTINE_ADDR);
        self.symbol_addr(name)
    }
}

impl InterceptTable for FakeKernel {
    fn set_filter(&self, slot: &Arc<DispatchSlot>, address: usize) -> Result<(), Errno> {
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
        assert!(slot.is_live(), "thunk registered before slot went live");
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
