// 重定向引擎:每个 hook 的分发记录与分发 thunk
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// x86_64 函数入口处 call __fentry__ 指令的长度
pub const FENTRY_INSN_SIZE: usize = 5;

// 防递归策略,引擎构造时一次性选定,不按调用分支
// CallerOrigin: original 槽指向函数入口,分发时检查调用方返回地址是否落在 owner 模块内
// EntryOffset: original 槽跳过插桩点,经槽调用原函数不再进入分发,无需运行时检查
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RedirectPolicy {
    CallerOrigin { owner_start: usize, owner_end: usize },
    EntryOffset,
}

// 分发时捕获的调用上下文
// ip 为即将执行的指令地址,parent_ip 为调用方的返回地址
#[derive(Clone, Copy, Debug)]
pub struct CallFrame {
    pub ip: usize,
    pub parent_ip: usize,
}

// 每个 hook 的分发记录,live 为重定向生效标志
// live 以 Release 发布、Acquire 读取,original 槽的写入先于发布,
// 任何观察到重定向的调用方必然也观察到已就绪的 original 槽
pub struct DispatchSlot {
    replacement: usize,
    policy: RedirectPolicy,
    live: AtomicBool,
}

impl DispatchSlot {
    pub(crate) fn new(replacement: usize, policy: RedirectPolicy) -> Arc<Self> {
        Arc::new(Self {
            replacement,
            policy,
            live: AtomicBool::new(false),
        })
    }

    // 分发 thunk:在拦截调用的执行上下文内同步运行,无锁、不阻塞、可重入
    pub fn dispatch(&self, frame: &mut CallFrame) {
        if !self.live.load(Ordering::Acquire) {
            return;
        }
        match self.policy {
            // 返回地址检查依赖完整栈帧,replacement 回调原函数的调用
            // 不得被尾调用优化省略调用方栈帧
            RedirectPolicy::CallerOrigin {
                owner_start,
                owner_end,
            } => {
                if frame.parent_ip < owner_start || frame.parent_ip >= owner_end {
                    frame.ip = self.replacement;
                }
            }
            RedirectPolicy::EntryOffset => {
                frame.ip = self.replacement;
            }
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn replacement(&self) -> usize {
        self.replacement
    }

    pub(crate) fn publish(&self) {
        self.live.store(true, Ordering::Release);
    }

    pub(crate) fn retract(&self) {
        self.live.store(false, Ordering::Release);
    }
}
