// 公共数据模型:hook 描述符与生命周期状态
use crate::runtime::DispatchSlot;
use std::sync::Arc;

// hook 生命周期状态机:Created -> Resolved -> Installed -> Removed
// remove 会复位解析结果,Removed 的 hook 允许重新安装
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HookState {
    Created,
    Resolved,
    Installed,
    Removed,
}

// 审计记录字段掩码
pub const RECORD_ITEM_ALL: u32 = 0xFF;
pub const RECORD_ITEM_TIMESTAMP: u32 = 1 << 0;
pub const RECORD_ITEM_PID: u32 = 1 << 1;
pub const RECORD_ITEM_OP: u32 = 1 << 2;
pub const RECORD_ITEM_SYM_NAME: u32 = 1 << 3;
pub const RECORD_ITEM_NEW_ADDR: u32 = 1 << 4;
pub const RECORD_ITEM_ERRNO: u32 = 1 << 5;

// hook 描述符,存储由调用方持有,本库只在 install/remove 期间可变借用
// original 指向调用方自有的槽,解析成功后写入可抵达原函数的地址
// 该指针必须在 install 到 remove 的整个区间内有效,期间不得移动或释放
pub struct FtraceHook {
    pub(crate) name: String,
    pub(crate) replacement: usize,
    pub(crate) original: *mut usize,
    pub(crate) address: usize,
    pub(crate) slot: Option<Arc<DispatchSlot>>,
    pub(crate) state: HookState,
}

impl FtraceHook {
    pub fn new(name: &str, replacement: usize, original: *mut usize) -> Self {
        Self {
            name: name.to_string(),
            replacement,
            original,
            address: 0,
            slot: None,
            state: HookState::Created,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn replacement(&self) -> usize {
        self.replacement
    }

    // 解析出的运行时地址,未解析时为 0
    pub fn address(&self) -> usize {
        self.address
    }

    pub fn state(&self) -> HookState {
        self.state
    }

    pub fn is_installed(&self) -> bool {
        self.state == HookState::Installed
    }
}

pub fn set_debug(debug: bool) {
    crate::log::set_debug_enabled(debug);
}

pub fn get_debug() -> bool {
    crate::log::debug_enabled()
}
