#![allow(unsafe_op_in_unsafe_fn)]
#![allow(clippy::missing_safety_doc)]

// 公共数据模型:hook 描述符、状态与记录掩码
mod api;
// 错误码定义
mod errno;
// 日志输出,printk 风格写入 stderr
mod log;
// 运行时:符号解析、重定向引擎、生命周期与批量安装
mod runtime;

pub use api::{
    FtraceHook, HookState, RECORD_ITEM_ALL, RECORD_ITEM_ERRNO, RECORD_ITEM_NEW_ADDR,
    RECORD_ITEM_OP, RECORD_ITEM_PID, RECORD_ITEM_SYM_NAME, RECORD_ITEM_TIMESTAMP, get_debug,
    set_debug,
};
pub use errno::Errno;
pub use runtime::{
    CallFrame, DispatchSlot, FENTRY_INSN_SIZE, HookEngine, InterceptTable, LookupPort,
    RedirectPolicy, SymbolResolver,
};
