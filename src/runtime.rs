// runtime 模块入口,统一导出各子模块的公共类型
mod batch;
mod engine;
mod lifecycle;
mod record;
mod resolver;
mod state;
mod table;

pub use engine::{CallFrame, DispatchSlot, FENTRY_INSN_SIZE, RedirectPolicy};
pub use lifecycle::HookEngine;
pub use resolver::{LookupPort, SymbolResolver};
pub use table::InterceptTable;

pub(crate) use state::MutexPoisonRecover;
