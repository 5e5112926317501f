// 拦截表能力接口,由宿主环境实现:内核 ftrace 或测试用的进程内 fake
// 登记与注册分开对应 ftrace_set_filter_ip / register_ftrace_function 两步
use crate::errno::Errno;
use crate::runtime::engine::DispatchSlot;
use std::sync::Arc;

pub trait InterceptTable {
    // 将解析出的地址登记为该 slot 的拦截目标
    fn set_filter(&self, slot: &Arc<DispatchSlot>, address: usize) -> Result<(), Errno>;

    // 取消地址的拦截目标登记
    fn clear_filter(&self, slot: &Arc<DispatchSlot>, address: usize) -> Result<(), Errno>;

    // 注册分发 thunk,此后对目标地址的调用进入 DispatchSlot::dispatch
    fn register_thunk(&self, slot: &Arc<DispatchSlot>) -> Result<(), Errno>;

    // 注销分发 thunk
    fn unregister_thunk(&self, slot: &Arc<DispatchSlot>) -> Result<(), Errno>;
}
