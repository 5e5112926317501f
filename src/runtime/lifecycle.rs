// hook 生命周期:解析 -> 登记拦截目标 -> 发布分发 -> (之后) 注销
use crate::api::{FtraceHook, HookState};
use crate::errno::Errno;
use crate::log;
use std::ptr;
use std::sync::Arc;

use super::engine::{DispatchSlot, FENTRY_INSN_SIZE, RedirectPolicy};
use super::record::{RecordBuffer, RecordOp};
use super::resolver::{LookupPort, SymbolResolver};
use super::table::InterceptTable;

#[cfg(test)]
mod tests;

// hook 引擎:持有拦截表与查询端口能力,防递归策略构造时一次性选定
// 引擎从不持有描述符,install/remove 期间可变借用调用方的存储
pub struct HookEngine<'k> {
    table: &'k dyn InterceptTable,
    resolver: SymbolResolver<'k>,
    policy: RedirectPolicy,
    records: RecordBuffer,
}

impl<'k> HookEngine<'k> {
    pub fn new(
        table: &'k dyn InterceptTable,
        port: &'k dyn LookupPort,
        policy: RedirectPolicy,
    ) -> Self {
        Self {
            table,
            resolver: SymbolResolver::new(port),
            policy,
            records: RecordBuffer::new(),
        }
    }

    pub fn policy(&self) -> RedirectPolicy {
        self.policy
    }

    // 导出符号查询能力
    pub fn lookup(&self, name: &str) -> Result<usize, Errno> {
        self.resolver.resolve(name)
    }

    // 解析地址并写入 original 槽,失败时 hook 停留在 Created
    // original 槽在 hook 发布前就绪,replacement 安装后立刻回调也能抵达原函数
    pub fn resolve_address(&self, hook: &mut FtraceHook) -> Result<(), Errno> {
        if hook.original.is_null() {
            return Err(Errno::InvalidArg);
        }
        let address = self.resolver.resolve(&hook.name)?;
        hook.address = address;

        let original = match self.policy {
            RedirectPolicy::CallerOrigin { .. } => address,
            RedirectPolicy::EntryOffset => address + FENTRY_INSN_SIZE,
        };
        unsafe {
            ptr::write(hook.original, original);
        }
        hook.state = HookState::Resolved;
        Ok(())
    }

    // 安装:任一步骤失败时回退本 hook 已完成的步骤,不留下半安装状态
    pub fn install(&self, hook: &mut FtraceHook) -> Result<(), Errno> {
        match hook.state {
            HookState::Installed => return Err(Errno::Repeat),
            // remove 已复位解析结果,Removed 按 Created 重新解析
            HookState::Created | HookState::Removed => {
                if let Err(err) = self.resolve_address(hook) {
                    self.records
                        .push(RecordOp::Install, &hook.name, hook.replacement, err.as_i32());
                    return Err(err);
                }
            }
            HookState::Resolved => {}
        }

        let slot = DispatchSlot::new(hook.replacement, self.policy);
        if let Err(err) = self.table.set_filter(&slot, hook.address) {
            log::warn(format_args!("set_filter failed for {}: {:?}", hook.name, err));
            self.records
                .push(RecordOp::Install, &hook.name, hook.replacement, err.as_i32());
            return Err(err);
        }

        // 先以原子方式发布 live 标志,拦截表开始路由的瞬间 slot 已完整可见
        slot.publish();
        if let Err(err) = self.table.register_thunk(&slot) {
            slot.retract();
            if let Err(undo) = self.table.clear_filter(&slot, hook.address) {
                log::error(format_args!(
                    "clear_filter during undo failed for {}: {:?}",
                    hook.name, undo
                ));
            }
            log::warn(format_args!(
                "register_thunk failed for {}: {:?}",
                hook.name, err
            ));
            self.records
                .push(RecordOp::Install, &hook.name, hook.replacement, err.as_i32());
            return Err(err);
        }

        hook.slot = Some(slot);
        hook.state = HookState::Installed;
        log::debug(format_args!(
            "installed {} at 0x{:x}",
            hook.name, hook.address
        ));
        self.records
            .push(RecordOp::Install, &hook.name, hook.replacement, 0);
        Ok(())
    }

    // 卸载:两步独立尝试,失败只记日志不上抛,主要在 teardown 路径调用
    // 对未安装或已卸载的 hook 幂等
    pub fn remove(&self, hook: &mut FtraceHook) {
        let Some(slot) = hook.slot.take() else {
            return;
        };
        let status = self.teardown(&slot, hook);
        self.records
            .push(RecordOp::Remove, &hook.name, hook.replacement, status);

        // 复位解析结果,Removed 的 hook 可重新安装
        hook.address = 0;
        hook.state = HookState::Removed;
    }

    // 批量失败回退:卸载但保留解析结果,hook 回到 Resolved
    pub(super) fn rollback(&self, hook: &mut FtraceHook) {
        let Some(slot) = hook.slot.take() else {
            return;
        };
        let _ = self.teardown(&slot, hook);
        hook.state = HookState::Resolved;
    }

    // 先注销 thunk 阻断分发,再撤下 live 标志并清除拦截目标登记
    // 返回首个失败步骤的错误码,仅用于审计记录
    fn teardown(&self, slot: &Arc<DispatchSlot>, hook: &FtraceHook) -> i32 {
        let mut status = 0;
        if let Err(err) = self.table.unregister_thunk(slot) {
            log::warn(format_args!(
                "unregister_thunk failed for {}: {:?}",
                hook.name, err
            ));
            status = err.as_i32();
        }
        slot.retract();
        if let Err(err) = self.table.clear_filter(slot, hook.address) {
            log::warn(format_args!(
                "clear_filter failed for {}: {:?}",
                hook.name, err
            ));
            if status == 0 {
                status = err.as_i32();
            }
        }
        status
    }

    pub fn set_recordable(&self, recordable: bool) {
        self.records.set_recordable(recordable);
    }

    pub fn get_recordable(&self) -> bool {
        self.records.recordable()
    }

    // 按字段掩码导出审计记录,recordable 关闭时返回 None
    pub fn get_records(&self, item_flags: u32) -> Option<String> {
        self.records.format(item_flags)
    }
}
