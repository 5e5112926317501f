// 批量安装与卸载:install_all 全或无,remove_all 尽力而为
use crate::api::FtraceHook;
use crate::errno::Errno;
use crate::log;

use super::lifecycle::HookEngine;

impl<'k> HookEngine<'k> {
    // 按序安装,第 k 个失败时逆序回退已安装的前 k-1 个并返回触发错误
    // 调用期间批次内的描述符必须由调用方独占
    pub fn install_all(&self, hooks: &mut [FtraceHook]) -> Result<(), Errno> {
        for idx in 0..hooks.len() {
            if let Err(err) = self.install(&mut hooks[idx]) {
                log::warn(format_args!(
                    "install_all failed at {}: {:?}, rolling back {} hooks",
                    hooks[idx].name(),
                    err,
                    idx
                ));
                for prev in hooks[..idx].iter_mut().rev() {
                    self.rollback(prev);
                }
                return Err(err);
            }
        }
        log::info(format_args!("installed {} hooks", hooks.len()));
        Ok(())
    }

    // 无条件卸载全部,个别失败不中断也不产生聚合错误
    pub fn remove_all(&self, hooks: &mut [FtraceHook]) {
        for hook in hooks.iter_mut() {
            self.remove(hook);
        }
    }
}
