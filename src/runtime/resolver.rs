// 符号解析器:直接查询与经瞬态探针间接查询两种策略,透明选择
use crate::errno::Errno;
use crate::log;
use once_cell::sync::OnceCell;

// 宿主环境的符号查询端口,返回 0 表示失败或未找到
pub trait LookupPort {
    // 查询例程是否仍被环境直接导出
    fn has_exported_lookup(&self) -> bool;

    // 直接调用导出的查询例程
    fn exported_lookup(&self, name: &str) -> usize;

    // 在查询例程自身入口挂一次性探针,取其地址后立即摘除
    fn probe_lookup_routine(&self) -> usize;

    // 以 routine 地址间接调用查询例程
    fn indirect_lookup(&self, routine: usize, name: &str) -> usize;
}

pub struct SymbolResolver<'k> {
    port: &'k dyn LookupPort,
    // 间接策略下查询例程地址只探测一次,之后始终走缓存
    routine: OnceCell<usize>,
}

impl<'k> SymbolResolver<'k> {
    pub fn new(port: &'k dyn LookupPort) -> Self {
        Self {
            port,
            routine: OnceCell::new(),
        }
    }

    // 解析符号地址,两种策略都失败时返回 NoSym
    // 解析失败只使当前 hook 安装失败,对进程无害
    pub fn resolve(&self, name: &str) -> Result<usize, Errno> {
        if name.is_empty() {
            return Err(Errno::InvalidArg);
        }

        let address = if self.port.has_exported_lookup() {
            self.port.exported_lookup(name)
        } else {
            let routine = self
                .routine
                .get_or_try_init(|| match self.port.probe_lookup_routine() {
                    0 => Err(Errno::NoSym),
                    addr => Ok(addr),
                })?;
            self.port.indirect_lookup(*routine, name)
        };

        if address == 0 {
            log::debug(format_args!("unresolved symbol: {name}"));
            return Err(Errno::NoSym);
        }
        Ok(address)
    }
}
