// hook 操作错误码
#[repr(i32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Errno {
    InvalidArg = 1, // 参数无效:空符号名或空 original 槽
    NoSym = 2,      // 符号解析失败
    FilterReg = 3,  // 拦截目标登记失败
    ThunkReg = 4,   // 分发 thunk 注册失败
    Repeat = 5,     // hook 已安装,重复安装
}

impl Errno {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }
}

impl From<Errno> for i32 {
    fn from(value: Errno) -> Self {
        value as i32
    }
}
