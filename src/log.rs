use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

// printk 风格的严重级别,数值越小越严重
pub const KERN_ERR: i32 = 3;
pub const KERN_WARNING: i32 = 4;
pub const KERN_INFO: i32 = 6;
pub const KERN_DEBUG: i32 = 7;

const LOG_TAG: &str = "kfx_hook";

// 输出阈值,级别不高于阈值的记录才写出
static LOG_LEVEL: AtomicI32 = AtomicI32::new(KERN_WARNING);

// 设置日志级别,启用时输出 DEBUG 及以上,禁用时仅输出 WARNING 及以上
pub fn set_debug_enabled(enabled: bool) {
    let level = if enabled { KERN_DEBUG } else { KERN_WARNING };
    LOG_LEVEL.store(level, Ordering::SeqCst);
}

pub fn debug_enabled() -> bool {
    LOG_LEVEL.load(Ordering::Relaxed) >= KERN_DEBUG
}

fn enabled(level: i32) -> bool {
    level <= LOG_LEVEL.load(Ordering::Relaxed)
}

fn write_log(level: i32, args: fmt::Arguments) {
    if !enabled(level) {
        return;
    }

    let line = format!("<{level}>{LOG_TAG}: {args}\n");
    let bytes = line.as_bytes();
    unsafe {
        let _ = libc::write(
            libc::STDERR_FILENO,
            bytes.as_ptr() as *const libc::c_void,
            bytes.len(),
        );
    }
}

pub(crate) fn info(args: fmt::Arguments) {
    write_log(KERN_INFO, args);
}

pub(crate) fn debug(args: fmt::Arguments) {
    write_log(KERN_DEBUG, args);
}

pub(crate) fn warn(args: fmt::Arguments) {
    write_log(KERN_WARNING, args);
}

pub(crate) fn error(args: fmt::Arguments) {
    write_log(KERN_ERR, args);
}
