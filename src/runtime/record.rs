// hook 安装/卸载审计记录的缓冲与格式化
use crate::api::{
    RECORD_ITEM_ERRNO, RECORD_ITEM_NEW_ADDR, RECORD_ITEM_OP, RECORD_ITEM_PID,
    RECORD_ITEM_SYM_NAME, RECORD_ITEM_TIMESTAMP,
};
use crate::runtime::MutexPoisonRecover;
use std::fmt::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

// 缓冲上限,超出后淘汰最早的记录
const MAX_RECORDS: usize = 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum RecordOp {
    Install,
    Remove,
}

impl RecordOp {
    fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Remove => "remove",
        }
    }
}

pub(super) struct RecordEntry {
    op: RecordOp,
    ts_ms: u64,
    pid: i32,
    status_code: i32,
    sym_name: String,
    new_addr: usize,
}

#[inline]
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

pub(super) struct RecordBuffer {
    recordable: AtomicBool,
    entries: Mutex<Vec<RecordEntry>>,
}

impl RecordBuffer {
    pub(super) fn new() -> Self {
        Self {
            recordable: AtomicBool::new(false),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn set_recordable(&self, recordable: bool) {
        self.recordable.store(recordable, Ordering::SeqCst);
    }

    pub(super) fn recordable(&self) -> bool {
        self.recordable.load(Ordering::Relaxed)
    }

    // recordable 关闭时静默丢弃,满时淘汰队首
    pub(super) fn push(&self, op: RecordOp, sym_name: &str, new_addr: usize, status_code: i32) {
        if !self.recordable() {
            return;
        }
        let entry = RecordEntry {
            op,
            ts_ms: now_ms(),
            pid: unsafe { libc::getpid() },
            status_code,
            sym_name: sym_name.to_string(),
            new_addr,
        };
        let mut entries = self.entries.lock_or_poison();
        if entries.len() >= MAX_RECORDS {
            entries.remove(0);
        }
        entries.push(entry);
    }

    // 按字段掩码导出记录文本,recordable 关闭时返回 None
    pub(super) fn format(&self, item_flags: u32) -> Option<String> {
        if !self.recordable() {
            return None;
        }
        let entries = self.entries.lock_or_poison();
        let mut out = String::new();
        for entry in entries.iter() {
            let mut fields: Vec<String> = Vec::new();
            if item_flags & RECORD_ITEM_TIMESTAMP != 0 {
                fields.push(entry.ts_ms.to_string());
            }
            if item_flags & RECORD_ITEM_PID != 0 {
                fields.push(entry.pid.to_string());
            }
            if item_flags & RECORD_ITEM_OP != 0 {
                fields.push(entry.op.as_str().to_string());
            }
            if item_flags & RECORD_ITEM_SYM_NAME != 0 {
                fields.push(entry.sym_name.clone());
            }
            if item_flags & RECORD_ITEM_NEW_ADDR != 0 {
                fields.push(format!("0x{:x}", entry.new_addr));
            }
            if item_flags & RECORD_ITEM_ERRNO != 0 {
                fields.push(entry.status_code.to_string());
            }
            let _ = writeln!(out, "{}", fields.join(","));
        }
        Some(out)
    }
}
