// ==========================================
// 分组选题分配系统 - 账本行锁表
// ==========================================
// 每个 (账本类型, id) 对应一把互斥锁，按需创建、永不回收
// 约束: 调用方必须按 ResourceKind::lock_rank 顺序加锁（导师 → 课题）
// 约束: 行锁必须先于连接锁获取
// ==========================================

use crate::domain::types::ResourceKind;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// 账本行的稳定地址
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerKey {
    pub kind: ResourceKind,
    pub id: String,
}

impl LedgerKey {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// 单行锁槽
pub type LockSlot = Arc<Mutex<()>>;

/// 进程内行锁表
#[derive(Debug, Default)]
pub struct LedgerLockTable {
    slots: Mutex<HashMap<LedgerKey, LockSlot>>,
}

impl LedgerLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取得（必要时创建）某行的锁槽
    pub fn slot(&self, kind: ResourceKind, id: &str) -> LockSlot {
        let mut slots = self.slots.lock();
        slots
            .entry(LedgerKey::new(kind, id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 已创建的锁槽数量
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 在截止时间前获取锁槽
///
/// # 返回
/// - Some(guard): 已获得独占
/// - None: 超时，调用方应返回 Busy
pub fn lock_until(slot: &LockSlot, deadline: Instant) -> Option<MutexGuard<'_, ()>> {
    slot.try_lock_until(deadline)
}
