// ==========================================
// 分组选题分配系统 - 名额账本领域模型
// ==========================================
// 红线: capacity_used 只能由分配引擎在原子单元内修改
// 不变量: 0 <= capacity_used <= capacity_max
// ==========================================

use crate::domain::types::ResourceKind;
use serde::{Deserialize, Serialize};

// ==========================================
// LedgerEntry - 账本条目
// ==========================================
// 导师与课题共用同一形状，按 (kind, id) 寻址
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub kind: ResourceKind,
    pub id: String,
    pub name: String,
    pub capacity_max: i64,
    pub capacity_used: i64,
    pub available: bool,
}

/// 账本自检偏差: capacity_used 与实际选题记录数不一致
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDrift {
    pub kind: ResourceKind,
    pub id: String,
    pub capacity_used: i64,
    pub actual: i64,
}

// ==========================================
// Trait: CapacityConstraint
// ==========================================
// 用途: 分配前的名额检查接口（导师/课题/账本条目通用）
pub trait CapacityConstraint {
    /// 最大名额
    fn capacity_max(&self) -> i64;

    /// 已用名额
    fn capacity_used(&self) -> i64;

    /// 是否还能再预留一个名额
    fn can_reserve(&self) -> bool {
        self.capacity_used() < self.capacity_max()
    }

    /// 是否已满
    fn is_exhausted(&self) -> bool {
        !self.can_reserve()
    }

    /// 剩余名额（不会为负）
    fn remaining_slots(&self) -> i64 {
        (self.capacity_max() - self.capacity_used()).max(0)
    }

    /// 名额占用比例（0.0 - 1.0）
    fn fill_ratio(&self) -> f64 {
        if self.capacity_max() <= 0 {
            return 1.0;
        }
        (self.capacity_used() as f64 / self.capacity_max() as f64).clamp(0.0, 1.0)
    }
}

impl CapacityConstraint for LedgerEntry {
    fn capacity_max(&self) -> i64 {
        self.capacity_max
    }

    fn capacity_used(&self) -> i64 {
        self.capacity_used
    }
}
