// ==========================================
// 分组选题分配系统 - 基础目录实体
// ==========================================
// 小组 / 导师 / 研究方向 / 课题
// 这些实体由外部管理端录入，引擎只读取身份与名额
// ==========================================

use crate::domain::ledger::{CapacityConstraint, LedgerEntry};
use crate::domain::types::ResourceKind;
use serde::{Deserialize, Serialize};

/// 学生小组
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentGroup {
    pub group_id: String,
    pub leader_roll_number: Option<String>,
    pub size: i64,
}

/// 研究方向（课题所属）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub domain_id: String,
    pub name: String,
    pub description: String,
}

/// 导师（带名额账本）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faculty {
    pub faculty_id: String,
    pub name: String,
    pub email: Option<String>,
    pub capacity_max: i64,
    pub capacity_used: i64,
    pub available: bool,
}

impl Faculty {
    pub fn ledger(&self) -> LedgerEntry {
        LedgerEntry {
            kind: ResourceKind::Faculty,
            id: self.faculty_id.clone(),
            name: self.name.clone(),
            capacity_max: self.capacity_max,
            capacity_used: self.capacity_used,
            available: self.available,
        }
    }
}

impl CapacityConstraint for Faculty {
    fn capacity_max(&self) -> i64 {
        self.capacity_max
    }

    fn capacity_used(&self) -> i64 {
        self.capacity_used
    }
}

/// 课题（带名额账本，隶属唯一研究方向）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub topic_id: String,
    pub domain_id: String,
    pub name: String,
    pub description: String,
    pub capacity_max: i64,
    pub capacity_used: i64,
    pub available: bool,
}

impl Topic {
    pub fn ledger(&self) -> LedgerEntry {
        LedgerEntry {
            kind: ResourceKind::Topic,
            id: self.topic_id.clone(),
            name: self.name.clone(),
            capacity_max: self.capacity_max,
            capacity_used: self.capacity_used,
            available: self.available,
        }
    }
}

impl CapacityConstraint for Topic {
    fn capacity_max(&self) -> i64 {
        self.capacity_max
    }

    fn capacity_used(&self) -> i64 {
        self.capacity_used
    }
}

// ==========================================
// 录入参数
// ==========================================

/// 新建导师参数（capacity_max 为空时使用配置默认值）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFaculty {
    pub faculty_id: String,
    pub name: String,
    pub email: Option<String>,
    pub capacity_max: Option<i64>,
}

/// 新建课题参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTopic {
    pub topic_id: String,
    pub domain_id: String,
    pub name: String,
    pub description: String,
    pub capacity_max: Option<i64>,
}

/// 导师总览行（管理端）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacultyOverview {
    pub faculty_id: String,
    pub name: String,
    pub email: Option<String>,
    pub capacity_max: i64,
    pub capacity_used: i64,
    pub available: bool,
    pub available_slots: i64,
    pub assigned_groups: Vec<AssignedGroup>,
}

/// 导师名下的小组
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedGroup {
    pub group_id: String,
    pub domain_name: Option<String>,
    pub topic_name: Option<String>,
    pub submitted_at: String,
}
