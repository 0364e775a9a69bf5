// ==========================================
// 分组选题分配系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、名额约束接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod catalog;
pub mod ledger;
pub mod selection;
pub mod types;

// 重导出核心类型
pub use catalog::{
    AssignedGroup, Domain, Faculty, FacultyOverview, NewFaculty, NewTopic, StudentGroup, Topic,
};
pub use ledger::{CapacityConstraint, LedgerDrift, LedgerEntry};
pub use selection::{
    format_submitted_at, AllocationReceipt, AllocationRequest, NewSelection, QueueEntry,
    QueueFilter, RankedSelection, ReleaseReceipt, RequestError, Selection, SelectionPayload,
};
pub use types::{ResourceKind, SUBMITTED_AT_FORMAT};
