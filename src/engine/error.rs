// ==========================================
// 分组选题分配系统 - 分配引擎错误类型
// ==========================================
// 每个被拒绝的请求都返回可机器识别的错误种类
// 名额类错误携带 current/max，调用方无需二次查询
// ==========================================

use crate::domain::selection::RequestError;
use crate::repository::error::RepositoryError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 错误种类（对外的机器可读代码）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationErrorKind {
    InvalidRequest,
    NotFound,
    AlreadyAssigned,
    FacultyFull,
    TopicFull,
    Conflict,
    Busy,
    Internal,
}

impl AllocationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationErrorKind::InvalidRequest => "INVALID_REQUEST",
            AllocationErrorKind::NotFound => "NOT_FOUND",
            AllocationErrorKind::AlreadyAssigned => "ALREADY_ASSIGNED",
            AllocationErrorKind::FacultyFull => "FACULTY_FULL",
            AllocationErrorKind::TopicFull => "TOPIC_FULL",
            AllocationErrorKind::Conflict => "CONFLICT",
            AllocationErrorKind::Busy => "BUSY",
            AllocationErrorKind::Internal => "INTERNAL",
        }
    }
}

/// 分配引擎错误
#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("请求无效: {0}")]
    InvalidRequest(String),

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("小组已有选题记录: group_id={group_id}")]
    AlreadyAssigned { group_id: String },

    #[error("导师名额已满: faculty_id={faculty_id}, current={current}, max={max}")]
    FacultyFull {
        faculty_id: String,
        current: i64,
        max: i64,
    },

    #[error("课题名额已满: topic_id={topic_id}, current={current}, max={max}")]
    TopicFull {
        topic_id: String,
        current: i64,
        max: i64,
    },

    /// 进程内检查通过，但在存储唯一约束处输给了并发提交
    #[error("并发提交冲突: group_id={group_id} 已被其他提交占用")]
    Conflict { group_id: String },

    /// 等待行锁超时；未修改任何状态，可重试
    #[error("资源繁忙: {resource} 等待 {waited_ms}ms 未获得行锁")]
    Busy { resource: String, waited_ms: u64 },

    /// SQLite 在 busy_timeout 内未拿到写锁；事务未提交，可重试
    #[error("数据库繁忙: {0}")]
    DatabaseBusy(String),

    /// 提交中途的存储异常；原子单元已整体回滚，可重试
    #[error("内部错误: {0}")]
    Internal(String),
}

impl AllocationError {
    pub fn kind(&self) -> AllocationErrorKind {
        match self {
            AllocationError::InvalidRequest(_) => AllocationErrorKind::InvalidRequest,
            AllocationError::NotFound { .. } => AllocationErrorKind::NotFound,
            AllocationError::AlreadyAssigned { .. } => AllocationErrorKind::AlreadyAssigned,
            AllocationError::FacultyFull { .. } => AllocationErrorKind::FacultyFull,
            AllocationError::TopicFull { .. } => AllocationErrorKind::TopicFull,
            AllocationError::Conflict { .. } => AllocationErrorKind::Conflict,
            AllocationError::Busy { .. } | AllocationError::DatabaseBusy(_) => {
                AllocationErrorKind::Busy
            }
            AllocationError::Internal(_) => AllocationErrorKind::Internal,
        }
    }

    /// 重试是否可能改变结果
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AllocationError::Busy { .. }
                | AllocationError::DatabaseBusy(_)
                | AllocationError::Internal(_)
        )
    }

    /// 调用方视角下是否等同于“已分配”
    pub fn is_already_assigned(&self) -> bool {
        matches!(
            self,
            AllocationError::AlreadyAssigned { .. } | AllocationError::Conflict { .. }
        )
    }

    pub(crate) fn not_found(entity: &str, id: &str) -> Self {
        AllocationError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<RequestError> for AllocationError {
    fn from(err: RequestError) -> Self {
        AllocationError::InvalidRequest(err.to_string())
    }
}

// 唯一约束冲突由引擎按上下文转换为 Conflict，这里只做通用映射
impl From<RepositoryError> for AllocationError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => AllocationError::NotFound { entity, id },
            RepositoryError::Busy(msg) => AllocationError::DatabaseBusy(msg),
            other => AllocationError::Internal(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type AllocationResult<T> = Result<T, AllocationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_retryable() {
        let busy = AllocationError::Busy {
            resource: "FACULTY:F1".to_string(),
            waited_ms: 10,
        };
        assert_eq!(busy.kind().as_str(), "BUSY");
        assert!(busy.is_retryable());

        let full = AllocationError::TopicFull {
            topic_id: "T1".to_string(),
            current: 3,
            max: 3,
        };
        assert!(!full.is_retryable());
        assert_eq!(full.to_string(), "课题名额已满: topic_id=T1, current=3, max=3");
    }

    #[test]
    fn test_database_busy_maps_to_busy_kind() {
        let err: AllocationError = RepositoryError::Busy("database is locked".to_string()).into();
        assert!(matches!(err, AllocationError::DatabaseBusy(ref msg) if msg == "database is locked"));
        assert_eq!(err.kind(), AllocationErrorKind::Busy);
        assert!(err.is_retryable());
        assert!(!err.to_string().contains("ms"), "未测量的等待时长不应出现在消息中");

        let err: AllocationError =
            RepositoryError::DatabaseQueryError("disk I/O error".to_string()).into();
        assert_eq!(err.kind(), AllocationErrorKind::Internal);
    }

    #[test]
    fn test_conflict_reads_as_already_assigned() {
        let err = AllocationError::Conflict {
            group_id: "G1".to_string(),
        };
        assert!(err.is_already_assigned());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&AllocationErrorKind::AlreadyAssigned).unwrap();
        assert_eq!(json, "\"ALREADY_ASSIGNED\"");
    }
}
