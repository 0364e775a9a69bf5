// ==========================================
// 分组选题分配系统 - 领域类型定义
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 名额账本类型 (Resource Kind)
// ==========================================
// 两类账本相互独立: 导师名额 / 课题名额
// 序列化格式: SCREAMING_SNAKE_CASE (与日志/事件一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    Faculty, // 导师
    Topic,   // 课题
}

impl ResourceKind {
    /// 账本所在表名
    pub fn table(&self) -> &'static str {
        match self {
            ResourceKind::Faculty => "faculty",
            ResourceKind::Topic => "topic",
        }
    }

    /// 账本主键列名
    pub fn id_column(&self) -> &'static str {
        match self {
            ResourceKind::Faculty => "faculty_id",
            ResourceKind::Topic => "topic_id",
        }
    }

    /// 实体名（用于错误信息）
    pub fn entity_name(&self) -> &'static str {
        match self {
            ResourceKind::Faculty => "Faculty",
            ResourceKind::Topic => "Topic",
        }
    }

    /// 加锁顺序: 导师在前，课题在后
    pub fn lock_rank(&self) -> u8 {
        match self {
            ResourceKind::Faculty => 0,
            ResourceKind::Topic => 1,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Faculty => write!(f, "FACULTY"),
            ResourceKind::Topic => write!(f, "TOPIC"),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "FACULTY" => Ok(ResourceKind::Faculty),
            "TOPIC" => Ok(ResourceKind::Topic),
            other => Err(format!("未知的账本类型: {}", other)),
        }
    }
}

// ==========================================
// 时间戳格式
// ==========================================

/// 对外展示的提交时间格式（毫秒精度）
pub const SUBMITTED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_roundtrip_and_order() {
        assert_eq!("faculty".parse::<ResourceKind>().unwrap(), ResourceKind::Faculty);
        assert_eq!(ResourceKind::Topic.to_string(), "TOPIC");
        assert!("room".parse::<ResourceKind>().is_err());
        assert!(ResourceKind::Faculty.lock_rank() < ResourceKind::Topic.lock_rank());
    }
}
