// ==========================================
// 分组选题分配系统 - 引擎层事件发布
// ==========================================
// 职责: 定义分配事件发布 trait，引擎只依赖 trait
// 约束: 事件只在事务提交之后发布；发布失败不影响已提交结果
// ==========================================

use crate::domain::types::ResourceKind;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 分配事件类型
// ==========================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationEventType {
    /// 选题记录已提交
    SelectionCommitted,
    /// 选题记录已释放（管理端撤销）
    SelectionReleased,
    /// 某账本名额用尽
    LedgerExhausted,
}

impl AllocationEventType {
    pub fn as_str(&self) -> &str {
        match self {
            AllocationEventType::SelectionCommitted => "SelectionCommitted",
            AllocationEventType::SelectionReleased => "SelectionReleased",
            AllocationEventType::LedgerExhausted => "LedgerExhausted",
        }
    }
}

/// 分配事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationEvent {
    pub event_type: AllocationEventType,
    /// 相关小组（LedgerExhausted 时为触发用尽的小组）
    pub group_id: String,
    /// 相关账本（仅 LedgerExhausted）
    pub ledger: Option<(ResourceKind, String)>,
    /// 提交时间（毫秒精度字符串）
    pub submitted_at: String,
    /// 提交时的全局排位（仅 SelectionCommitted）
    pub queue_position: Option<i64>,
}

impl AllocationEvent {
    pub fn committed(group_id: &str, submitted_at: &str, queue_position: i64) -> Self {
        Self {
            event_type: AllocationEventType::SelectionCommitted,
            group_id: group_id.to_string(),
            ledger: None,
            submitted_at: submitted_at.to_string(),
            queue_position: Some(queue_position),
        }
    }

    pub fn released(group_id: &str, submitted_at: &str) -> Self {
        Self {
            event_type: AllocationEventType::SelectionReleased,
            group_id: group_id.to_string(),
            ledger: None,
            submitted_at: submitted_at.to_string(),
            queue_position: None,
        }
    }

    pub fn exhausted(kind: ResourceKind, id: &str, group_id: &str, submitted_at: &str) -> Self {
        Self {
            event_type: AllocationEventType::LedgerExhausted,
            group_id: group_id.to_string(),
            ledger: Some((kind, id.to_string())),
            submitted_at: submitted_at.to_string(),
            queue_position: None,
        }
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 分配事件发布者 Trait
///
/// # 实现说明
/// - 在引擎的提交线程上同步调用，实现应尽快返回
/// - 返回的字符串为下游任务 ID（不支持时返回空串）
pub trait AllocationEventPublisher: Send + Sync {
    fn publish(&self, event: AllocationEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl AllocationEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: AllocationEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - group_id={}, event_type={}",
            event.group_id,
            event.event_type.as_str()
        );
        Ok(String::new())
    }
}

/// 可选的事件发布者包装
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn AllocationEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn AllocationEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件（如果有发布者）
    pub fn publish(&self, event: AllocationEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        match &self.inner {
            Some(publisher) => publisher.publish(event),
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者，跳过事件 - group_id={}, event_type={}",
                    event.group_id,
                    event.event_type.as_str()
                );
                Ok(String::new())
            }
        }
    }

    /// 提交后发布；失败只记日志
    pub fn publish_after_commit(&self, event: AllocationEvent) {
        let event_type = event.event_type.clone();
        if let Err(e) = self.publish(event) {
            tracing::warn!("事件发布失败（结果已提交）: event_type={}, error={}", event_type.as_str(), e);
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}
