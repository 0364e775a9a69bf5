// ==========================================
// 分组选题分配系统 - 选题记录领域模型
// ==========================================
// Selection 一经提交不可修改；submitted_at + seq 构成 FCFS 全序
// ==========================================

use crate::domain::types::SUBMITTED_AT_FORMAT;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==========================================
// Selection - 已提交的选题记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub seq: i64,                    // 存储插入序号（同时间戳时的决胜键）
    pub selection_id: String,
    pub group_id: String,
    pub faculty_id: String,
    pub domain_id: String,
    pub topic_id: String,
    pub submitted_at: DateTime<Utc>, // 提交时刻（微秒精度）
}

impl Selection {
    /// 毫秒精度的展示字符串
    pub fn submitted_at_display(&self) -> String {
        format_submitted_at(&self.submitted_at)
    }

    /// 排序键: (submitted_at, seq)
    pub fn order_key(&self) -> (i64, i64) {
        (self.submitted_at.timestamp_micros(), self.seq)
    }
}

pub fn format_submitted_at(ts: &DateTime<Utc>) -> String {
    ts.format(SUBMITTED_AT_FORMAT).to_string()
}

/// 待写入的选题记录（seq 由存储分配）
#[derive(Debug, Clone)]
pub struct NewSelection {
    pub selection_id: String,
    pub group_id: String,
    pub faculty_id: String,
    pub domain_id: String,
    pub topic_id: String,
    pub submitted_at: DateTime<Utc>,
}

impl NewSelection {
    pub fn into_selection(self, seq: i64) -> Selection {
        Selection {
            seq,
            selection_id: self.selection_id,
            group_id: self.group_id,
            faculty_id: self.faculty_id,
            domain_id: self.domain_id,
            topic_id: self.topic_id,
            submitted_at: self.submitted_at,
        }
    }
}

// ==========================================
// 分配请求
// ==========================================

/// 请求校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("缺少必填字段: {0}")]
    MissingField(&'static str),

    #[error("字段 {field} 非法: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// 调用方传入的原始载荷（字段可能缺失）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectionPayload {
    pub group_id: Option<String>,
    pub faculty_id: Option<String>,
    pub domain_id: Option<String>,
    pub topic_id: Option<String>,
}

/// 已校验的分配请求（四个身份均非空，已去除首尾空白）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AllocationRequest {
    group_id: String,
    faculty_id: String,
    domain_id: String,
    topic_id: String,
}

/// 身份字段最大长度
const MAX_ID_LEN: usize = 64;

fn require_id(field: &'static str, value: Option<&str>) -> Result<String, RequestError> {
    let v = value.map(str::trim).unwrap_or_default();
    if v.is_empty() {
        return Err(RequestError::MissingField(field));
    }
    if v.len() > MAX_ID_LEN {
        return Err(RequestError::InvalidField {
            field,
            reason: format!("长度超过 {} 字节", MAX_ID_LEN),
        });
    }
    if v.chars().any(char::is_control) {
        return Err(RequestError::InvalidField {
            field,
            reason: "包含控制字符".to_string(),
        });
    }
    Ok(v.to_string())
}

impl AllocationRequest {
    pub fn new(
        group_id: &str,
        faculty_id: &str,
        domain_id: &str,
        topic_id: &str,
    ) -> Result<Self, RequestError> {
        Ok(Self {
            group_id: require_id("group_id", Some(group_id))?,
            faculty_id: require_id("faculty_id", Some(faculty_id))?,
            domain_id: require_id("domain_id", Some(domain_id))?,
            topic_id: require_id("topic_id", Some(topic_id))?,
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn faculty_id(&self) -> &str {
        &self.faculty_id
    }

    pub fn domain_id(&self) -> &str {
        &self.domain_id
    }

    pub fn topic_id(&self) -> &str {
        &self.topic_id
    }
}

impl TryFrom<SelectionPayload> for AllocationRequest {
    type Error = RequestError;

    fn try_from(payload: SelectionPayload) -> Result<Self, Self::Error> {
        Ok(Self {
            group_id: require_id("group_id", payload.group_id.as_deref())?,
            faculty_id: require_id("faculty_id", payload.faculty_id.as_deref())?,
            domain_id: require_id("domain_id", payload.domain_id.as_deref())?,
            topic_id: require_id("topic_id", payload.topic_id.as_deref())?,
        })
    }
}

// ==========================================
// 分配结果
// ==========================================

/// 分配成功回执
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationReceipt {
    pub selection: Selection,
    pub submitted_at: String, // 毫秒精度字符串
    pub queue_position: i64,  // 提交时刻的全局排位快照
}

/// 释放回执（管理端撤销分配）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseReceipt {
    pub selection: Selection,
    pub faculty_used_after: i64,
    pub topic_used_after: i64,
}

// ==========================================
// 队列查询
// ==========================================

/// 队列过滤条件（各条件 AND 组合；全空 = 全局队列）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueFilter {
    pub domain_id: Option<String>,
    pub faculty_id: Option<String>,
    pub topic_id: Option<String>,
}

impl QueueFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_domain(domain_id: impl Into<String>) -> Self {
        Self {
            domain_id: Some(domain_id.into()),
            ..Self::default()
        }
    }

    pub fn by_faculty(faculty_id: impl Into<String>) -> Self {
        Self {
            faculty_id: Some(faculty_id.into()),
            ..Self::default()
        }
    }

    pub fn by_topic(topic_id: impl Into<String>) -> Self {
        Self {
            topic_id: Some(topic_id.into()),
            ..Self::default()
        }
    }

    /// 内存过滤（与存储层 WHERE 条件等价）
    pub fn matches(&self, selection: &Selection) -> bool {
        self.domain_id.as_deref().map_or(true, |d| d == selection.domain_id)
            && self.faculty_id.as_deref().map_or(true, |f| f == selection.faculty_id)
            && self.topic_id.as_deref().map_or(true, |t| t == selection.topic_id)
    }
}

/// 排位后的选题记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedSelection {
    pub position: i64,
    pub selection: Selection,
}

/// 对外队列条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub position: i64,
    pub group_id: String,
    pub submitted_at: String,
    pub faculty_name: Option<String>,
    pub domain_name: Option<String>,
    pub topic_name: Option<String>,
}
