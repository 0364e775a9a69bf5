// ==========================================
// 分组选题分配系统 - 提交时钟
// ==========================================
// 在原子单元内为 Selection 打 submitted_at
// 不变量: 同一时钟发出的时间戳严格递增（微秒）
// ==========================================

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// 严格单调的提交时钟
///
/// 物理时钟回拨或同一微秒内多次提交时，取 `last + 1µs`
#[derive(Debug, Default)]
pub struct CommitClock {
    last_us: AtomicI64,
}

impl CommitClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从已提交的最大时间戳续接（重启后仍保持单调）
    pub fn resume_from(last_us: Option<i64>) -> Self {
        Self {
            last_us: AtomicI64::new(last_us.unwrap_or(0)),
        }
    }

    /// 取下一个提交时间戳
    pub fn next(&self) -> DateTime<Utc> {
        self.next_after(None)
    }

    /// 取严格大于 `floor_us` 的下一个提交时间戳
    ///
    /// `floor_us` 为存储中已有的最大时间戳；其他引擎实例写入的记录
    /// 不经过本时钟，需要由调用方在提交事务内读出后传入
    pub fn next_after(&self, floor_us: Option<i64>) -> DateTime<Utc> {
        let now_us = Utc::now().timestamp_micros();
        let lower = floor_us.map_or(now_us, |floor| now_us.max(floor.saturating_add(1)));
        let issue = |last: i64| lower.max(last.saturating_add(1));
        let prev = self
            .last_us
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| Some(issue(last)))
            .unwrap_or_else(|last| last);
        DateTime::<Utc>::from_timestamp_micros(issue(prev)).unwrap_or_else(Utc::now)
    }

    /// 最近一次发出的时间戳（微秒）
    pub fn last_issued_us(&self) -> i64 {
        self.last_us.load(Ordering::Acquire)
    }
}
