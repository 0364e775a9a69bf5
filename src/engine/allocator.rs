// ==========================================
// 分组选题分配系统 - 分配引擎
// ==========================================
// 职责: 先到先得地为小组分配 (导师, 课题)，并维护两类名额账本
// 输入: 已校验的 AllocationRequest
// 输出: AllocationReceipt（选题记录 + 提交时排位）或 AllocationError
// ==========================================
// 红线: 账本只由本引擎写入
// 红线: 行锁顺序固定为 导师 → 课题，且先于连接锁获取
// 红线: 复查、打时间戳、写记录、扣名额在同一事务内完成；任一步失败整体回滚
// ==========================================

use crate::config::allocation_config::AllocationConfig;
use crate::domain::catalog::{Faculty, Topic};
use crate::domain::ledger::{CapacityConstraint, LedgerEntry};
use crate::domain::selection::{
    AllocationReceipt, AllocationRequest, NewSelection, QueueFilter, ReleaseReceipt, Selection,
};
use crate::domain::types::ResourceKind;
use crate::engine::clock::CommitClock;
use crate::engine::error::{AllocationError, AllocationResult};
use crate::engine::events::{AllocationEvent, AllocationEventPublisher, OptionalEventPublisher};
use crate::engine::lock_table::{lock_until, LedgerLockTable, LockSlot};
use crate::perf::PerfGuard;
use crate::repository::catalog_repo::CatalogRepository;
use crate::repository::error::RepositoryError;
use crate::repository::ledger_repo::LedgerRepository;
use crate::repository::selection_repo::SelectionRepository;
use parking_lot::MutexGuard;
use rusqlite::{Connection, TransactionBehavior};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::instrument;
use uuid::Uuid;

/// 事务内提交结果（事务外用于发布事件）
struct CommitOutcome {
    receipt: AllocationReceipt,
    exhausted: Vec<(ResourceKind, String)>,
}

// ==========================================
// AllocationEngine - 分配引擎
// ==========================================
pub struct AllocationEngine {
    conn: Arc<Mutex<Connection>>,
    catalog: CatalogRepository,
    selections: SelectionRepository,
    locks: Arc<LedgerLockTable>,
    clock: CommitClock,
    lock_timeout: Duration,
    events: OptionalEventPublisher,
}

impl AllocationEngine {
    /// 创建分配引擎
    ///
    /// # 参数
    /// - conn: 共享数据库连接（schema 已就绪）
    /// - config: 分配配置（行锁超时）
    ///
    /// 提交时钟从已提交记录的最大时间戳续接
    pub fn new(conn: Arc<Mutex<Connection>>, config: &AllocationConfig) -> AllocationResult<Self> {
        let selections = SelectionRepository::new(conn.clone());
        let last_us = selections.max_submitted_at_us()?;

        Ok(Self {
            catalog: CatalogRepository::new(conn.clone()),
            selections,
            conn,
            locks: Arc::new(LedgerLockTable::new()),
            clock: CommitClock::resume_from(last_us),
            lock_timeout: config.lock_timeout(),
            events: OptionalEventPublisher::none(),
        })
    }

    /// 挂接事件发布者
    pub fn with_event_publisher(mut self, publisher: Arc<dyn AllocationEventPublisher>) -> Self {
        self.events = OptionalEventPublisher::with_publisher(publisher);
        self
    }

    /// 共享外部行锁表（同一连接上的多个引擎实例）
    pub fn with_lock_table(mut self, locks: Arc<LedgerLockTable>) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> &Arc<LedgerLockTable> {
        &self.locks
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    fn get_conn(&self) -> AllocationResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AllocationError::Internal(format!("连接锁获取失败: {}", e)))
    }

    // ==========================================
    // Allocate
    // ==========================================

    /// 为小组分配 (导师, 课题)
    ///
    /// 校验顺序固定: 存在性 → 已分配 → 导师名额 → 课题名额
    #[instrument(skip(self, request), fields(
        group_id = %request.group_id(),
        faculty_id = %request.faculty_id(),
        topic_id = %request.topic_id()
    ))]
    pub fn allocate(&self, request: &AllocationRequest) -> AllocationResult<AllocationReceipt> {
        let _perf = PerfGuard::new("engine.allocate");

        let (faculty, topic) = self.resolve_request(request)?;

        if self.selections.exists_for_group(request.group_id())? {
            tracing::warn!("拒绝分配: 小组已有选题记录");
            return Err(AllocationError::AlreadyAssigned {
                group_id: request.group_id().to_string(),
            });
        }

        // 乐观预检（无锁）；提交时在事务内复查
        ensure_capacity(&faculty.ledger())?;
        ensure_capacity(&topic.ledger())?;

        let started = Instant::now();
        let faculty_slot = self.locks.slot(ResourceKind::Faculty, request.faculty_id());
        let _faculty_guard =
            self.acquire(&faculty_slot, ResourceKind::Faculty, request.faculty_id(), started)?;
        let topic_slot = self.locks.slot(ResourceKind::Topic, request.topic_id());
        let _topic_guard =
            self.acquire(&topic_slot, ResourceKind::Topic, request.topic_id(), started)?;

        let outcome = self.commit_allocation(request)?;
        let receipt = outcome.receipt;

        tracing::info!(
            selection_id = %receipt.selection.selection_id,
            submitted_at = %receipt.submitted_at,
            queue_position = receipt.queue_position,
            "分配成功"
        );

        self.events.publish_after_commit(AllocationEvent::committed(
            request.group_id(),
            &receipt.submitted_at,
            receipt.queue_position,
        ));
        for (kind, id) in &outcome.exhausted {
            tracing::info!("名额已用尽: {}:{}", kind, id);
            self.events.publish_after_commit(AllocationEvent::exhausted(
                *kind,
                id,
                request.group_id(),
                &receipt.submitted_at,
            ));
        }

        Ok(receipt)
    }

    /// 存在性校验 + 课题归属校验
    fn resolve_request(&self, request: &AllocationRequest) -> AllocationResult<(Faculty, Topic)> {
        if self.catalog.find_group(request.group_id())?.is_none() {
            return Err(AllocationError::not_found("Group", request.group_id()));
        }
        let faculty = self
            .catalog
            .find_faculty(request.faculty_id())?
            .ok_or_else(|| AllocationError::not_found("Faculty", request.faculty_id()))?;
        if self.catalog.find_domain(request.domain_id())?.is_none() {
            return Err(AllocationError::not_found("Domain", request.domain_id()));
        }
        let topic = self
            .catalog
            .find_topic(request.topic_id())?
            .ok_or_else(|| AllocationError::not_found("Topic", request.topic_id()))?;

        if topic.domain_id != request.domain_id() {
            return Err(AllocationError::InvalidRequest(format!(
                "课题 {} 不属于研究方向 {}",
                request.topic_id(),
                request.domain_id()
            )));
        }

        tracing::debug!(
            faculty_used = faculty.capacity_used,
            topic_used = topic.capacity_used,
            "请求实体已解析"
        );
        Ok((faculty, topic))
    }

    /// 获取行锁；同一请求的两把锁共用 started + lock_timeout 截止时间，超时返回 Busy
    fn acquire<'a>(
        &self,
        slot: &'a LockSlot,
        kind: ResourceKind,
        id: &str,
        started: Instant,
    ) -> AllocationResult<MutexGuard<'a, ()>> {
        lock_until(slot, started + self.lock_timeout).ok_or_else(|| {
            let waited_ms = started.elapsed().as_millis() as u64;
            tracing::warn!(waited_ms, "行锁等待超时: {}:{}", kind, id);
            AllocationError::Busy {
                resource: format!("{}:{}", kind, id),
                waited_ms,
            }
        })
    }

    /// 原子提交单元（调用方已持有两把行锁）
    fn commit_allocation(&self, request: &AllocationRequest) -> AllocationResult<CommitOutcome> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(RepositoryError::from)?;

        // 同一小组的并发请求在预检后抢先提交
        if SelectionRepository::exists_for_group_in(&tx, request.group_id())? {
            tracing::warn!("事务内复查: 小组已有选题记录");
            return Err(AllocationError::Conflict {
                group_id: request.group_id().to_string(),
            });
        }

        let faculty = LedgerRepository::find_in(&tx, ResourceKind::Faculty, request.faculty_id())?
            .ok_or_else(|| AllocationError::not_found("Faculty", request.faculty_id()))?;
        ensure_capacity(&faculty)?;
        let topic = LedgerRepository::find_in(&tx, ResourceKind::Topic, request.topic_id())?
            .ok_or_else(|| AllocationError::not_found("Topic", request.topic_id()))?;
        ensure_capacity(&topic)?;

        let new_selection = NewSelection {
            selection_id: Uuid::new_v4().to_string(),
            group_id: request.group_id().to_string(),
            faculty_id: request.faculty_id().to_string(),
            domain_id: request.domain_id().to_string(),
            topic_id: request.topic_id().to_string(),
            // 下限为库中已有的最大提交时间，跨引擎实例保持严格递增
            submitted_at: self
                .clock
                .next_after(SelectionRepository::max_submitted_at_us_in(&tx)?),
        };

        let seq = match SelectionRepository::insert(&tx, &new_selection) {
            Ok(seq) => seq,
            Err(e) if e.is_unique_violation() => {
                tracing::warn!("唯一约束拦截重复提交");
                return Err(AllocationError::Conflict {
                    group_id: request.group_id().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if !LedgerRepository::try_reserve(&tx, ResourceKind::Faculty, &faculty.id)? {
            return Err(full_error(&faculty));
        }
        if !LedgerRepository::try_reserve(&tx, ResourceKind::Topic, &topic.id)? {
            return Err(full_error(&topic));
        }

        let selection = new_selection.into_selection(seq);
        let (submitted_us, _) = selection.order_key();
        let ahead =
            SelectionRepository::count_before_in(&tx, submitted_us, seq, &QueueFilter::all())?;

        tx.commit().map_err(RepositoryError::from)?;

        let exhausted = [&faculty, &topic]
            .into_iter()
            .filter(|entry| entry.remaining_slots() <= 1)
            .map(|entry| (entry.kind, entry.id.clone()))
            .collect();

        Ok(CommitOutcome {
            receipt: AllocationReceipt {
                submitted_at: selection.submitted_at_display(),
                queue_position: ahead + 1,
                selection,
            },
            exhausted,
        })
    }

    // ==========================================
    // Release
    // ==========================================

    /// 撤销小组的选题记录并归还两类名额
    #[instrument(skip(self))]
    pub fn release(&self, group_id: &str) -> AllocationResult<ReleaseReceipt> {
        let _perf = PerfGuard::new("engine.release");

        let group_id = group_id.trim();
        if group_id.is_empty() {
            return Err(AllocationError::InvalidRequest("缺少必填字段: group_id".to_string()));
        }

        let existing = self
            .selections
            .find_by_group(group_id)?
            .ok_or_else(|| AllocationError::not_found("Selection", group_id))?;

        let started = Instant::now();
        let faculty_slot = self.locks.slot(ResourceKind::Faculty, &existing.faculty_id);
        let _faculty_guard =
            self.acquire(&faculty_slot, ResourceKind::Faculty, &existing.faculty_id, started)?;
        let topic_slot = self.locks.slot(ResourceKind::Topic, &existing.topic_id);
        let _topic_guard =
            self.acquire(&topic_slot, ResourceKind::Topic, &existing.topic_id, started)?;

        let receipt = self.commit_release(&existing)?;

        tracing::info!(
            faculty_used_after = receipt.faculty_used_after,
            topic_used_after = receipt.topic_used_after,
            "选题记录已释放"
        );
        self.events.publish_after_commit(AllocationEvent::released(
            group_id,
            &receipt.selection.submitted_at_display(),
        ));

        Ok(receipt)
    }

    fn commit_release(&self, expected: &Selection) -> AllocationResult<ReleaseReceipt> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(RepositoryError::from)?;

        let current = SelectionRepository::find_by_group_in(&tx, &expected.group_id)?
            .ok_or_else(|| AllocationError::not_found("Selection", &expected.group_id))?;
        // 加锁期间记录被释放后又重新分配：持有的行锁已不对应当前记录
        if current.selection_id != expected.selection_id {
            return Err(AllocationError::Conflict {
                group_id: expected.group_id.clone(),
            });
        }

        SelectionRepository::delete_for_group_in(&tx, &current.group_id)?;
        for (kind, id) in [
            (ResourceKind::Faculty, &current.faculty_id),
            (ResourceKind::Topic, &current.topic_id),
        ] {
            if !LedgerRepository::release(&tx, kind, id)? {
                return Err(AllocationError::Internal(format!(
                    "账本计数与选题记录不一致: {}:{} capacity_used 已为 0",
                    kind, id
                )));
            }
        }

        let faculty_used_after = LedgerRepository::find_in(&tx, ResourceKind::Faculty, &current.faculty_id)?
            .map(|e| e.capacity_used)
            .unwrap_or_default();
        let topic_used_after = LedgerRepository::find_in(&tx, ResourceKind::Topic, &current.topic_id)?
            .map(|e| e.capacity_used)
            .unwrap_or_default();

        tx.commit().map_err(RepositoryError::from)?;

        Ok(ReleaseReceipt {
            selection: current,
            faculty_used_after,
            topic_used_after,
        })
    }
}

/// 名额校验: used < max
fn ensure_capacity(entry: &LedgerEntry) -> AllocationResult<()> {
    if entry.can_reserve() {
        Ok(())
    } else {
        tracing::warn!(
            "拒绝分配: {}:{} 名额已满 ({}/{})",
            entry.kind,
            entry.id,
            entry.capacity_used,
            entry.capacity_max
        );
        Err(full_error(entry))
    }
}

fn full_error(entry: &LedgerEntry) -> AllocationError {
    match entry.kind {
        ResourceKind::Faculty => AllocationError::FacultyFull {
            faculty_id: entry.id.clone(),
            current: entry.capacity_used,
            max: entry.capacity_max,
        },
        ResourceKind::Topic => AllocationError::TopicFull {
            topic_id: entry.id.clone(),
            current: entry.capacity_used,
            max: entry.capacity_max,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(kind: ResourceKind, used: i64, max: i64) -> LedgerEntry {
        LedgerEntry {
            kind,
            id: "X1".to_string(),
            name: "x".to_string(),
            capacity_max: max,
            capacity_used: used,
            available: used < max,
        }
    }

    #[test]
    fn test_ensure_capacity_maps_kind() {
        assert!(ensure_capacity(&entry(ResourceKind::Faculty, 2, 3)).is_ok());

        match ensure_capacity(&entry(ResourceKind::Faculty, 3, 3)) {
            Err(AllocationError::FacultyFull { current, max, .. }) => {
                assert_eq!((current, max), (3, 3));
            }
            other => panic!("期望 FacultyFull，实际: {:?}", other.err()),
        }
        match ensure_capacity(&entry(ResourceKind::Topic, 1, 1)) {
            Err(AllocationError::TopicFull { current, max, .. }) => {
                assert_eq!((current, max), (1, 1));
            }
            other => panic!("期望 TopicFull，实际: {:?}", other.err()),
        }
    }
}
