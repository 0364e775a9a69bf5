// ==========================================
// 分组选题分配系统 - 队列报表
// ==========================================
// 职责: 按 FCFS 全序为选题记录排位，并拼装对外展示字段
// 红线: 无状态，每次调用重新计算；只读，不持有行锁
// ==========================================

use crate::domain::catalog::{AssignedGroup, FacultyOverview};
use crate::domain::ledger::CapacityConstraint;
use crate::domain::selection::{format_submitted_at, QueueEntry, QueueFilter, RankedSelection};
use crate::engine::error::{AllocationError, AllocationResult};
use crate::perf::PerfGuard;
use crate::repository::catalog_repo::CatalogRepository;
use crate::repository::selection_repo::SelectionRepository;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// id → 展示名
struct NameIndex {
    faculty: HashMap<String, String>,
    domains: HashMap<String, String>,
    topics: HashMap<String, String>,
}

pub struct QueueReporter {
    catalog: CatalogRepository,
    selections: SelectionRepository,
}

impl QueueReporter {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            catalog: CatalogRepository::new(conn.clone()),
            selections: SelectionRepository::new(conn),
        }
    }

    /// 按 (submitted_at, seq) 排位，位置从 1 开始、在过滤结果内连续
    pub fn rank(&self, filter: &QueueFilter) -> AllocationResult<Vec<RankedSelection>> {
        let ranked = self
            .selections
            .list_ordered(filter)?
            .into_iter()
            .enumerate()
            .map(|(i, selection)| RankedSelection {
                position: i as i64 + 1,
                selection,
            })
            .collect();
        Ok(ranked)
    }

    /// 小组在指定队列中的实时排位
    ///
    /// # 返回
    /// - Ok(Some(position)): 小组在该队列中
    /// - Ok(None): 小组无记录或不在过滤范围内
    pub fn position_of(&self, group_id: &str, filter: &QueueFilter) -> AllocationResult<Option<i64>> {
        let position = self
            .rank(filter)?
            .into_iter()
            .find(|r| r.selection.group_id == group_id)
            .map(|r| r.position);
        Ok(position)
    }

    /// 对外队列视图（可按研究方向 / 导师过滤）
    pub fn get_queue(
        &self,
        domain_id: Option<&str>,
        faculty_id: Option<&str>,
    ) -> AllocationResult<Vec<QueueEntry>> {
        let _perf = PerfGuard::new("reporter.get_queue");

        let filter = QueueFilter {
            domain_id: domain_id.map(str::to_string),
            faculty_id: faculty_id.map(str::to_string),
            topic_id: None,
        };
        let ranked = self.rank(&filter)?;
        let names = self.load_names()?;

        let entries = ranked
            .into_iter()
            .map(|r| QueueEntry {
                position: r.position,
                submitted_at: r.selection.submitted_at_display(),
                faculty_name: names.faculty.get(&r.selection.faculty_id).cloned(),
                domain_name: names.domains.get(&r.selection.domain_id).cloned(),
                topic_name: names.topics.get(&r.selection.topic_id).cloned(),
                group_id: r.selection.group_id,
            })
            .collect::<Vec<_>>();

        tracing::debug!(count = entries.len(), "队列已生成");
        Ok(entries)
    }

    /// 单个导师名下的选题队列
    pub fn faculty_dashboard(&self, faculty_id: &str) -> AllocationResult<Vec<QueueEntry>> {
        if self.catalog.find_faculty(faculty_id)?.is_none() {
            return Err(AllocationError::not_found("Faculty", faculty_id));
        }
        self.get_queue(None, Some(faculty_id))
    }

    /// 全部导师的名额与名下小组
    pub fn faculty_overview(&self) -> AllocationResult<Vec<FacultyOverview>> {
        let _perf = PerfGuard::new("reporter.faculty_overview");

        let names = self.load_names()?;
        let mut assigned: HashMap<String, Vec<AssignedGroup>> = HashMap::new();
        for selection in self.selections.list_ordered(&QueueFilter::all())? {
            assigned
                .entry(selection.faculty_id.clone())
                .or_default()
                .push(AssignedGroup {
                    domain_name: names.domains.get(&selection.domain_id).cloned(),
                    topic_name: names.topics.get(&selection.topic_id).cloned(),
                    submitted_at: format_submitted_at(&selection.submitted_at),
                    group_id: selection.group_id,
                });
        }

        let overview = self
            .catalog
            .list_faculty()?
            .into_iter()
            .map(|f| FacultyOverview {
                available_slots: f.remaining_slots(),
                assigned_groups: assigned.remove(&f.faculty_id).unwrap_or_default(),
                faculty_id: f.faculty_id,
                name: f.name,
                email: f.email,
                capacity_max: f.capacity_max,
                capacity_used: f.capacity_used,
                available: f.available,
            })
            .collect();
        Ok(overview)
    }

    fn load_names(&self) -> AllocationResult<NameIndex> {
        Ok(NameIndex {
            faculty: self
                .catalog
                .list_faculty()?
                .into_iter()
                .map(|f| (f.faculty_id, f.name))
                .collect(),
            domains: self
                .catalog
                .list_domains()?
                .into_iter()
                .map(|d| (d.domain_id, d.name))
                .collect(),
            topics: self
                .catalog
                .list_topics()?
                .into_iter()
                .map(|t| (t.topic_id, t.name))
                .collect(),
        })
    }
}
