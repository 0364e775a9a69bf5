// ==========================================
// 分组选题分配系统 - 分配 API
// ==========================================
// 职责: 选题提交、队列查询、目录录入与查询的统一入口
// 约束: 原始载荷在进入引擎前转换为 AllocationRequest
// ==========================================

use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::config::allocation_config::AllocationConfigReader;
use crate::config::config_manager::ConfigManager;
use crate::domain::catalog::{
    Domain, Faculty, FacultyOverview, NewFaculty, NewTopic, StudentGroup, Topic,
};
use crate::domain::ledger::LedgerDrift;
use crate::domain::selection::{
    AllocationReceipt, AllocationRequest, QueueEntry, QueueFilter, ReleaseReceipt,
    SelectionPayload,
};
use crate::engine::allocator::AllocationEngine;
use crate::engine::error::AllocationError;
use crate::domain::types::ResourceKind;
use crate::engine::queue_reporter::QueueReporter;
use crate::repository::catalog_repo::CatalogRepository;
use crate::repository::ledger_repo::LedgerRepository;

// ==========================================
// AllocationApi - 分配 API
// ==========================================

/// 分配API
///
/// 职责：
/// 1. 选题提交（同步 / 异步）与撤销
/// 2. 队列与导师看板查询
/// 3. 目录录入（研究方向、导师、课题、小组）
/// 4. 账本自检
pub struct AllocationApi {
    engine: Arc<AllocationEngine>,
    reporter: Arc<QueueReporter>,
    catalog: Arc<CatalogRepository>,
    ledgers: Arc<LedgerRepository>,
    config_manager: Arc<ConfigManager>,
}

impl AllocationApi {
    pub fn new(
        engine: Arc<AllocationEngine>,
        reporter: Arc<QueueReporter>,
        catalog: Arc<CatalogRepository>,
        ledgers: Arc<LedgerRepository>,
        config_manager: Arc<ConfigManager>,
    ) -> Self {
        Self {
            engine,
            reporter,
            catalog,
            ledgers,
            config_manager,
        }
    }

    // ==========================================
    // 选题提交
    // ==========================================

    /// 提交选题（原始载荷）
    ///
    /// # 返回
    /// - Ok(AllocationReceipt): 选题记录 + 提交时排位
    /// - Err(ApiError::Allocation): 引擎拒绝（含错误种类）
    pub fn select(&self, payload: SelectionPayload) -> ApiResult<AllocationReceipt> {
        let request = AllocationRequest::try_from(payload).map_err(AllocationError::from)?;
        Ok(self.engine.allocate(&request)?)
    }

    /// 提交已校验的请求
    pub fn allocate(&self, request: &AllocationRequest) -> ApiResult<AllocationReceipt> {
        Ok(self.engine.allocate(request)?)
    }

    /// 异步提交（在阻塞线程池上执行）
    ///
    /// 丢弃返回的 future 不会中断已开始的分配：它要么完整提交，要么完整回滚
    pub async fn allocate_async(&self, payload: SelectionPayload) -> ApiResult<AllocationReceipt> {
        let request = AllocationRequest::try_from(payload).map_err(AllocationError::from)?;
        let engine = Arc::clone(&self.engine);

        tokio::task::spawn_blocking(move || engine.allocate(&request))
            .await
            .map_err(|e| ApiError::InternalError(format!("分配任务异常终止: {}", e)))?
            .map_err(ApiError::from)
    }

    /// 撤销小组的选题（管理端）
    pub fn release(&self, group_id: &str) -> ApiResult<ReleaseReceipt> {
        Ok(self.engine.release(group_id)?)
    }

    // ==========================================
    // 队列查询
    // ==========================================

    /// 队列视图（研究方向 / 导师均可为空）
    pub fn get_queue(
        &self,
        domain_id: Option<&str>,
        faculty_id: Option<&str>,
    ) -> ApiResult<Vec<QueueEntry>> {
        let domain_id = domain_id.map(str::trim).filter(|s| !s.is_empty());
        let faculty_id = faculty_id.map(str::trim).filter(|s| !s.is_empty());
        Ok(self.reporter.get_queue(domain_id, faculty_id)?)
    }

    /// 小组在指定队列中的实时排位
    pub fn position_of(&self, group_id: &str, filter: &QueueFilter) -> ApiResult<Option<i64>> {
        Ok(self.reporter.position_of(group_id.trim(), filter)?)
    }

    pub fn faculty_dashboard(&self, faculty_id: &str) -> ApiResult<Vec<QueueEntry>> {
        Ok(self.reporter.faculty_dashboard(faculty_id.trim())?)
    }

    pub fn faculty_overview(&self) -> ApiResult<Vec<FacultyOverview>> {
        Ok(self.reporter.faculty_overview()?)
    }

    // ==========================================
    // 目录查询
    // ==========================================

    /// 仍有名额的导师
    pub fn list_available_faculty(&self) -> ApiResult<Vec<Faculty>> {
        Ok(self.catalog.list_available_faculty()?)
    }

    /// 某研究方向下仍可选的课题
    pub fn list_topics_by_domain(&self, domain_id: &str) -> ApiResult<Vec<Topic>> {
        let domain_id = require_text("domain_id", domain_id)?;
        if self.catalog.find_domain(&domain_id)?.is_none() {
            return Err(ApiError::NotFound(format!("Domain(id={})不存在", domain_id)));
        }
        Ok(self.catalog.list_available_topics_by_domain(&domain_id)?)
    }

    pub fn list_domains(&self) -> ApiResult<Vec<Domain>> {
        Ok(self.catalog.list_domains()?)
    }

    /// 账本自检（导师 + 课题），一致时返回空列表
    pub fn ledger_drift(&self) -> ApiResult<Vec<LedgerDrift>> {
        let mut drift = self.ledgers.find_drift(ResourceKind::Faculty)?;
        drift.extend(self.ledgers.find_drift(ResourceKind::Topic)?);
        if !drift.is_empty() {
            tracing::warn!(count = drift.len(), "账本计数与选题记录不一致");
        }
        Ok(drift)
    }

    // ==========================================
    // 目录录入
    // ==========================================

    pub fn register_domain(&self, domain: Domain) -> ApiResult<Domain> {
        let domain = Domain {
            domain_id: require_text("domain_id", &domain.domain_id)?,
            name: require_text("name", &domain.name)?,
            description: domain.description.trim().to_string(),
        };
        self.catalog.insert_domain(&domain)?;
        tracing::info!("研究方向已录入: {}", domain.domain_id);
        Ok(domain)
    }

    /// 录入导师（未指定名额时使用配置默认值）
    pub fn register_faculty(&self, faculty: NewFaculty) -> ApiResult<Faculty> {
        let faculty_id = require_text("faculty_id", &faculty.faculty_id)?;
        let name = require_text("name", &faculty.name)?;
        let email = faculty
            .email
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let capacity_max = self.resolve_capacity(faculty.capacity_max)?;

        self.catalog
            .insert_faculty(&faculty_id, &name, email, capacity_max)?;
        tracing::info!("导师已录入: {} (capacity_max={})", faculty_id, capacity_max);

        self.catalog
            .find_faculty(&faculty_id)?
            .ok_or_else(|| ApiError::InternalError(format!("导师 {} 录入后未找到", faculty_id)))
    }

    /// 录入课题（所属研究方向必须存在）
    pub fn register_topic(&self, topic: NewTopic) -> ApiResult<Topic> {
        let topic_id = require_text("topic_id", &topic.topic_id)?;
        let domain_id = require_text("domain_id", &topic.domain_id)?;
        let name = require_text("name", &topic.name)?;
        let capacity_max = self.resolve_capacity(topic.capacity_max)?;

        if self.catalog.find_domain(&domain_id)?.is_none() {
            return Err(ApiError::NotFound(format!("Domain(id={})不存在", domain_id)));
        }

        self.catalog.insert_topic(
            &topic_id,
            &domain_id,
            &name,
            topic.description.trim(),
            capacity_max,
        )?;
        tracing::info!("课题已录入: {} (domain={}, capacity_max={})", topic_id, domain_id, capacity_max);

        self.catalog
            .find_topic(&topic_id)?
            .ok_or_else(|| ApiError::InternalError(format!("课题 {} 录入后未找到", topic_id)))
    }

    pub fn register_group(&self, group: StudentGroup) -> ApiResult<StudentGroup> {
        if group.size <= 0 {
            return Err(ApiError::InvalidInput(format!("小组人数必须为正数: {}", group.size)));
        }
        let group = StudentGroup {
            group_id: require_text("group_id", &group.group_id)?,
            leader_roll_number: group
                .leader_roll_number
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            size: group.size,
        };
        self.catalog.insert_group(&group)?;
        tracing::debug!("小组已录入: {}", group.group_id);
        Ok(group)
    }

    fn resolve_capacity(&self, requested: Option<i64>) -> ApiResult<i64> {
        match requested {
            Some(max) if max > 0 => Ok(max),
            Some(max) => Err(ApiError::InvalidInput(format!("名额上限必须为正数: {}", max))),
            None => self
                .config_manager
                .get_default_capacity_max()
                .map_err(|e| ApiError::ConfigError(e.to_string())),
        }
    }
}

fn require_text(field: &str, value: &str) -> ApiResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(ApiError::InvalidInput(format!("缺少必填字段: {}", field)));
    }
    Ok(v.to_string())
}
