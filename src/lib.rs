// ==========================================
// 分组选题分配系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 先到先得的导师 / 课题名额分配引擎
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 分配规则与并发控制
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 性能观测（SQL trace / PerfGuard）
pub mod perf;

// API 层 - 业务接口
pub mod api;

// 应用层 - 装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::ResourceKind;

// 领域实体
pub use domain::{
    AllocationReceipt, AllocationRequest, CapacityConstraint, Domain, Faculty, LedgerEntry,
    QueueEntry, QueueFilter, ReleaseReceipt, Selection, SelectionPayload, StudentGroup, Topic,
};

// 引擎
pub use engine::{AllocationEngine, AllocationError, AllocationErrorKind, QueueReporter};

// API
pub use api::{AllocationApi, ApiError};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "分组选题分配系统";

// 数据库版本
pub const DB_VERSION: &str = "v0.1";
