// ==========================================
// 分组选题分配系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约束: 带 `conn: &Connection` 参数的关联函数供引擎在事务内调用
// ==========================================

pub mod catalog_repo;
pub mod error;
pub mod ledger_repo;
pub mod selection_repo;

// 重导出核心仓储
pub use catalog_repo::CatalogRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use ledger_repo::LedgerRepository;
pub use selection_repo::SelectionRepository;
