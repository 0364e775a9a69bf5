// ==========================================
// 分组选题分配系统 - 应用层
// ==========================================
// 职责: 应用装配（数据库、配置、引擎、API）
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState, DB_PATH_ENV};
