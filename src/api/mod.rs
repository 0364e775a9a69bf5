// ==========================================
// 分组选题分配系统 - API 层
// ==========================================
// 职责: 对外业务接口（命令行 / 上层服务调用）
// ==========================================

pub mod allocation_api;
pub mod error;

// 重导出核心类型
pub use allocation_api::AllocationApi;
pub use error::{ApiError, ApiResult};
