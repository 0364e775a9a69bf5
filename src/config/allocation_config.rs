// ==========================================
// 分组选题分配系统 - 分配配置读取 Trait
// ==========================================
// 职责: 定义分配引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::Duration;

/// 行锁等待上限默认值（毫秒）
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2_000;
/// 导师/课题默认名额（与原管理端一致）
pub const DEFAULT_CAPACITY_MAX: i64 = 3;

// ==========================================
// AllocationConfig - 分配引擎配置快照
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationConfig {
    pub lock_timeout_ms: u64,      // 行锁等待上限，超时返回 Busy
    pub default_capacity_max: i64, // 录入导师/课题时的默认名额
    pub busy_timeout_ms: u64,      // SQLite busy_timeout
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            default_capacity_max: DEFAULT_CAPACITY_MAX,
            busy_timeout_ms: crate::db::DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl AllocationConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

// ==========================================
// AllocationConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
pub trait AllocationConfigReader: Send + Sync {
    /// 行锁等待上限（毫秒）
    ///
    /// # 默认值
    /// - 2000
    fn get_lock_timeout_ms(&self) -> Result<u64, Box<dyn Error>>;

    /// 默认名额
    ///
    /// # 默认值
    /// - 3（非正数视为无效，回落默认值）
    fn get_default_capacity_max(&self) -> Result<i64, Box<dyn Error>>;

    /// SQLite busy_timeout（毫秒）
    ///
    /// # 默认值
    /// - 5000
    fn get_busy_timeout_ms(&self) -> Result<u64, Box<dyn Error>>;

    /// 一次性读取全部分配配置
    fn load_allocation_config(&self) -> Result<AllocationConfig, Box<dyn Error>> {
        Ok(AllocationConfig {
            lock_timeout_ms: self.get_lock_timeout_ms()?,
            default_capacity_max: self.get_default_capacity_max()?,
            busy_timeout_ms: self.get_busy_timeout_ms()?,
        })
    }
}
