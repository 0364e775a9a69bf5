// ==========================================
// 分组选题分配系统 - 应用状态
// ==========================================
// 职责: 打开数据库、装配仓储 / 引擎 / API 的共享实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::AllocationApi;
use crate::config::allocation_config::{AllocationConfig, AllocationConfigReader};
use crate::config::config_manager::ConfigManager;
use crate::db::{configure_sqlite_connection_with_timeout, ensure_schema, open_sqlite_connection};
use crate::engine::{AllocationEngine, AllocationEventPublisher, QueueReporter};
use crate::perf::install_sqlite_tracing;
use crate::repository::{CatalogRepository, LedgerRepository};

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "GROUP_ALLOCATION_DB_PATH";

/// 应用状态
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 启动时加载的分配配置
    pub config: AllocationConfig,

    pub config_manager: Arc<ConfigManager>,

    pub engine: Arc<AllocationEngine>,

    pub reporter: Arc<QueueReporter>,

    /// 分配API
    pub allocation_api: Arc<AllocationApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径（不存在时自动创建并建表）
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::build(db_path, None)
    }

    /// 创建带事件发布者的AppState
    pub fn with_event_publisher(
        db_path: String,
        publisher: Arc<dyn AllocationEventPublisher>,
    ) -> Result<Self, String> {
        Self::build(db_path, Some(publisher))
    }

    fn build(
        db_path: String,
        publisher: Option<Arc<dyn AllocationEventPublisher>>,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let mut conn =
            open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        install_sqlite_tracing(&mut conn);
        ensure_schema(&conn).map_err(|e| format!("数据库初始化失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(ConfigManager::from_connection(conn.clone()));
        let config = config_manager
            .load_allocation_config()
            .map_err(|e| format!("配置加载失败: {}", e))?;

        if config.busy_timeout_ms != crate::db::DEFAULT_BUSY_TIMEOUT_MS {
            let guard = conn.lock().map_err(|e| format!("连接锁获取失败: {}", e))?;
            configure_sqlite_connection_with_timeout(&guard, config.busy_timeout_ms)
                .map_err(|e| format!("busy_timeout 设置失败: {}", e))?;
        }
        tracing::info!(
            lock_timeout_ms = config.lock_timeout_ms,
            default_capacity_max = config.default_capacity_max,
            busy_timeout_ms = config.busy_timeout_ms,
            "分配配置已加载"
        );

        // ==========================================
        // 引擎 + API
        // ==========================================
        let mut engine = AllocationEngine::new(conn.clone(), &config)
            .map_err(|e| format!("分配引擎初始化失败: {}", e))?;
        if let Some(publisher) = publisher {
            engine = engine.with_event_publisher(publisher);
        }
        let engine = Arc::new(engine);
        let reporter = Arc::new(QueueReporter::new(conn.clone()));
        let catalog = Arc::new(CatalogRepository::new(conn.clone()));
        let ledgers = Arc::new(LedgerRepository::new(conn));

        let allocation_api = Arc::new(AllocationApi::new(
            engine.clone(),
            reporter.clone(),
            catalog,
            ledgers,
            config_manager.clone(),
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            config,
            config_manager,
            engine,
            reporter,
            allocation_api,
        })
    }
}

/// 默认数据库路径
///
/// 优先读取环境变量 GROUP_ALLOCATION_DB_PATH，否则使用用户数据目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./group_allocation.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("group-allocation");
        // 目录创建失败时回落到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("group_allocation.db");
        }
    }

    path.to_string_lossy().to_string()
}
