// ==========================================
// 分组选题分配系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::allocation_config::{
    AllocationConfigReader, DEFAULT_CAPACITY_MAX, DEFAULT_LOCK_TIMEOUT_MS,
};
use crate::db::{open_sqlite_connection, DEFAULT_BUSY_TIMEOUT_MS};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 读取数值配置；缺失或解析失败时回落默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>>
    where
        T: std::str::FromStr + Copy + std::fmt::Display,
    {
        match self.get_config_value(key)? {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!("配置项 {} 值无效: {:?}，使用默认值 {}", key, raw, default);
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    /// 写入/覆盖单个配置
    ///
    /// 已知的数值型配置会先校验，非法值直接拒绝（不落库）
    pub fn update_config(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        validate_config_value(key, value)?;

        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        tracing::info!("配置已更新: {} = {}", key, value);
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式，key 有序）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 从配置快照恢复配置（单事务，任一项非法则整体回滚）
    ///
    /// # 返回
    /// - Ok(usize): 恢复的配置项数量
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> Result<usize, Box<dyn Error>> {
        let config_map: BTreeMap<String, String> = serde_json::from_str(snapshot_json)?;
        for (key, value) in &config_map {
            validate_config_value(key, value)?;
        }

        let mut conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.transaction()?;

        let mut count = 0;
        for (key, value) in config_map.iter() {
            count += tx.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }
}

/// 已知配置项的取值校验
fn validate_config_value(key: &str, value: &str) -> Result<(), Box<dyn Error>> {
    let v = value.trim();
    match key {
        config_keys::LOCK_TIMEOUT_MS | config_keys::BUSY_TIMEOUT_MS => {
            v.parse::<u64>()
                .map_err(|_| format!("配置项 {} 需要非负整数(毫秒)，实际: {:?}", key, value))?;
        }
        config_keys::DEFAULT_CAPACITY_MAX => {
            let n = v
                .parse::<i64>()
                .map_err(|_| format!("配置项 {} 需要正整数，实际: {:?}", key, value))?;
            if n <= 0 {
                return Err(format!("配置项 {} 需要正整数，实际: {}", key, n).into());
            }
        }
        _ => {}
    }
    Ok(())
}

impl AllocationConfigReader for ConfigManager {
    fn get_lock_timeout_ms(&self) -> Result<u64, Box<dyn Error>> {
        self.get_parsed_or_default(config_keys::LOCK_TIMEOUT_MS, DEFAULT_LOCK_TIMEOUT_MS)
    }

    fn get_default_capacity_max(&self) -> Result<i64, Box<dyn Error>> {
        let v = self.get_parsed_or_default(config_keys::DEFAULT_CAPACITY_MAX, DEFAULT_CAPACITY_MAX)?;
        Ok(if v > 0 { v } else { DEFAULT_CAPACITY_MAX })
    }

    fn get_busy_timeout_ms(&self) -> Result<u64, Box<dyn Error>> {
        self.get_parsed_or_default(config_keys::BUSY_TIMEOUT_MS, DEFAULT_BUSY_TIMEOUT_MS)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    pub const LOCK_TIMEOUT_MS: &str = "allocation.lock_timeout_ms";
    pub const DEFAULT_CAPACITY_MAX: &str = "allocation.default_capacity_max";
    pub const BUSY_TIMEOUT_MS: &str = "allocation.busy_timeout_ms";
}
