// ==========================================
// 分组选题分配系统 - 名额账本数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: try_reserve / release 只允许在分配引擎的事务内调用
// ==========================================
// 约束: 条件更新 (WHERE capacity_used < capacity_max) 保证
//       即使调用方漏检，账本也不会越界
// ==========================================

use crate::domain::ledger::{LedgerDrift, LedgerEntry};
use crate::domain::types::ResourceKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// LedgerRepository - 名额账本仓储
// ==========================================

/// 名额账本仓储
/// 职责: faculty / topic 两张表的名额字段读写
pub struct LedgerRepository {
    conn: Arc<Mutex<Connection>>,
}

impl LedgerRepository {
    /// 从已有连接创建仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_entry(kind: ResourceKind, row: &Row<'_>) -> SqliteResult<LedgerEntry> {
        Ok(LedgerEntry {
            kind,
            id: row.get(0)?,
            name: row.get(1)?,
            capacity_max: row.get(2)?,
            capacity_used: row.get(3)?,
            available: row.get::<_, i64>(4)? != 0,
        })
    }

    // ==========================================
    // 事务内操作（传入事务连接）
    // ==========================================

    /// 读取单个账本条目
    ///
    /// # 返回
    /// - Ok(Some(LedgerEntry)): 找到
    /// - Ok(None): 不存在
    pub fn find_in(
        conn: &Connection,
        kind: ResourceKind,
        id: &str,
    ) -> RepositoryResult<Option<LedgerEntry>> {
        let sql = format!(
            "SELECT {id_col}, name, capacity_max, capacity_used, available FROM {table} WHERE {id_col} = ?1",
            id_col = kind.id_column(),
            table = kind.table(),
        );
        let entry = conn
            .query_row(&sql, params![id], |row| Self::map_entry(kind, row))
            .optional()?;
        Ok(entry)
    }

    /// 预留一个名额（条件自增）
    ///
    /// 同一条 UPDATE 内完成: capacity_used + 1，达到上限时 available 置 0
    ///
    /// # 返回
    /// - Ok(true): 预留成功
    /// - Ok(false): 已满或不存在（未做任何修改）
    pub fn try_reserve(conn: &Connection, kind: ResourceKind, id: &str) -> RepositoryResult<bool> {
        let sql = format!(
            r#"
            UPDATE {table}
               SET capacity_used = capacity_used + 1,
                   available = CASE WHEN capacity_used + 1 < capacity_max THEN 1 ELSE 0 END
             WHERE {id_col} = ?1
               AND capacity_used < capacity_max
            "#,
            table = kind.table(),
            id_col = kind.id_column(),
        );
        let affected = conn.execute(&sql, params![id])?;
        Ok(affected == 1)
    }

    /// 归还一个名额（条件自减），归还后必然可用
    ///
    /// # 返回
    /// - Ok(true): 归还成功
    /// - Ok(false): 已为 0 或不存在（未做任何修改）
    pub fn release(conn: &Connection, kind: ResourceKind, id: &str) -> RepositoryResult<bool> {
        let sql = format!(
            r#"
            UPDATE {table}
               SET capacity_used = capacity_used - 1,
                   available = 1
             WHERE {id_col} = ?1
               AND capacity_used > 0
            "#,
            table = kind.table(),
            id_col = kind.id_column(),
        );
        let affected = conn.execute(&sql, params![id])?;
        Ok(affected == 1)
    }

    // ==========================================
    // 只读查询（自行加连接锁）
    // ==========================================

    /// 按类型和ID查询账本条目
    pub fn find(&self, kind: ResourceKind, id: &str) -> RepositoryResult<Option<LedgerEntry>> {
        let conn = self.get_conn()?;
        Self::find_in(&conn, kind, id)
    }

    /// 按类型和ID查询账本条目（不存在时报 NotFound）
    pub fn get(&self, kind: ResourceKind, id: &str) -> RepositoryResult<LedgerEntry> {
        self.find(kind, id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: kind.entity_name().to_string(),
            id: id.to_string(),
        })
    }

    /// 列出某类全部账本条目（按ID排序）
    pub fn list(&self, kind: ResourceKind) -> RepositoryResult<Vec<LedgerEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {id_col}, name, capacity_max, capacity_used, available FROM {table} ORDER BY {id_col}",
            id_col = kind.id_column(),
            table = kind.table(),
        );
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map([], |row| Self::map_entry(kind, row))?
            .collect::<SqliteResult<Vec<LedgerEntry>>>()?;
        Ok(entries)
    }

    /// 账本自检: capacity_used 与实际选题记录数是否一致
    ///
    /// # 返回
    /// - Vec<LedgerDrift>: 不一致的条目（一致时为空）
    pub fn find_drift(&self, kind: ResourceKind) -> RepositoryResult<Vec<LedgerDrift>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT l.{id_col}, l.capacity_used, COUNT(s.seq) AS actual
              FROM {table} l
              LEFT JOIN group_selection s ON s.{id_col} = l.{id_col}
             GROUP BY l.{id_col}, l.capacity_used
            HAVING l.capacity_used <> COUNT(s.seq)
             ORDER BY l.{id_col}
            "#,
            id_col = kind.id_column(),
            table = kind.table(),
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LedgerDrift {
                    kind,
                    id: row.get(0)?,
                    capacity_used: row.get(1)?,
                    actual: row.get(2)?,
                })
            })?
            .collect::<SqliteResult<Vec<LedgerDrift>>>()?;
        Ok(rows)
    }
}
