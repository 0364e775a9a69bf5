// ==========================================
// 分组选题分配系统 - 选题记录仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: 只追加；删除仅供管理端撤销分配（Release）使用
// ==========================================
// 排序: submitted_at_us ASC, seq ASC（同时间戳按插入顺序）
// 唯一: group_id UNIQUE，跨引擎实例防重复分配
// ==========================================

use crate::domain::selection::{format_submitted_at, NewSelection, QueueFilter, Selection};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str =
    "seq, selection_id, group_id, faculty_id, domain_id, topic_id, submitted_at_us";

// ==========================================
// SelectionRepository - 选题记录仓储
// ==========================================
pub struct SelectionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SelectionRepository {
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

    fn map_selection(row: &Row<'_>) -> SqliteResult<Selection> {
        let micros: i64 = row.get(6)?;
        let submitted_at = DateTime::<Utc>::from_timestamp_micros(micros)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(6, micros))?;
        Ok(Selection {
            seq: row.get(0)?,
            selection_id: row.get(1)?,
            group_id: row.get(2)?,
            faculty_id: row.get(3)?,
            domain_id: row.get(4)?,
            topic_id: row.get(5)?,
            submitted_at,
        })
    }

    /// 把过滤条件拼成 WHERE 片段（只拼列名，值全部参数化）
    fn filter_clause(filter: &QueueFilter) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        for (column, value) in [
            ("domain_id", &filter.domain_id),
            ("faculty_id", &filter.faculty_id),
            ("topic_id", &filter.topic_id),
        ] {
            if let Some(v) = value {
                values.push(Value::Text(v.clone()));
                clauses.push(format!("{} = ?{}", column, values.len()));
            }
        }
        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), values)
        }
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 插入选题记录
    ///
    /// # 返回
    /// - Ok(seq): 存储分配的插入序号
    /// - Err(UniqueConstraintViolation): 该小组已有记录
    pub fn insert(conn: &Connection, selection: &NewSelection) -> RepositoryResult<i64> {
        conn.execute(
            r#"
            INSERT INTO group_selection (
                selection_id, group_id, faculty_id, domain_id, topic_id,
                submitted_at_us, submitted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                selection.selection_id,
                selection.group_id,
                selection.faculty_id,
                selection.domain_id,
                selection.topic_id,
                selection.submitted_at.timestamp_micros(),
                format_submitted_at(&selection.submitted_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 小组是否已有选题记录
    pub fn exists_for_group_in(conn: &Connection, group_id: &str) -> RepositoryResult<bool> {
        let exists = conn
            .query_row(
                "SELECT 1 FROM group_selection WHERE group_id = ?1 LIMIT 1",
                params![group_id],
                |_row| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(exists)
    }

    /// 按小组查询选题记录
    pub fn find_by_group_in(conn: &Connection, group_id: &str) -> RepositoryResult<Option<Selection>> {
        let sql = format!(
            "SELECT {} FROM group_selection WHERE group_id = ?1",
            SELECT_COLUMNS
        );
        let selection = conn
            .query_row(&sql, params![group_id], Self::map_selection)
            .optional()?;
        Ok(selection)
    }

    /// 统计排在 (submitted_at_us, seq) 之前的记录数
    pub fn count_before_in(
        conn: &Connection,
        submitted_at_us: i64,
        seq: i64,
        filter: &QueueFilter,
    ) -> RepositoryResult<i64> {
        let (where_clause, mut values) = Self::filter_clause(filter);
        let order_cond = format!(
            "(submitted_at_us < ?{a} OR (submitted_at_us = ?{a} AND seq < ?{b}))",
            a = values.len() + 1,
            b = values.len() + 2,
        );
        values.push(Value::Integer(submitted_at_us));
        values.push(Value::Integer(seq));

        let sql = if where_clause.is_empty() {
            format!("SELECT COUNT(*) FROM group_selection WHERE {}", order_cond)
        } else {
            format!("SELECT COUNT(*) FROM group_selection {} AND {}", where_clause, order_cond)
        };
        let count = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(count)
    }

    /// 当前最大的 submitted_at_us；提交事务内调用，作为新时间戳的下限
    pub fn max_submitted_at_us_in(conn: &Connection) -> RepositoryResult<Option<i64>> {
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(submitted_at_us) FROM group_selection",
            [],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    /// 删除小组的选题记录（仅 Release 使用）
    ///
    /// # 返回
    /// - Ok(true): 删除成功
    /// - Ok(false): 无记录
    pub fn delete_for_group_in(conn: &Connection, group_id: &str) -> RepositoryResult<bool> {
        let affected = conn.execute(
            "DELETE FROM group_selection WHERE group_id = ?1",
            params![group_id],
        )?;
        Ok(affected == 1)
    }

    // ==========================================
    // 只读查询
    // ==========================================

    pub fn exists_for_group(&self, group_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        Self::exists_for_group_in(&conn, group_id)
    }

    pub fn find_by_group(&self, group_id: &str) -> RepositoryResult<Option<Selection>> {
        let conn = self.get_conn()?;
        Self::find_by_group_in(&conn, group_id)
    }

    /// 按 FCFS 顺序列出选题记录
    pub fn list_ordered(&self, filter: &QueueFilter) -> RepositoryResult<Vec<Selection>> {
        let conn = self.get_conn()?;
        let (where_clause, values) = Self::filter_clause(filter);
        let sql = format!(
            "SELECT {} FROM group_selection {} ORDER BY submitted_at_us ASC, seq ASC",
            SELECT_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let selections = stmt
            .query_map(params_from_iter(values), Self::map_selection)?
            .collect::<SqliteResult<Vec<Selection>>>()?;
        Ok(selections)
    }

    /// 统计记录数
    pub fn count(&self, filter: &QueueFilter) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let (where_clause, values) = Self::filter_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM group_selection {}", where_clause);
        let count = conn.query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(count)
    }

    /// 已提交记录中最大的 submitted_at_us（用于提交时钟续接）
    pub fn max_submitted_at_us(&self) -> RepositoryResult<Option<i64>> {
        let conn = self.get_conn()?;
        Self::max_submitted_at_us_in(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_clause_numbering() {
        let (clause, values) = SelectionRepository::filter_clause(&QueueFilter {
            domain_id: Some("D1".to_string()),
            faculty_id: None,
            topic_id: Some("T1".to_string()),
        });
        assert_eq!(clause, "WHERE domain_id = ?1 AND topic_id = ?2");
        assert_eq!(values.len(), 2);

        let (clause, values) = SelectionRepository::filter_clause(&QueueFilter::all());
        assert!(clause.is_empty());
        assert!(values.is_empty());
    }
}
