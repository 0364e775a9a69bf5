// ==========================================
// 分组选题分配系统 - 基础目录仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 小组 / 研究方向 / 导师 / 课题的录入与身份查询
// 注意: 名额字段 capacity_used / available 只在录入时初始化，
//       之后只能经由 LedgerRepository 在引擎事务内修改
// ==========================================

use crate::domain::catalog::{Domain, Faculty, StudentGroup, Topic};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const FACULTY_COLUMNS: &str = "faculty_id, name, email, capacity_max, capacity_used, available";
const TOPIC_COLUMNS: &str =
    "topic_id, domain_id, name, description, capacity_max, capacity_used, available";

// ==========================================
// CatalogRepository - 基础目录仓储
// ==========================================
pub struct CatalogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CatalogRepository {
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

    fn map_faculty(row: &Row<'_>) -> SqliteResult<Faculty> {
        Ok(Faculty {
            faculty_id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            capacity_max: row.get(3)?,
            capacity_used: row.get(4)?,
            available: row.get::<_, i64>(5)? != 0,
        })
    }

    fn map_topic(row: &Row<'_>) -> SqliteResult<Topic> {
        Ok(Topic {
            topic_id: row.get(0)?,
            domain_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            capacity_max: row.get(4)?,
            capacity_used: row.get(5)?,
            available: row.get::<_, i64>(6)? != 0,
        })
    }

    // ==========================================
    // 录入
    // ==========================================

    pub fn insert_group(&self, group: &StudentGroup) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO student_group (group_id, leader_roll_number, size) VALUES (?1, ?2, ?3)",
            params![group.group_id, group.leader_roll_number, group.size],
        )?;
        Ok(())
    }

    pub fn insert_domain(&self, domain: &Domain) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO domain (domain_id, name, description) VALUES (?1, ?2, ?3)",
            params![domain.domain_id, domain.name, domain.description],
        )?;
        Ok(())
    }

    /// 录入导师（名额从 0 开始，初始可用）
    pub fn insert_faculty(
        &self,
        faculty_id: &str,
        name: &str,
        email: Option<&str>,
        capacity_max: i64,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO faculty (faculty_id, name, email, capacity_max, capacity_used, available)
            VALUES (?1, ?2, ?3, ?4, 0, 1)
            "#,
            params![faculty_id, name, email, capacity_max],
        )?;
        Ok(())
    }

    /// 录入课题（名额从 0 开始，初始可用）
    pub fn insert_topic(
        &self,
        topic_id: &str,
        domain_id: &str,
        name: &str,
        description: &str,
        capacity_max: i64,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO topic (topic_id, domain_id, name, description, capacity_max, capacity_used, available)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, 1)
            "#,
            params![topic_id, domain_id, name, description, capacity_max],
        )?;
        Ok(())
    }

    // ==========================================
    // 身份查询
    // ==========================================

    pub fn find_group(&self, group_id: &str) -> RepositoryResult<Option<StudentGroup>> {
        let conn = self.get_conn()?;
        let group = conn
            .query_row(
                "SELECT group_id, leader_roll_number, size FROM student_group WHERE group_id = ?1",
                params![group_id],
                |row| {
                    Ok(StudentGroup {
                        group_id: row.get(0)?,
                        leader_roll_number: row.get(1)?,
                        size: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(group)
    }

    pub fn find_domain(&self, domain_id: &str) -> RepositoryResult<Option<Domain>> {
        let conn = self.get_conn()?;
        let domain = conn
            .query_row(
                "SELECT domain_id, name, description FROM domain WHERE domain_id = ?1",
                params![domain_id],
                |row| {
                    Ok(Domain {
                        domain_id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(domain)
    }

    pub fn find_faculty(&self, faculty_id: &str) -> RepositoryResult<Option<Faculty>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM faculty WHERE faculty_id = ?1", FACULTY_COLUMNS);
        let faculty = conn
            .query_row(&sql, params![faculty_id], Self::map_faculty)
            .optional()?;
        Ok(faculty)
    }

    pub fn find_topic(&self, topic_id: &str) -> RepositoryResult<Option<Topic>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM topic WHERE topic_id = ?1", TOPIC_COLUMNS);
        let topic = conn
            .query_row(&sql, params![topic_id], Self::map_topic)
            .optional()?;
        Ok(topic)
    }

    // ==========================================
    // 列表查询
    // ==========================================

    pub fn list_domains(&self) -> RepositoryResult<Vec<Domain>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT domain_id, name, description FROM domain ORDER BY domain_id")?;
        let domains = stmt
            .query_map([], |row| {
                Ok(Domain {
                    domain_id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            })?
            .collect::<SqliteResult<Vec<Domain>>>()?;
        Ok(domains)
    }

    pub fn list_faculty(&self) -> RepositoryResult<Vec<Faculty>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM faculty ORDER BY faculty_id", FACULTY_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let faculty = stmt
            .query_map([], Self::map_faculty)?
            .collect::<SqliteResult<Vec<Faculty>>>()?;
        Ok(faculty)
    }

    /// 仍有名额的导师
    pub fn list_available_faculty(&self) -> RepositoryResult<Vec<Faculty>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM faculty WHERE available = 1 AND capacity_used < capacity_max ORDER BY faculty_id",
            FACULTY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let faculty = stmt
            .query_map([], Self::map_faculty)?
            .collect::<SqliteResult<Vec<Faculty>>>()?;
        Ok(faculty)
    }

    /// 某研究方向下仍可选的课题
    pub fn list_available_topics_by_domain(&self, domain_id: &str) -> RepositoryResult<Vec<Topic>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM topic WHERE domain_id = ?1 AND available = 1 ORDER BY topic_id",
            TOPIC_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let topics = stmt
            .query_map(params![domain_id], Self::map_topic)?
            .collect::<SqliteResult<Vec<Topic>>>()?;
        Ok(topics)
    }

    pub fn list_topics(&self) -> RepositoryResult<Vec<Topic>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM topic ORDER BY topic_id", TOPIC_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let topics = stmt
            .query_map([], Self::map_topic)?
            .collect::<SqliteResult<Vec<Topic>>>()?;
        Ok(topics)
    }
}
