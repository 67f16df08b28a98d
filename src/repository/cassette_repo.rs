// ==========================================
// 钞箱维修管理系统 - 钞箱仓储
// ==========================================
// 红线: Repository 不含业务逻辑,只负责数据访问
// 约束: 所有查询过滤 deleted_at IS NULL (软删除不变式)
// ==========================================

use crate::domain::cassette::Cassette;
use crate::domain::types::CassetteStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    cassette_id, serial_number, bank_id, cassette_type, status,
    deleted_at, created_at, updated_at
"#;

/// 钞箱仓储
/// 职责: 管理 cassette 表的 CRUD 操作
pub struct CassetteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl CassetteRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建钞箱
    pub fn create(&self, cassette: &Cassette) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::create_with(&conn, cassette)
    }

    /// 创建钞箱(事务内)
    pub fn create_with(conn: &Connection, cassette: &Cassette) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO cassette (
                cassette_id, serial_number, bank_id, cassette_type, status,
                deleted_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                cassette.cassette_id,
                cassette.serial_number,
                cassette.bank_id,
                cassette.cassette_type,
                cassette.status.to_db_str(),
                cassette.deleted_at,
                cassette.created_at,
                cassette.updated_at,
            ],
        )?;
        Ok(())
    }

    /// 按主键查询
    pub fn find_by_id(&self, cassette_id: &str) -> RepositoryResult<Option<Cassette>> {
        let conn = self.get_conn()?;
        Self::find_by_id_with(&conn, cassette_id)
    }

    /// 按主键查询(事务内)
    pub fn find_by_id_with(
        conn: &Connection,
        cassette_id: &str,
    ) -> RepositoryResult<Option<Cassette>> {
        let sql = format!(
            "SELECT {} FROM cassette WHERE cassette_id = ?1 AND deleted_at IS NULL",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let result = stmt.query_row(params![cassette_id], map_cassette_row);
        match result {
            Ok(cassette) => Ok(Some(cassette?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 按序列号查询
    pub fn find_by_serial(&self, serial_number: &str) -> RepositoryResult<Option<Cassette>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM cassette WHERE serial_number = ?1 AND deleted_at IS NULL",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let result = stmt.query_row(params![serial_number], map_cassette_row);
        match result {
            Ok(cassette) => Ok(Some(cassette?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 按状态列出钞箱
    pub fn list_by_status(&self, status: CassetteStatus) -> RepositoryResult<Vec<Cassette>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"SELECT {} FROM cassette
               WHERE status = ?1 AND deleted_at IS NULL
               ORDER BY serial_number ASC"#,
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![status.to_db_str()], map_cassette_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().collect()
    }

    /// 更新钞箱状态
    pub fn update_status(
        &self,
        cassette_id: &str,
        status: CassetteStatus,
        now: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        Self::update_status_with(&conn, cassette_id, status, now)
    }

    /// 更新钞箱状态(事务内)
    pub fn update_status_with(
        conn: &Connection,
        cassette_id: &str,
        status: CassetteStatus,
        now: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let affected = conn.execute(
            r#"
            UPDATE cassette
            SET status = ?2, updated_at = ?3
            WHERE cassette_id = ?1 AND deleted_at IS NULL
            "#,
            params![cassette_id, status.to_db_str(), now],
        )?;
        Ok(affected)
    }
}

// ==========================================
// 行映射
// ==========================================

/// 映射 cassette 行(状态字符串非法时报 FieldValueError)
fn map_cassette_row(row: &Row<'_>) -> rusqlite::Result<RepositoryResult<Cassette>> {
    let status_str: String = row.get(4)?;
    Ok(match CassetteStatus::from_db_str(&status_str) {
        Some(status) => Ok(Cassette {
            cassette_id: row.get(0)?,
            serial_number: row.get(1)?,
            bank_id: row.get(2)?,
            cassette_type: row.get(3)?,
            status,
            deleted_at: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        }),
        None => Err(RepositoryError::bad_field("cassette.status", &status_str)),
    })
}
