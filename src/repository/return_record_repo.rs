// ==========================================
// 钞箱维修管理系统 - 取回记录仓储
// ==========================================
// 红线: Repository 不含业务逻辑,只负责数据访问
// ==========================================

use crate::domain::service_order::ReturnRecord;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// 取回记录仓储
/// 职责: 管理 return_record 表的数据访问
pub struct ReturnRecordRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ReturnRecordRepository {
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

    /// 写入取回记录(事务内)
    pub fn create_with(conn: &Connection, record: &ReturnRecord) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO return_record (
                return_id, order_id, cassette_id, picked_up_by, picked_up_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.return_id,
                record.order_id,
                record.cassette_id,
                record.picked_up_by,
                record.picked_up_at,
                record.created_at,
            ],
        )?;
        Ok(())
    }

    /// 查询钞箱最近一条取回记录
    pub fn find_latest_by_cassette(
        &self,
        cassette_id: &str,
    ) -> RepositoryResult<Option<ReturnRecord>> {
        let conn = self.get_conn()?;
        let record = conn
            .query_row(
                r#"
                SELECT return_id, order_id, cassette_id, picked_up_by, picked_up_at, created_at
                FROM return_record
                WHERE cassette_id = ?1
                ORDER BY picked_up_at DESC
                LIMIT 1
                "#,
                params![cassette_id],
                |row| {
                    Ok(ReturnRecord {
                        return_id: row.get(0)?,
                        order_id: row.get(1)?,
                        cassette_id: row.get(2)?,
                        picked_up_by: row.get(3)?,
                        picked_up_at: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}
