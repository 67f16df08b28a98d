// ==========================================
// 钞箱维修管理系统 - 服务工单仓储
// ==========================================
// 红线: Repository 不含业务逻辑,只负责数据访问
// 约束: RESOLVED 状态的写入一律经由对账引擎授权
// ==========================================

use crate::domain::service_order::{DeliveryRecord, ServiceOrder, ServiceOrderDetail};
use crate::domain::types::OrderStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    order_id, bank_id, cassette_id, status, resolved_at,
    deleted_at, created_at, updated_at
"#;

/// 服务工单仓储
/// 职责: 管理 service_order / service_order_detail / delivery_record 三表的数据访问
pub struct ServiceOrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ServiceOrderRepository {
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

    /// 创建服务工单
    pub fn create(&self, order: &ServiceOrder) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO service_order (
                order_id, bank_id, cassette_id, status, resolved_at,
                deleted_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                order.order_id,
                order.bank_id,
                order.cassette_id,
                order.status.to_db_str(),
                order.resolved_at,
                order.deleted_at,
                order.created_at,
                order.updated_at,
            ],
        )?;
        Ok(())
    }

    /// 追加工单明细行
    pub fn add_detail(&self, detail: &ServiceOrderDetail) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO service_order_detail (order_id, cassette_id, request_replacement)
            VALUES (?1, ?2, ?3)
            "#,
            params![detail.order_id, detail.cassette_id, detail.request_replacement],
        )?;
        Ok(())
    }

    /// 追加配送记录
    pub fn add_delivery(&self, delivery: &DeliveryRecord) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO delivery_record (delivery_id, order_id, cassette_id, delivered_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                delivery.delivery_id,
                delivery.order_id,
                delivery.cassette_id,
                delivery.delivered_at,
            ],
        )?;
        Ok(())
    }

    /// 按主键查询
    pub fn find_by_id(&self, order_id: &str) -> RepositoryResult<Option<ServiceOrder>> {
        let conn = self.get_conn()?;
        Self::find_by_id_with(&conn, order_id)
    }

    /// 按主键查询(事务内)
    pub fn find_by_id_with(
        conn: &Connection,
        order_id: &str,
    ) -> RepositoryResult<Option<ServiceOrder>> {
        let sql = format!(
            "SELECT {} FROM service_order WHERE order_id = ?1 AND deleted_at IS NULL",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let result = stmt.query_row(params![order_id], map_order_row);
        match result {
            Ok(order) => Ok(Some(order?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 按状态集合列出工单(批量对账的扫描范围)
    pub fn list_by_statuses(&self, statuses: &[OrderStatus]) -> RepositoryResult<Vec<ServiceOrder>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.get_conn()?;
        let placeholders = (0..statuses.len())
            .map(|i| format!("?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"SELECT {} FROM service_order
               WHERE status IN ({}) AND deleted_at IS NULL
               ORDER BY created_at ASC"#,
            SELECT_COLUMNS, placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let bind: Vec<&str> = statuses.iter().map(|s| s.to_db_str()).collect();
        let rows = stmt
            .query_map(rusqlite::params_from_iter(bind), map_order_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().collect()
    }

    /// 查询工单的明细行(事务内)
    pub fn find_details_with(
        conn: &Connection,
        order_id: &str,
    ) -> RepositoryResult<Vec<ServiceOrderDetail>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT order_id, cassette_id, request_replacement
            FROM service_order_detail
            WHERE order_id = ?1
            ORDER BY cassette_id ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![order_id], |row| {
                Ok(ServiceOrderDetail {
                    order_id: row.get(0)?,
                    cassette_id: row.get(1)?,
                    request_replacement: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// 解析工单覆盖的钞箱集合(事务内)
    ///
    /// 并集来源: 直接引用 ∪ 明细表 ∪ 配送表; 不去重,由调用方
    /// 去重并对重复项记录警告
    pub fn list_cassette_ids_with(
        conn: &Connection,
        order_id: &str,
    ) -> RepositoryResult<Vec<String>> {
        let mut ids: Vec<String> = Vec::new();

        let direct: Option<String> = conn
            .query_row(
                "SELECT cassette_id FROM service_order WHERE order_id = ?1 AND deleted_at IS NULL",
                params![order_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        if let Some(id) = direct {
            ids.push(id);
        }

        let mut stmt = conn.prepare(
            "SELECT cassette_id FROM service_order_detail WHERE order_id = ?1 ORDER BY cassette_id",
        )?;
        let detail_ids = stmt
            .query_map(params![order_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        ids.extend(detail_ids);

        let mut stmt = conn.prepare(
            "SELECT cassette_id FROM delivery_record WHERE order_id = ?1 ORDER BY delivered_at",
        )?;
        let delivery_ids = stmt
            .query_map(params![order_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        ids.extend(delivery_ids);

        Ok(ids)
    }

    /// 解析钞箱当前归属的服务工单(事务内)
    ///
    /// 优先级: 配送表(最新) > 明细表 > 直接引用; 已删除工单不参与
    pub fn find_owning_order_id_with(
        conn: &Connection,
        cassette_id: &str,
    ) -> RepositoryResult<Option<String>> {
        let by_delivery: Option<String> = conn
            .query_row(
                r#"
                SELECT d.order_id FROM delivery_record d
                JOIN service_order o ON o.order_id = d.order_id
                WHERE d.cassette_id = ?1 AND o.deleted_at IS NULL
                ORDER BY d.delivered_at DESC
                LIMIT 1
                "#,
                params![cassette_id],
                |row| row.get(0),
            )
            .optional()?;
        if by_delivery.is_some() {
            return Ok(by_delivery);
        }

        let by_detail: Option<String> = conn
            .query_row(
                r#"
                SELECT sd.order_id FROM service_order_detail sd
                JOIN service_order o ON o.order_id = sd.order_id
                WHERE sd.cassette_id = ?1 AND o.deleted_at IS NULL
                ORDER BY o.created_at DESC
                LIMIT 1
                "#,
                params![cassette_id],
                |row| row.get(0),
            )
            .optional()?;
        if by_detail.is_some() {
            return Ok(by_detail);
        }

        let by_direct: Option<String> = conn
            .query_row(
                r#"
                SELECT order_id FROM service_order
                WHERE cassette_id = ?1 AND deleted_at IS NULL
                ORDER BY created_at DESC
                LIMIT 1
                "#,
                params![cassette_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(by_direct)
    }

    /// 更新工单状态(事务内)
    ///
    /// resolved_at 随状态一并写入: RESOLVED 时为解决时刻,回退时清空
    pub fn update_status_with(
        conn: &Connection,
        order_id: &str,
        status: OrderStatus,
        resolved_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let affected = conn.execute(
            r#"
            UPDATE service_order
            SET status = ?2, resolved_at = ?3, updated_at = ?4
            WHERE order_id = ?1 AND deleted_at IS NULL
            "#,
            params![order_id, status.to_db_str(), resolved_at, now],
        )?;
        Ok(affected)
    }
}

// ==========================================
// 行映射
// ==========================================

/// 映射 service_order 行(状态字符串非法时报 FieldValueError)
fn map_order_row(row: &Row<'_>) -> rusqlite::Result<RepositoryResult<ServiceOrder>> {
    let status_str: String = row.get(3)?;
    Ok(match OrderStatus::from_db_str(&status_str) {
        Some(status) => Ok(ServiceOrder {
            order_id: row.get(0)?,
            bank_id: row.get(1)?,
            cassette_id: row.get(2)?,
            status,
            resolved_at: row.get(4)?,
            deleted_at: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        }),
        None => Err(RepositoryError::bad_field("service_order.status", &status_str)),
    })
}
