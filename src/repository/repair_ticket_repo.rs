// ==========================================
// 钞箱维修管理系统 - 维修工单仓储
// ==========================================
// 红线: Repository 不含业务逻辑,只负责数据访问
// 约束: 除留存清理外,所有查询过滤 deleted_at IS NULL
// 约束: created_at 一经写入不可变(时间围栏边界)
// ==========================================

use crate::domain::repair_ticket::RepairTicket;
use crate::domain::types::RepairStatus;
use crate::domain::warranty::WarrantySnapshot;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    ticket_id, cassette_id, order_id, reported_issue, status,
    qc_passed, assigned_to, action_taken, parts_replaced,
    warranty_type, warranty_period_days, warranty_start_date, warranty_end_date,
    warranty_claim_count, warranty_claimed, claimed_from_ticket_id,
    completed_at, deleted_at, created_at, updated_at
"#;

// ==========================================
// PendingReturnCandidate - 待取回候选行
// ==========================================
// 维修完成且质检通过、仍滞留中心、无取回记录的钞箱
#[derive(Debug, Clone)]
pub struct PendingReturnCandidate {
    pub cassette_id: String,
    pub serial_number: String,
    pub bank_id: String,
    pub ticket_id: String,
    pub order_id: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// 维修工单仓储
/// 职责: 管理 repair_ticket 表的 CRUD 与条件更新
pub struct RepairTicketRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RepairTicketRepository {
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

    /// 创建工单(事务内)
    pub fn create_with(conn: &Connection, ticket: &RepairTicket) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO repair_ticket (
                ticket_id, cassette_id, order_id, reported_issue, status,
                qc_passed, assigned_to, action_taken, parts_replaced,
                warranty_type, warranty_period_days, warranty_start_date, warranty_end_date,
                warranty_claim_count, warranty_claimed, claimed_from_ticket_id,
                completed_at, deleted_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                      ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            "#,
            params![
                ticket.ticket_id,
                ticket.cassette_id,
                ticket.order_id,
                ticket.reported_issue,
                ticket.status.to_db_str(),
                ticket.qc_passed,
                ticket.assigned_to,
                ticket.action_taken,
                ticket.parts_replaced,
                ticket.warranty_type,
                ticket.warranty_period_days,
                ticket.warranty_start_date,
                ticket.warranty_end_date,
                ticket.warranty_claim_count,
                ticket.warranty_claimed,
                ticket.claimed_from_ticket_id,
                ticket.completed_at,
                ticket.deleted_at,
                ticket.created_at,
                ticket.updated_at,
            ],
        )?;
        Ok(())
    }

    /// 创建工单
    pub fn create(&self, ticket: &RepairTicket) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::create_with(&conn, ticket)
    }

    /// 按主键查询(不含软删除)
    pub fn find_by_id(&self, ticket_id: &str) -> RepositoryResult<Option<RepairTicket>> {
        let conn = self.get_conn()?;
        Self::find_by_id_with(&conn, ticket_id)
    }

    /// 按主键查询(事务内)
    pub fn find_by_id_with(
        conn: &Connection,
        ticket_id: &str,
    ) -> RepositoryResult<Option<RepairTicket>> {
        let sql = format!(
            "SELECT {} FROM repair_ticket WHERE ticket_id = ?1 AND deleted_at IS NULL",
            SELECT_COLUMNS
        );
        query_optional(conn, &sql, params![ticket_id])
    }

    /// 查询钞箱当前活跃工单(RECEIVED/DIAGNOSING/ON_PROGRESS)
    ///
    /// 不变式: 至多一条; 历史脏数据多条时取最新创建的
    pub fn find_active_by_cassette(
        &self,
        cassette_id: &str,
    ) -> RepositoryResult<Option<RepairTicket>> {
        let conn = self.get_conn()?;
        Self::find_active_by_cassette_with(&conn, cassette_id)
    }

    /// 查询钞箱当前活跃工单(事务内)
    pub fn find_active_by_cassette_with(
        conn: &Connection,
        cassette_id: &str,
    ) -> RepositoryResult<Option<RepairTicket>> {
        let sql = format!(
            r#"SELECT {} FROM repair_ticket
               WHERE cassette_id = ?1
                 AND deleted_at IS NULL
                 AND status IN ('RECEIVED', 'DIAGNOSING', 'ON_PROGRESS')
               ORDER BY created_at DESC
               LIMIT 1"#,
            SELECT_COLUMNS
        );
        query_optional(conn, &sql, params![cassette_id])
    }

    /// 查询钞箱最近一次完成且质检通过的工单
    pub fn find_latest_qc_passed(
        &self,
        cassette_id: &str,
    ) -> RepositoryResult<Option<RepairTicket>> {
        let conn = self.get_conn()?;
        Self::find_latest_qc_passed_with(&conn, cassette_id)
    }

    /// 查询钞箱最近一次完成且质检通过的工单(事务内)
    pub fn find_latest_qc_passed_with(
        conn: &Connection,
        cassette_id: &str,
    ) -> RepositoryResult<Option<RepairTicket>> {
        let sql = format!(
            r#"SELECT {} FROM repair_ticket
               WHERE cassette_id = ?1
                 AND deleted_at IS NULL
                 AND status = 'COMPLETED'
                 AND qc_passed = 1
               ORDER BY completed_at DESC
               LIMIT 1"#,
            SELECT_COLUMNS
        );
        query_optional(conn, &sql, params![cassette_id])
    }

    /// 查询钞箱最近一次保修仍有效的质检通过完成工单(事务内)
    ///
    /// 新工单携带的已过期快照不遮蔽旧工单仍有效的保修,
    /// 故按 warranty_end_date 过滤而非只取最新一张
    pub fn find_latest_valid_warranty_with(
        conn: &Connection,
        cassette_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Option<RepairTicket>> {
        let sql = format!(
            r#"SELECT {} FROM repair_ticket
               WHERE cassette_id = ?1
                 AND deleted_at IS NULL
                 AND status = 'COMPLETED'
                 AND qc_passed = 1
                 AND warranty_end_date >= ?2
               ORDER BY completed_at DESC
               LIMIT 1"#,
            SELECT_COLUMNS
        );
        query_optional(conn, &sql, params![cassette_id, now])
    }

    /// 查询一组钞箱在时间围栏之后的全部工单(对账输入)
    ///
    /// # 参数
    /// - `cassette_ids`: 工单覆盖的钞箱集合
    /// - `since`: 服务工单创建时间(围栏下界, 含)
    ///
    /// # 返回
    /// 按 created_at 降序; 调用方取每钞箱最新一条
    pub fn find_for_order_with(
        conn: &Connection,
        cassette_ids: &[String],
        since: DateTime<Utc>,
    ) -> RepositoryResult<Vec<RepairTicket>> {
        if cassette_ids.is_empty() {
            return Ok(Vec::new());
        }
        // IN 子句动态占位符(?2 起; ?1 为时间围栏)
        let placeholders = (0..cassette_ids.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"SELECT {} FROM repair_ticket
               WHERE created_at >= ?1
                 AND deleted_at IS NULL
                 AND cassette_id IN ({})
               ORDER BY created_at DESC"#,
            SELECT_COLUMNS, placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut bind: Vec<Box<dyn rusqlite::ToSql>> = Vec::with_capacity(cassette_ids.len() + 1);
        bind.push(Box::new(since));
        for id in cassette_ids {
            bind.push(Box::new(id.clone()));
        }
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(bind.iter().map(|p| p.as_ref())),
                map_ticket_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().collect()
    }

    /// 领单(条件更新,幂等"抢单")
    ///
    /// 仅当未分配或已分配给同一用户时生效; 返回受影响行数,
    /// 0 行时由调用方区分 NotFound / Conflict
    pub fn assign_take(
        &self,
        ticket_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE repair_ticket
            SET assigned_to = ?2,
                status = CASE WHEN status = 'RECEIVED' THEN 'DIAGNOSING' ELSE status END,
                updated_at = ?3
            WHERE ticket_id = ?1
              AND deleted_at IS NULL
              AND status <> 'COMPLETED'
              AND (assigned_to IS NULL OR assigned_to = ?2)
            "#,
            params![ticket_id, user_id, now],
        )?;
        Ok(affected)
    }

    /// 更新工单状态(事务内)
    pub fn update_status_with(
        conn: &Connection,
        ticket_id: &str,
        status: RepairStatus,
        now: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let affected = conn.execute(
            r#"
            UPDATE repair_ticket
            SET status = ?2, updated_at = ?3
            WHERE ticket_id = ?1 AND deleted_at IS NULL
            "#,
            params![ticket_id, status.to_db_str(), now],
        )?;
        Ok(affected)
    }

    /// 完成工单(条件更新; 已完成的行不再生效)
    ///
    /// # 返回
    /// 受影响行数; 0 表示竞态下已被其他调用完成
    #[allow(clippy::too_many_arguments)]
    pub fn complete_with(
        conn: &Connection,
        ticket_id: &str,
        qc_passed: bool,
        action_taken: &str,
        parts_replaced: Option<&str>,
        warranty: Option<&WarrantySnapshot>,
        completed_at: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let affected = conn.execute(
            r#"
            UPDATE repair_ticket
            SET status = 'COMPLETED',
                qc_passed = ?2,
                action_taken = ?3,
                parts_replaced = ?4,
                warranty_type = ?5,
                warranty_period_days = ?6,
                warranty_start_date = ?7,
                warranty_end_date = ?8,
                completed_at = ?9,
                updated_at = ?9
            WHERE ticket_id = ?1
              AND deleted_at IS NULL
              AND status <> 'COMPLETED'
            "#,
            params![
                ticket_id,
                qc_passed,
                action_taken,
                parts_replaced,
                warranty.map(|w| w.warranty_type.to_db_str()),
                warranty.map(|w| w.period_days),
                warranty.map(|w| w.start_date),
                warranty.map(|w| w.end_date),
                completed_at,
            ],
        )?;
        Ok(affected)
    }

    /// 重开工单(条件更新: 仅 COMPLETED 可重开)
    ///
    /// 清空质检结论、完成时间与保修快照,状态回到 DIAGNOSING
    pub fn reopen_with(
        conn: &Connection,
        ticket_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let affected = conn.execute(
            r#"
            UPDATE repair_ticket
            SET status = 'DIAGNOSING',
                qc_passed = NULL,
                completed_at = NULL,
                warranty_type = NULL,
                warranty_period_days = NULL,
                warranty_start_date = NULL,
                warranty_end_date = NULL,
                updated_at = ?2
            WHERE ticket_id = ?1
              AND deleted_at IS NULL
              AND status = 'COMPLETED'
            "#,
            params![ticket_id, now],
        )?;
        Ok(affected)
    }

    /// 软删除工单(事务内)
    pub fn soft_delete_with(
        conn: &Connection,
        ticket_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let affected = conn.execute(
            r#"
            UPDATE repair_ticket
            SET deleted_at = ?2, updated_at = ?2
            WHERE ticket_id = ?1 AND deleted_at IS NULL
            "#,
            params![ticket_id, now],
        )?;
        Ok(affected)
    }

    /// 索赔记账(事务内): 原工单计数 +1 并标记已索赔
    pub fn record_claim_on_original_with(
        conn: &Connection,
        original_ticket_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let affected = conn.execute(
            r#"
            UPDATE repair_ticket
            SET warranty_claim_count = warranty_claim_count + 1,
                warranty_claimed = 1,
                updated_at = ?2
            WHERE ticket_id = ?1 AND deleted_at IS NULL
            "#,
            params![original_ticket_id, now],
        )?;
        Ok(affected)
    }

    /// 索赔链接(事务内): 新工单记录索赔来源
    pub fn link_claim_source_with(
        conn: &Connection,
        new_ticket_id: &str,
        original_ticket_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<usize> {
        let affected = conn.execute(
            r#"
            UPDATE repair_ticket
            SET claimed_from_ticket_id = ?2, updated_at = ?3
            WHERE ticket_id = ?1 AND deleted_at IS NULL
            "#,
            params![new_ticket_id, original_ticket_id, now],
        )?;
        Ok(affected)
    }

    /// 留存清理: 硬删除软删除时间早于 cutoff 的工单
    ///
    /// 唯一允许绕过 deleted_at IS NULL 过滤的操作; 幂等,可重复执行
    pub fn purge_soft_deleted_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM repair_ticket WHERE deleted_at IS NOT NULL AND deleted_at < ?1",
            params![cutoff],
        )?;
        Ok(affected)
    }

    /// 查询待取回候选: IN_REPAIR 且最新工单完成+质检通过且无取回记录
    pub fn find_pending_return_candidates(
        &self,
    ) -> RepositoryResult<Vec<PendingReturnCandidate>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT c.cassette_id, c.serial_number, c.bank_id,
                   t.ticket_id, t.order_id, t.completed_at
            FROM cassette c
            JOIN repair_ticket t ON t.cassette_id = c.cassette_id
            WHERE c.status = 'IN_REPAIR'
              AND c.deleted_at IS NULL
              AND t.deleted_at IS NULL
              AND t.status = 'COMPLETED'
              AND t.qc_passed = 1
              AND t.created_at = (
                    SELECT MAX(t2.created_at) FROM repair_ticket t2
                    WHERE t2.cassette_id = c.cassette_id AND t2.deleted_at IS NULL
              )
              AND NOT EXISTS (
                    SELECT 1 FROM return_record r
                    WHERE r.cassette_id = c.cassette_id
                      AND (r.order_id = t.order_id
                           OR (r.order_id IS NULL AND t.order_id IS NULL))
              )
            ORDER BY t.completed_at ASC
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PendingReturnCandidate {
                    cassette_id: row.get(0)?,
                    serial_number: row.get(1)?,
                    bank_id: row.get(2)?,
                    ticket_id: row.get(3)?,
                    order_id: row.get(4)?,
                    completed_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ==========================================
// 行映射与查询辅助
// ==========================================

fn query_optional(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> RepositoryResult<Option<RepairTicket>> {
    let mut stmt = conn.prepare(sql)?;
    let result = stmt.query_row(params, map_ticket_row);
    match result {
        Ok(ticket) => Ok(Some(ticket?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// 映射 repair_ticket 行(状态字符串非法时报 FieldValueError)
fn map_ticket_row(row: &Row<'_>) -> rusqlite::Result<RepositoryResult<RepairTicket>> {
    let status_str: String = row.get(4)?;
    Ok(match RepairStatus::from_db_str(&status_str) {
        Some(status) => Ok(RepairTicket {
            ticket_id: row.get(0)?,
            cassette_id: row.get(1)?,
            order_id: row.get(2)?,
            reported_issue: row.get(3)?,
            status,
            qc_passed: row.get(5)?,
            assigned_to: row.get(6)?,
            action_taken: row.get(7)?,
            parts_replaced: row.get(8)?,
            warranty_type: row.get(9)?,
            warranty_period_days: row.get(10)?,
            warranty_start_date: row.get(11)?,
            warranty_end_date: row.get(12)?,
            warranty_claim_count: row.get(13)?,
            warranty_claimed: row.get(14)?,
            claimed_from_ticket_id: row.get(15)?,
            completed_at: row.get(16)?,
            deleted_at: row.get(17)?,
            created_at: row.get(18)?,
            updated_at: row.get(19)?,
        }),
        None => Err(RepositoryError::bad_field("repair_ticket.status", &status_str)),
    })
}
