// ==========================================
// 钞箱维修管理系统 - 服务工单对账 API
// ==========================================
// 职责: 单工单对账、批量对账自愈 (sync_order_status)
// 红线: RESOLVED 只能由对账授权写入; 对账可重入、幂等
// ==========================================

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::service_order::ServiceOrder;
use crate::domain::types::{OrderStatus, RepairStatus};
use crate::engine::reconcile_core::{OrderUpdate, ReconcileCore, ReconcileInput};
use crate::repository::repair_ticket_repo::RepairTicketRepository;
use crate::repository::service_order_repo::ServiceOrderRepository;

// ==========================================
// SyncReport - 对账结果统计
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub checked: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

// ==========================================
// 对账编排 (事务内共享入口)
// ==========================================

/// 对单个服务工单执行一次对账,返回是否发生写入
///
/// 流程:
/// 1. 解析钞箱集合(直接 ∪ 明细 ∪ 配送),去重并对重复项告警
/// 2. 剔除置换请求钞箱(置换不阻塞对账,也不由对账驱动解决)
/// 3. 时间围栏内取每钞箱最新工单,交给纯函数派生
/// 4. 至多执行纯函数授权的一次状态写入
pub fn reconcile_order_with(
    conn: &Connection,
    order: &ServiceOrder,
    now: DateTime<Utc>,
) -> ApiResult<bool> {
    let raw_ids = ServiceOrderRepository::list_cassette_ids_with(conn, &order.order_id)?;

    // 去重,重复项告警(多来源并集里同一钞箱出现多次属常见脏数据)
    let mut seen: HashSet<&str> = HashSet::new();
    let mut cassette_ids: Vec<String> = Vec::with_capacity(raw_ids.len());
    for id in &raw_ids {
        if seen.insert(id.as_str()) {
            cassette_ids.push(id.clone());
        } else {
            tracing::warn!(order_id = %order.order_id, cassette_id = %id, "工单钞箱集合存在重复项,已去重");
        }
    }

    let details = ServiceOrderRepository::find_details_with(conn, &order.order_id)?;
    let replacement: HashSet<&str> = details
        .iter()
        .filter(|d| d.request_replacement)
        .map(|d| d.cassette_id.as_str())
        .collect();

    let repair_ids: Vec<String> = cassette_ids
        .iter()
        .filter(|id| !replacement.contains(id.as_str()))
        .cloned()
        .collect();
    let replacement_only = repair_ids.is_empty() && !cassette_ids.is_empty();

    if !replacement.is_empty() && !repair_ids.is_empty() {
        // 混合工单: 按维修子集单独驱动 RESOLVED (决策记录见 DESIGN.md)
        tracing::debug!(
            order_id = %order.order_id,
            replacement = replacement.len(),
            repair = repair_ids.len(),
            "混合置换/维修工单,以维修子集判定解决"
        );
    }

    let tickets = RepairTicketRepository::find_for_order_with(conn, &repair_ids, order.created_at)?;
    let latest = ReconcileCore::latest_per_cassette(&tickets);
    let statuses: Vec<RepairStatus> = latest.values().map(|t| t.status).collect();

    let input = ReconcileInput {
        order_status: order.status,
        repair_cassette_count: repair_ids.len(),
        latest_statuses: &statuses,
        replacement_only,
    };

    match ReconcileCore::reconcile(&input, now) {
        Some(OrderUpdate::Resolve { resolved_at }) => {
            ServiceOrderRepository::update_status_with(
                conn,
                &order.order_id,
                OrderStatus::Resolved,
                Some(resolved_at),
                now,
            )?;
            tracing::info!(order_id = %order.order_id, "服务工单全部维修完成,标记 RESOLVED");
            Ok(true)
        }
        Some(OrderUpdate::Reopen) => {
            ServiceOrderRepository::update_status_with(
                conn,
                &order.order_id,
                OrderStatus::InProgress,
                None,
                now,
            )?;
            tracing::warn!(order_id = %order.order_id, "RESOLVED 与工单实况不符,回退 IN_PROGRESS");
            Ok(true)
        }
        None => Ok(false),
    }
}

// ==========================================
// OrderApi - 服务工单对账 API
// ==========================================

/// 服务工单对账 API
///
/// 职责:
/// 1. 单工单对账(维修完成后内联触发的同一算法)
/// 2. 批量对账自愈(修复因触发缺失而失步的工单状态)
pub struct OrderApi {
    conn: Arc<Mutex<Connection>>,
    order_repo: ServiceOrderRepository,
}

impl OrderApi {
    /// 创建新的 OrderApi 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        let order_repo = ServiceOrderRepository::from_connection(conn.clone());
        Self { conn, order_repo }
    }

    /// 对账入口
    ///
    /// # 参数
    /// - `order_id`: Some 时只对账该工单; None 时扫描全部 IN_PROGRESS/RECEIVED 工单
    ///
    /// # 返回
    /// SyncReport { checked, updated, errors }; 单工单的错误直接上抛,
    /// 批量模式下按工单收集进 errors,不中断整个扫描
    pub fn sync_order_status(&self, order_id: Option<&str>) -> ApiResult<SyncReport> {
        match order_id {
            Some(id) => self.sync_single(id),
            None => self.sync_all(),
        }
    }

    fn sync_single(&self, order_id: &str) -> ApiResult<SyncReport> {
        let order = self
            .order_repo
            .find_by_id(order_id)?
            .ok_or_else(|| ApiError::NotFound(format!("ServiceOrder (id={})", order_id)))?;

        let updated = self.reconcile_in_tx(&order)?;
        Ok(SyncReport {
            checked: 1,
            updated: usize::from(updated),
            errors: Vec::new(),
        })
    }

    fn sync_all(&self) -> ApiResult<SyncReport> {
        let orders = self
            .order_repo
            .list_by_statuses(&[OrderStatus::InProgress, OrderStatus::Received])?;

        let mut report = SyncReport {
            checked: 0,
            updated: 0,
            errors: Vec::new(),
        };
        for order in orders {
            report.checked += 1;
            match self.reconcile_in_tx(&order) {
                Ok(true) => report.updated += 1,
                Ok(false) => {}
                // 单个工单的失败不阻断其余工单的自愈
                Err(e) => {
                    tracing::error!(order_id = %order.order_id, error = %e, "工单对账失败,跳过");
                    report.errors.push(format!("{}: {}", order.order_id, e));
                }
            }
        }
        tracing::info!(
            checked = report.checked,
            updated = report.updated,
            errors = report.errors.len(),
            "批量对账完成"
        );
        Ok(report)
    }

    /// 在单事务内执行一次对账
    fn reconcile_in_tx(&self, order: &ServiceOrder) -> ApiResult<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ApiError::DatabaseError(format!("锁获取失败: {}", e)))?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| ApiError::DatabaseError(format!("事务开启失败: {}", e)))?;
        let updated = reconcile_order_with(&tx, order, Utc::now())?;
        tx.commit()
            .map_err(|e| ApiError::DatabaseError(format!("事务提交失败: {}", e)))?;
        Ok(updated)
    }
}
