// ==========================================
// 钞箱维修管理系统 - 维修工单生命周期 API
// ==========================================
// 职责: 工单创建(单箱/批量)、领单、完成、重开、取回确认
// 红线: 多步写入一律单事务; 完成后内联触发服务工单对账
// 红线: 保修计算失败只降级告警,不阻断维修结果落库
// ==========================================

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::order_api::reconcile_order_with;
use crate::domain::cassette::Cassette;
use crate::domain::repair_ticket::RepairTicket;
use crate::domain::service_order::ReturnRecord;
use crate::domain::types::{CassetteStatus, RepairStatus, WarrantyType};
use crate::domain::warranty::WarrantySnapshot;
use crate::engine::warranty_core::WarrantyCore;
use crate::repository::cassette_repo::CassetteRepository;
use crate::repository::repair_ticket_repo::RepairTicketRepository;
use crate::repository::return_record_repo::ReturnRecordRepository;
use crate::repository::service_order_repo::ServiceOrderRepository;
use crate::repository::warranty_config_repo::WarrantyConfigRepository;

/// 批量创建的钞箱数硬上限
///
/// 防御畸形导入的护栏,不是可放宽的业务参数
pub const BULK_REPAIR_MAX_CASSETTES: usize = 30;

// ==========================================
// SkippedCassette - 批量创建跳过项
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedCassette {
    pub cassette_id: String,
    pub reason: String,
}

// ==========================================
// BulkRepairOutcome - 批量创建结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRepairOutcome {
    pub created: Vec<RepairTicket>,
    pub skipped: Vec<SkippedCassette>,
    pub count: usize,
    pub skipped_count: usize,
}

// ==========================================
// RepairApi - 维修工单生命周期 API
// ==========================================

/// 维修工单生命周期 API
///
/// 职责:
/// 1. 工单创建(单箱接收、按服务工单批量接收)
/// 2. 领单与进度流转
/// 3. 完成(质检结论 + 保修快照 + 钞箱状态 + 工单对账,单事务)
/// 4. 取回确认(钞箱回到 OK)
pub struct RepairApi {
    conn: Arc<Mutex<Connection>>,
    ticket_repo: RepairTicketRepository,
}

impl RepairApi {
    /// 创建新的 RepairApi 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        let ticket_repo = RepairTicketRepository::from_connection(conn.clone());
        Self { conn, ticket_repo }
    }

    fn lock_conn(&self) -> ApiResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ApiError::DatabaseError(format!("锁获取失败: {}", e)))
    }

    // ==========================================
    // 创建
    // ==========================================

    /// 单箱接收: 创建工单并把钞箱转入维修中(单事务)
    ///
    /// # 前置
    /// 钞箱状态 ∈ {IN_TRANSIT_TO_RC, BAD}; 报废箱与已有活跃工单的箱拒绝
    pub fn create_repair(&self, cassette_id: &str, reported_issue: &str) -> ApiResult<RepairTicket> {
        if reported_issue.trim().is_empty() {
            return Err(ApiError::InvalidInput("报障描述不能为空".to_string()));
        }

        let conn = self.lock_conn()?;
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now();

        let cassette = CassetteRepository::find_by_id_with(&tx, cassette_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Cassette (id={})", cassette_id)))?;

        if !matches!(
            cassette.status,
            CassetteStatus::InTransitToRc | CassetteStatus::Bad
        ) {
            return Err(ApiError::InvalidState {
                entity: "Cassette".to_string(),
                from: cassette.status.to_string(),
                to: CassetteStatus::InRepair.to_string(),
            });
        }

        if let Some(active) = RepairTicketRepository::find_active_by_cassette_with(&tx, cassette_id)? {
            return Err(ApiError::BusinessRuleViolation(format!(
                "钞箱已存在活跃工单: {}",
                active.ticket_id
            )));
        }

        let ticket = RepairTicket::new_received(
            Uuid::new_v4().to_string(),
            cassette_id.to_string(),
            None,
            reported_issue.to_string(),
            now,
        );
        RepairTicketRepository::create_with(&tx, &ticket)?;
        CassetteRepository::update_status_with(&tx, cassette_id, CassetteStatus::InRepair, now)?;

        tx.commit()?;
        tracing::info!(ticket_id = %ticket.ticket_id, cassette_id, "单箱接收,工单已创建");
        Ok(ticket)
    }

    /// 按服务工单批量接收(单事务,幂等重试安全)
    ///
    /// # 规则
    /// - 钞箱集合 = 直接引用 ∪ 明细表 ∪ 配送表,按 id 去重(重复告警)
    /// - 硬上限 30 箱,超出整体失败 LimitExceeded
    /// - 已有本工单活跃工单的箱跳过; 活跃工单属其他/已删工单的箱,
    ///   软删旧工单后重建
    /// - 钞箱状态自愈(IN_DELIVERY/OK → IN_TRANSIT_TO_RC)而非直接拒绝
    /// - 至少新建 1 张工单时才把服务工单推进到 IN_PROGRESS
    pub fn create_bulk_repairs(&self, order_id: &str) -> ApiResult<BulkRepairOutcome> {
        let conn = self.lock_conn()?;
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now();

        let order = ServiceOrderRepository::find_by_id_with(&tx, order_id)?
            .ok_or_else(|| ApiError::NotFound(format!("ServiceOrder (id={})", order_id)))?;

        let raw_ids = ServiceOrderRepository::list_cassette_ids_with(&tx, order_id)?;
        let mut seen: HashSet<&str> = HashSet::new();
        let mut cassette_ids: Vec<String> = Vec::with_capacity(raw_ids.len());
        for id in &raw_ids {
            if seen.insert(id.as_str()) {
                cassette_ids.push(id.clone());
            } else {
                tracing::warn!(order_id, cassette_id = %id, "批量创建输入存在重复钞箱,已去重");
            }
        }

        if cassette_ids.is_empty() {
            return Err(ApiError::BusinessRuleViolation(format!(
                "工单未关联任何钞箱: {}",
                order_id
            )));
        }
        if cassette_ids.len() > BULK_REPAIR_MAX_CASSETTES {
            return Err(ApiError::LimitExceeded {
                actual: cassette_ids.len(),
                limit: BULK_REPAIR_MAX_CASSETTES,
            });
        }

        let details = ServiceOrderRepository::find_details_with(&tx, order_id)?;
        let replacement: HashSet<&str> = details
            .iter()
            .filter(|d| d.request_replacement)
            .map(|d| d.cassette_id.as_str())
            .collect();

        let mut created: Vec<RepairTicket> = Vec::new();
        let mut skipped: Vec<SkippedCassette> = Vec::new();

        for cassette_id in &cassette_ids {
            if replacement.contains(cassette_id.as_str()) {
                skipped.push(SkippedCassette {
                    cassette_id: cassette_id.clone(),
                    reason: "置换请求,不开维修工单".to_string(),
                });
                continue;
            }

            let Some(cassette) = CassetteRepository::find_by_id_with(&tx, cassette_id)? else {
                skipped.push(SkippedCassette {
                    cassette_id: cassette_id.clone(),
                    reason: "钞箱不存在".to_string(),
                });
                continue;
            };
            if cassette.is_scrapped() {
                skipped.push(SkippedCassette {
                    cassette_id: cassette_id.clone(),
                    reason: "钞箱已报废".to_string(),
                });
                continue;
            }

            if let Some(active) =
                RepairTicketRepository::find_active_by_cassette_with(&tx, cassette_id)?
            {
                if active.order_id.as_deref() == Some(order_id) {
                    // 幂等重试: 本工单已开过,跳过
                    skipped.push(SkippedCassette {
                        cassette_id: cassette_id.clone(),
                        reason: format!("已存在本工单的活跃工单: {}", active.ticket_id),
                    });
                    continue;
                }
                // 活跃工单挂在其他(或已删)工单上,软删后重建
                tracing::warn!(
                    order_id,
                    cassette_id = %cassette_id,
                    stale_ticket = %active.ticket_id,
                    stale_order = ?active.order_id,
                    "钞箱存在挂在其他工单上的活跃工单,软删后重建"
                );
                RepairTicketRepository::soft_delete_with(&tx, &active.ticket_id, now)?;
            }

            // 状态自愈: 上游未及时同步时不拒单
            if matches!(
                cassette.status,
                CassetteStatus::InDelivery | CassetteStatus::Ok
            ) {
                tracing::warn!(
                    cassette_id = %cassette_id,
                    from = %cassette.status,
                    "钞箱状态自愈为 IN_TRANSIT_TO_RC 后接收"
                );
                CassetteRepository::update_status_with(
                    &tx,
                    cassette_id,
                    CassetteStatus::InTransitToRc,
                    now,
                )?;
            }

            let ticket = RepairTicket::new_received(
                Uuid::new_v4().to_string(),
                cassette_id.clone(),
                Some(order_id.to_string()),
                format!("批量接收 (服务工单 {})", order_id),
                now,
            );
            RepairTicketRepository::create_with(&tx, &ticket)?;
            CassetteRepository::update_status_with(&tx, cassette_id, CassetteStatus::InRepair, now)?;
            created.push(ticket);
        }

        if !created.is_empty() && order.status != crate::domain::types::OrderStatus::InProgress {
            ServiceOrderRepository::update_status_with(
                &tx,
                order_id,
                crate::domain::types::OrderStatus::InProgress,
                None,
                now,
            )?;
        }

        tx.commit()?;
        tracing::info!(
            order_id,
            created = created.len(),
            skipped = skipped.len(),
            "批量接收完成"
        );
        Ok(BulkRepairOutcome {
            count: created.len(),
            skipped_count: skipped.len(),
            created,
            skipped,
        })
    }

    // ==========================================
    // 进度流转
    // ==========================================

    /// 领单(幂等"抢单"): 未分配或已属本人时成功
    ///
    /// 单行条件更新即可,领单竞态罕见且最后写入不破坏数据
    pub fn assign(&self, ticket_id: &str, user_id: &str) -> ApiResult<RepairTicket> {
        let now = Utc::now();
        let affected = self.ticket_repo.assign_take(ticket_id, user_id, now)?;
        if affected == 1 {
            return self
                .ticket_repo
                .find_by_id(ticket_id)?
                .ok_or_else(|| ApiError::NotFound(format!("RepairTicket (id={})", ticket_id)));
        }

        // 0 行生效: 区分不存在 / 已完成 / 已被他人领取
        let ticket = self
            .ticket_repo
            .find_by_id(ticket_id)?
            .ok_or_else(|| ApiError::NotFound(format!("RepairTicket (id={})", ticket_id)))?;
        if ticket.status == RepairStatus::Completed {
            return Err(ApiError::AlreadyCompleted(ticket_id.to_string()));
        }
        match ticket.assigned_to {
            Some(assigned_to) if assigned_to != user_id => Err(ApiError::Conflict {
                ticket_id: ticket_id.to_string(),
                assigned_to,
            }),
            _ => Err(ApiError::BusinessRuleViolation(format!(
                "领单未生效: {}",
                ticket_id
            ))),
        }
    }

    /// 开始维修: DIAGNOSING → ON_PROGRESS
    pub fn start_progress(&self, ticket_id: &str) -> ApiResult<RepairTicket> {
        let conn = self.lock_conn()?;
        let now = Utc::now();

        let ticket = RepairTicketRepository::find_by_id_with(&conn, ticket_id)?
            .ok_or_else(|| ApiError::NotFound(format!("RepairTicket (id={})", ticket_id)))?;
        if ticket.status != RepairStatus::Diagnosing {
            return Err(ApiError::InvalidState {
                entity: "RepairTicket".to_string(),
                from: ticket.status.to_string(),
                to: RepairStatus::OnProgress.to_string(),
            });
        }
        RepairTicketRepository::update_status_with(&conn, ticket_id, RepairStatus::OnProgress, now)?;
        RepairTicketRepository::find_by_id_with(&conn, ticket_id)?
            .ok_or_else(|| ApiError::NotFound(format!("RepairTicket (id={})", ticket_id)))
    }

    // ==========================================
    // 完成
    // ==========================================

    /// 完成工单(单事务)
    ///
    /// 事务内依次: 保修快照(可降级) → 工单 COMPLETED → 归属服务工单
    /// 对账 → 钞箱状态按三分支流转
    ///
    /// # 钞箱分支
    /// - 明细带置换请求 → SCRAPPED (置换一律报废旧箱)
    /// - 质检通过 → 保持 IN_REPAIR,等取回确认后才回 OK
    /// - 质检不通过 → SCRAPPED
    pub fn complete_repair(
        &self,
        ticket_id: &str,
        qc_passed: bool,
        action_taken: &str,
        parts_replaced: Option<&str>,
    ) -> ApiResult<RepairTicket> {
        // 部件清单必须是合法 JSON 数组
        if let Some(parts) = parts_replaced {
            match serde_json::from_str::<serde_json::Value>(parts) {
                Ok(value) if value.is_array() => {}
                _ => {
                    return Err(ApiError::InvalidInput(
                        "parts_replaced 必须是 JSON 数组".to_string(),
                    ))
                }
            }
        }

        let conn = self.lock_conn()?;
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now();

        let ticket = RepairTicketRepository::find_by_id_with(&tx, ticket_id)?
            .ok_or_else(|| ApiError::NotFound(format!("RepairTicket (id={})", ticket_id)))?;
        if ticket.status == RepairStatus::Completed {
            return Err(ApiError::AlreadyCompleted(ticket_id.to_string()));
        }

        let cassette = CassetteRepository::find_by_id_with(&tx, &ticket.cassette_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Cassette (id={})", ticket.cassette_id)))?;

        // 保修快照: 失败只降级,维修结果优先落库
        let warranty = if qc_passed {
            match self.build_warranty_snapshot(&tx, &cassette, now) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!(
                        ticket_id,
                        cassette_id = %cassette.cassette_id,
                        error = %e,
                        "保修计算失败,本次完成不带保修信息"
                    );
                    None
                }
            }
        } else {
            None
        };

        let affected = RepairTicketRepository::complete_with(
            &tx,
            ticket_id,
            qc_passed,
            action_taken,
            parts_replaced,
            warranty.as_ref(),
            now,
        )?;
        if affected == 0 {
            // 条件更新竞态兜底: 他处已先行完成
            return Err(ApiError::AlreadyCompleted(ticket_id.to_string()));
        }

        // 归属解析: 工单携带 > 配送表 > 明细表 > 直接引用
        let order_id = match &ticket.order_id {
            Some(id) => Some(id.clone()),
            None => ServiceOrderRepository::find_owning_order_id_with(&tx, &ticket.cassette_id)?,
        };

        let replacement_requested = match &order_id {
            Some(id) => ServiceOrderRepository::find_details_with(&tx, id)?
                .iter()
                .any(|d| d.cassette_id == ticket.cassette_id && d.request_replacement),
            None => false,
        };

        // 钞箱三分支
        let next_status = if replacement_requested {
            Some(CassetteStatus::Scrapped)
        } else if qc_passed {
            // 质检通过: 人未取走,箱子留在中心
            match cassette.status {
                CassetteStatus::InRepair => None,
                _ => Some(CassetteStatus::InRepair),
            }
        } else {
            Some(CassetteStatus::Scrapped)
        };
        if let Some(status) = next_status {
            CassetteRepository::update_status_with(&tx, &ticket.cassette_id, status, now)?;
        }

        if let Some(id) = &order_id {
            if let Some(order) = ServiceOrderRepository::find_by_id_with(&tx, id)? {
                reconcile_order_with(&tx, &order, now)?;
            } else {
                tracing::warn!(order_id = %id, ticket_id, "归属工单不存在或已删除,跳过对账");
            }
        }

        let completed = RepairTicketRepository::find_by_id_with(&tx, ticket_id)?
            .ok_or_else(|| ApiError::NotFound(format!("RepairTicket (id={})", ticket_id)))?;
        tx.commit()?;
        tracing::info!(ticket_id, qc_passed, "工单完成");
        Ok(completed)
    }

    /// 重开已完成工单: COMPLETED → DIAGNOSING(单事务)
    ///
    /// 清空质检结论与保修快照,并触发归属工单对账
    /// (驱动 RESOLVED → IN_PROGRESS 的回退路径)
    pub fn reopen(&self, ticket_id: &str) -> ApiResult<RepairTicket> {
        let conn = self.lock_conn()?;
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now();

        let ticket = RepairTicketRepository::find_by_id_with(&tx, ticket_id)?
            .ok_or_else(|| ApiError::NotFound(format!("RepairTicket (id={})", ticket_id)))?;

        let affected = RepairTicketRepository::reopen_with(&tx, ticket_id, now)?;
        if affected == 0 {
            return Err(ApiError::InvalidState {
                entity: "RepairTicket".to_string(),
                from: ticket.status.to_string(),
                to: RepairStatus::Diagnosing.to_string(),
            });
        }

        // 质检不通过曾导致报废的箱,重开即撤回质检结论
        if let Some(cassette) = CassetteRepository::find_by_id_with(&tx, &ticket.cassette_id)? {
            if cassette.status == CassetteStatus::Scrapped {
                tracing::warn!(
                    cassette_id = %cassette.cassette_id,
                    ticket_id,
                    "重开工单,报废钞箱回退为 IN_REPAIR"
                );
                CassetteRepository::update_status_with(
                    &tx,
                    &cassette.cassette_id,
                    CassetteStatus::InRepair,
                    now,
                )?;
            }
        }

        let order_id = match &ticket.order_id {
            Some(id) => Some(id.clone()),
            None => ServiceOrderRepository::find_owning_order_id_with(&tx, &ticket.cassette_id)?,
        };
        if let Some(id) = &order_id {
            if let Some(order) = ServiceOrderRepository::find_by_id_with(&tx, id)? {
                reconcile_order_with(&tx, &order, now)?;
            }
        }

        let reopened = RepairTicketRepository::find_by_id_with(&tx, ticket_id)?
            .ok_or_else(|| ApiError::NotFound(format!("RepairTicket (id={})", ticket_id)))?;
        tx.commit()?;
        tracing::info!(ticket_id, "工单已重开");
        Ok(reopened)
    }

    /// 软删除工单(仅活跃工单; 历史工单是审计记录,不可删)
    pub fn soft_delete_ticket(&self, ticket_id: &str) -> ApiResult<()> {
        let conn = self.lock_conn()?;
        let now = Utc::now();

        let ticket = RepairTicketRepository::find_by_id_with(&conn, ticket_id)?
            .ok_or_else(|| ApiError::NotFound(format!("RepairTicket (id={})", ticket_id)))?;
        if !ticket.is_active() {
            return Err(ApiError::BusinessRuleViolation(format!(
                "仅活跃工单可删除: {} (status={})",
                ticket_id, ticket.status
            )));
        }
        RepairTicketRepository::soft_delete_with(&conn, ticket_id, now)?;
        Ok(())
    }

    // ==========================================
    // 取回
    // ==========================================

    /// 取回确认: 钞箱回到 OK,并写入取回记录(单事务)
    ///
    /// # 前置
    /// 钞箱状态 IN_REPAIR,无活跃工单,且最近一次工单完成+质检通过
    /// (二次返修期间不得凭上一次的质检结论取回)
    pub fn confirm_pickup(&self, cassette_id: &str, picked_up_by: &str) -> ApiResult<ReturnRecord> {
        let conn = self.lock_conn()?;
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now();

        let cassette = CassetteRepository::find_by_id_with(&tx, cassette_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Cassette (id={})", cassette_id)))?;
        if cassette.status != CassetteStatus::InRepair {
            return Err(ApiError::InvalidState {
                entity: "Cassette".to_string(),
                from: cassette.status.to_string(),
                to: CassetteStatus::Ok.to_string(),
            });
        }

        // 最新一张工单必须就是质检通过的那张: 活跃工单在场即拒绝
        if let Some(active) = RepairTicketRepository::find_active_by_cassette_with(&tx, cassette_id)? {
            return Err(ApiError::BusinessRuleViolation(format!(
                "钞箱存在未完成工单,不可取回: {}",
                active.ticket_id
            )));
        }

        let ticket = RepairTicketRepository::find_latest_qc_passed_with(&tx, cassette_id)?
            .ok_or_else(|| {
                ApiError::BusinessRuleViolation(format!(
                    "钞箱无已完成且质检通过的工单,不可取回: {}",
                    cassette_id
                ))
            })?;

        let order_id = match &ticket.order_id {
            Some(id) => Some(id.clone()),
            None => ServiceOrderRepository::find_owning_order_id_with(&tx, cassette_id)?,
        };

        let record = ReturnRecord {
            return_id: Uuid::new_v4().to_string(),
            order_id,
            cassette_id: cassette_id.to_string(),
            picked_up_by: picked_up_by.to_string(),
            picked_up_at: now,
            created_at: now,
        };
        ReturnRecordRepository::create_with(&tx, &record)?;
        CassetteRepository::update_status_with(&tx, cassette_id, CassetteStatus::Ok, now)?;

        tx.commit()?;
        tracing::info!(cassette_id, picked_up_by, "取回确认,钞箱回到 OK");
        Ok(record)
    }

    // ==========================================
    // 内部: 保修快照
    // ==========================================

    /// 在事务内计算保修快照
    ///
    /// 类型判定 → 配置读取(无行则内置默认) → 纯函数计算;
    /// previous_claim_count 取最近一次质检通过完成工单的索赔计数
    fn build_warranty_snapshot(
        &self,
        conn: &Connection,
        cassette: &Cassette,
        completed_at: DateTime<Utc>,
    ) -> ApiResult<WarrantySnapshot> {
        let active_types: Vec<WarrantyType> =
            WarrantyConfigRepository::list_active_by_bank_with(conn, &cassette.bank_id)?
                .iter()
                .map(|c| c.warranty_type)
                .collect();
        let warranty_type = WarrantyCore::determine_type(&active_types);

        let config = match WarrantyConfigRepository::find_by_bank_and_type_with(
            conn,
            &cassette.bank_id,
            warranty_type,
        )? {
            Some(config) => config,
            None => WarrantyCore::default_config(&cassette.bank_id, warranty_type),
        };

        let previous_claim_count =
            RepairTicketRepository::find_latest_qc_passed_with(conn, &cassette.cassette_id)?
                .map(|t| t.warranty_claim_count)
                .unwrap_or(0);

        Ok(WarrantyCore::calculate(
            &config,
            completed_at,
            previous_claim_count,
        ))
    }
}
