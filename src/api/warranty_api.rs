// ==========================================
// 钞箱维修管理系统 - 保修 API
// ==========================================
// 职责: 保修配置管理、保修状态查询、保修索赔
// 红线: 索赔以原工单上的保修快照为准,不回读当下配置改写快照
// 红线: 索赔链路(计数 + 关联)单事务落库
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::repair_ticket::WarrantyCoverage;
use crate::domain::types::WarrantyType;
use crate::domain::warranty::{WarrantyClaimOutcome, WarrantyConfiguration, WarrantyStatusView};
use crate::engine::warranty_core::WarrantyCore;
use crate::repository::cassette_repo::CassetteRepository;
use crate::repository::repair_ticket_repo::RepairTicketRepository;
use crate::repository::warranty_config_repo::WarrantyConfigRepository;

// ==========================================
// WarrantyApi - 保修 API
// ==========================================

/// 保修 API
///
/// 职责:
/// 1. 配置读写 (无行时回退内置默认)
/// 2. 钞箱保修状态查询 (基于最近一次质检通过完成工单的快照)
/// 3. 保修索赔 (新旧工单关联 + 原工单索赔计数)
pub struct WarrantyApi {
    conn: Arc<Mutex<Connection>>,
    config_repo: WarrantyConfigRepository,
}

impl WarrantyApi {
    /// 创建新的 WarrantyApi 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        let config_repo = WarrantyConfigRepository::from_connection(conn.clone());
        Self { conn, config_repo }
    }

    fn lock_conn(&self) -> ApiResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ApiError::DatabaseError(format!("锁获取失败: {}", e)))
    }

    // ==========================================
    // 配置
    // ==========================================

    /// 读取配置: 有存量行用存量行,否则回退内置默认(不落库)
    pub fn get_config(
        &self,
        bank_id: &str,
        warranty_type: WarrantyType,
    ) -> ApiResult<WarrantyConfiguration> {
        match self.config_repo.find_by_bank_and_type(bank_id, warranty_type)? {
            Some(config) => Ok(config),
            None => Ok(WarrantyCore::default_config(bank_id, warranty_type)),
        }
    }

    /// 写入/更新配置(按 (bank_id, warranty_type) upsert)
    pub fn upsert_config(&self, config: &WarrantyConfiguration) -> ApiResult<()> {
        if config.period_days < 0 {
            return Err(ApiError::InvalidInput(
                "period_days 不能为负".to_string(),
            ));
        }
        if !config.unlimited_claims && config.max_claims.map_or(false, |m| m < 0) {
            return Err(ApiError::InvalidInput("max_claims 不能为负".to_string()));
        }
        self.config_repo.upsert(config)?;
        tracing::info!(
            bank_id = %config.bank_id,
            warranty_type = %config.warranty_type,
            "保修配置已写入"
        );
        Ok(())
    }

    /// 列出银行的全部配置(含停用行,供管理界面)
    pub fn list_configs(&self, bank_id: &str) -> ApiResult<Vec<WarrantyConfiguration>> {
        Ok(self.config_repo.list_by_bank(bank_id)?)
    }

    /// 判定银行当前生效的保修类型: MA > MS > IN_WARRANTY
    pub fn determine_type(&self, bank_id: &str) -> ApiResult<WarrantyType> {
        let active_types: Vec<WarrantyType> = self
            .config_repo
            .list_active_by_bank(bank_id)?
            .iter()
            .map(|c| c.warranty_type)
            .collect();
        Ok(WarrantyCore::determine_type(&active_types))
    }

    // ==========================================
    // 状态查询
    // ==========================================

    /// 查询钞箱保修状态
    ///
    /// 覆盖来源优先取最近一次保修仍有效的质检通过工单(新工单的
    /// 过期快照不遮蔽旧工单仍有效的保修); 全部过期时退回最新一张
    /// 报告过期信息,无任何质检通过工单即视为无保修覆盖
    pub fn check_status(&self, cassette_id: &str) -> ApiResult<WarrantyStatusView> {
        let conn = self.lock_conn()?;
        let now = Utc::now();

        let cassette = CassetteRepository::find_by_id_with(&conn, cassette_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Cassette (id={})", cassette_id)))?;

        let covering =
            match RepairTicketRepository::find_latest_valid_warranty_with(&conn, cassette_id, now)? {
                Some(ticket) => Some(ticket),
                None => RepairTicketRepository::find_latest_qc_passed_with(&conn, cassette_id)?,
            };
        let Some(ticket) = covering else {
            return Ok(WarrantyStatusView::not_covered());
        };
        let Some(warranty_type_str) = ticket.warranty_type.as_deref() else {
            return Ok(WarrantyStatusView::not_covered());
        };
        let Some(warranty_type) = WarrantyType::from_db_str(warranty_type_str) else {
            tracing::warn!(
                ticket_id = %ticket.ticket_id,
                warranty_type = warranty_type_str,
                "工单保修快照类型非法,按无保修处理"
            );
            return Ok(WarrantyStatusView::not_covered());
        };

        let config = match WarrantyConfigRepository::find_by_bank_and_type_with(
            &conn,
            &cassette.bank_id,
            warranty_type,
        )? {
            Some(config) => config,
            None => WarrantyCore::default_config(&cassette.bank_id, warranty_type),
        };

        let is_under_warranty = ticket.is_under_warranty(now);
        let days_remaining = ticket.warranty_days_remaining(now);
        let can_claim_warranty = is_under_warranty
            && WarrantyCore::can_claim(
                &config,
                ticket.warranty_claim_count,
                days_remaining.unwrap_or(0),
            );

        Ok(WarrantyStatusView {
            is_under_warranty,
            days_remaining,
            can_claim_warranty,
            max_warranty_claims: config.max_claims,
            unlimited_claims: config.unlimited_claims,
            warranty_type: Some(warranty_type),
            covering_ticket_id: Some(ticket.ticket_id),
        })
    }

    // ==========================================
    // 索赔
    // ==========================================

    /// 保修索赔: 把新工单挂到提供保修的原工单上(单事务)
    ///
    /// # 前置
    /// 原工单已完成且质检通过,保修快照未过期,索赔次数未达上限
    pub fn claim(
        &self,
        new_ticket_id: &str,
        original_ticket_id: &str,
        reason: &str,
    ) -> ApiResult<WarrantyClaimOutcome> {
        let conn = self.lock_conn()?;
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now();

        let original = RepairTicketRepository::find_by_id_with(&tx, original_ticket_id)?
            .ok_or_else(|| {
                ApiError::NotFound(format!("RepairTicket (id={})", original_ticket_id))
            })?;
        if !original.is_qc_passed_completion() {
            return Err(ApiError::BusinessRuleViolation(format!(
                "原工单未完成或质检未通过,不可作为保修来源: {}",
                original_ticket_id
            )));
        }

        let new_ticket = RepairTicketRepository::find_by_id_with(&tx, new_ticket_id)?
            .ok_or_else(|| ApiError::NotFound(format!("RepairTicket (id={})", new_ticket_id)))?;
        if new_ticket.claimed_from_ticket_id.is_some() {
            return Err(ApiError::BusinessRuleViolation(format!(
                "工单已关联过保修来源: {}",
                new_ticket_id
            )));
        }
        if new_ticket.cassette_id != original.cassette_id {
            return Err(ApiError::BusinessRuleViolation(format!(
                "新旧工单不属于同一钞箱: {} / {}",
                new_ticket.cassette_id, original.cassette_id
            )));
        }

        // 快照为准: 过期判定只看原工单的 warranty_end_date
        if !original.is_under_warranty(now) {
            return Err(ApiError::WarrantyExpired(original_ticket_id.to_string()));
        }

        let warranty_type = original
            .warranty_type
            .as_deref()
            .and_then(WarrantyType::from_db_str)
            .unwrap_or(WarrantyType::InWarranty);
        let cassette = CassetteRepository::find_by_id_with(&tx, &original.cassette_id)?
            .ok_or_else(|| {
                ApiError::NotFound(format!("Cassette (id={})", original.cassette_id))
            })?;
        let config = match WarrantyConfigRepository::find_by_bank_and_type_with(
            &tx,
            &cassette.bank_id,
            warranty_type,
        )? {
            Some(config) => config,
            None => WarrantyCore::default_config(&cassette.bank_id, warranty_type),
        };

        let days_remaining = original.warranty_days_remaining(now).unwrap_or(0);
        if !WarrantyCore::can_claim(&config, original.warranty_claim_count, days_remaining) {
            return Err(ApiError::ClaimLimitReached {
                ticket_id: original_ticket_id.to_string(),
                claim_count: original.warranty_claim_count,
            });
        }

        let auto_approved = WarrantyCore::is_auto_approved(&config, original.warranty_claim_count);
        RepairTicketRepository::record_claim_on_original_with(&tx, original_ticket_id, now)?;
        RepairTicketRepository::link_claim_source_with(&tx, new_ticket_id, original_ticket_id, now)?;

        tx.commit()?;
        tracing::info!(
            new_ticket_id,
            original_ticket_id,
            reason,
            auto_approved,
            "保修索赔已受理"
        );
        Ok(WarrantyClaimOutcome {
            new_ticket_id: new_ticket_id.to_string(),
            original_ticket_id: original_ticket_id.to_string(),
            claim_number: original.warranty_claim_count + 1,
            auto_approved,
            requires_approval: config.requires_approval && !auto_approved,
            free_repair: config.free_repair,
        })
    }
}
