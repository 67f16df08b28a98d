// ==========================================
// 钞箱维修管理系统 - 保修配置领域模型
// ==========================================
// 用途: 按 (银行, 保修类型) 维度的保修策略配置
// 红线: 无配置行时使用内置默认,不自动落库
// ==========================================

use crate::domain::types::WarrantyType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// WarrantyConfiguration - 保修配置
// ==========================================
// 对齐: schema warranty_config 表, UNIQUE(bank_id, warranty_type)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarrantyConfiguration {
    pub config_id: String,
    pub bank_id: String,
    pub warranty_type: WarrantyType,

    // ===== 保修额度 =====
    pub period_days: i32,            // 保修期(天)
    pub max_claims: Option<i32>,     // 最大索赔次数 (unlimited 时为 None)
    pub unlimited_claims: bool,      // 不限次索赔
    pub extension_days: i32,         // 二次及以后维修的保修延长天数

    // ===== 审批策略 =====
    pub requires_approval: bool,
    pub auto_approve_first_claim: bool,
    pub free_repair: bool,           // 保内免费维修

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==========================================
// WarrantySnapshot - 保修快照
// ==========================================
// 维修完成时计算并固化到工单,后续索赔以快照为准
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarrantySnapshot {
    pub warranty_type: WarrantyType,
    pub period_days: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

// ==========================================
// WarrantyStatusView - 保修状态查询结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarrantyStatusView {
    pub is_under_warranty: bool,
    pub days_remaining: Option<i64>,
    pub can_claim_warranty: bool,
    pub max_warranty_claims: Option<i32>,
    pub unlimited_claims: bool,
    pub warranty_type: Option<WarrantyType>,
    pub covering_ticket_id: Option<String>, // 提供保修的工单
}

impl WarrantyStatusView {
    /// 无保修覆盖的默认视图
    pub fn not_covered() -> Self {
        Self {
            is_under_warranty: false,
            days_remaining: None,
            can_claim_warranty: false,
            max_warranty_claims: None,
            unlimited_claims: false,
            warranty_type: None,
            covering_ticket_id: None,
        }
    }
}

// ==========================================
// WarrantyClaimOutcome - 索赔结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarrantyClaimOutcome {
    pub new_ticket_id: String,
    pub original_ticket_id: String,
    pub claim_number: i32,     // 本次是第几次索赔 (从 1 起)
    pub auto_approved: bool,   // 首次索赔 + 配置允许时自动批准
    pub requires_approval: bool,
    pub free_repair: bool,
}
