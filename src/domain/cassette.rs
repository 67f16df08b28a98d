// ==========================================
// 钞箱维修管理系统 - 钞箱领域模型
// ==========================================
// 用途: 物理钞箱主数据,维修流程的唯一事实来源
// 红线: 永不硬删除; 状态只能通过生命周期操作流转
// ==========================================

use crate::domain::types::CassetteStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// Cassette - 钞箱主数据
// ==========================================
// 对齐: schema cassette 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cassette {
    // ===== 主键与标识 =====
    pub cassette_id: String,    // 钞箱唯一标识 (UUID)
    pub serial_number: String,  // 序列号 (唯一)

    // ===== 归属 =====
    pub bank_id: String,           // 所属银行
    pub cassette_type: String,     // 钞箱型号

    // ===== 状态 =====
    pub status: CassetteStatus,

    // ===== 软删除与审计 =====
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cassette {
    /// 能否进入维修 (transition_to_repair 的前置状态)
    ///
    /// OK/IN_DELIVERY 属于自愈放行: 上游状态未及时同步时不拒单,
    /// 由调用方记录警告后纠正
    pub fn can_enter_repair(&self) -> bool {
        matches!(
            self.status,
            CassetteStatus::InTransitToRc
                | CassetteStatus::Bad
                | CassetteStatus::InDelivery
                | CassetteStatus::Ok
        )
    }

    /// 是否已报废(终态,任何维修操作拒绝)
    pub fn is_scrapped(&self) -> bool {
        self.status == CassetteStatus::Scrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cassette(status: CassetteStatus) -> Cassette {
        Cassette {
            cassette_id: "c-1".to_string(),
            serial_number: "SN-001".to_string(),
            bank_id: "bank-1".to_string(),
            cassette_type: "RB-300".to_string(),
            status,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_can_enter_repair() {
        assert!(cassette(CassetteStatus::Bad).can_enter_repair());
        assert!(cassette(CassetteStatus::InTransitToRc).can_enter_repair());
        assert!(cassette(CassetteStatus::Ok).can_enter_repair());
        assert!(cassette(CassetteStatus::InDelivery).can_enter_repair());
        assert!(!cassette(CassetteStatus::InRepair).can_enter_repair());
        assert!(!cassette(CassetteStatus::Scrapped).can_enter_repair());
    }
}
