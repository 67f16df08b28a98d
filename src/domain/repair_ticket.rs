// ==========================================
// 钞箱维修管理系统 - 维修工单领域模型
// ==========================================
// 用途: 一次维修尝试 = 一张工单; 历史工单全部保留
// 红线: created_at 不可变,作为归属服务工单的时间围栏
// ==========================================

use crate::domain::types::RepairStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// RepairTicket - 维修工单
// ==========================================
// 对齐: schema repair_ticket 表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairTicket {
    // ===== 主键与关联 =====
    pub ticket_id: String,          // 工单 ID (UUID)
    pub cassette_id: String,        // 关联钞箱 (FK)
    pub order_id: Option<String>,   // 批量创建时所属服务工单

    // ===== 维修信息 =====
    pub reported_issue: String,          // 报障描述
    pub status: RepairStatus,
    pub qc_passed: Option<bool>,         // 质检结论 (完成前为 None)
    pub assigned_to: Option<String>,     // 领单维修员
    pub action_taken: Option<String>,    // 处理措施
    pub parts_replaced: Option<String>,  // 更换部件清单 (JSON 数组)

    // ===== 保修快照 (完成且质检通过时写入) =====
    pub warranty_type: Option<String>,
    pub warranty_period_days: Option<i32>,
    pub warranty_start_date: Option<DateTime<Utc>>,
    pub warranty_end_date: Option<DateTime<Utc>>,
    pub warranty_claim_count: i32,                 // 被索赔次数
    pub warranty_claimed: bool,                    // 是否已被索赔过
    pub claimed_from_ticket_id: Option<String>,    // 索赔来源工单 (新工单侧)

    // ===== 时间与软删除 =====
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,       // 不可变,时间围栏边界
    pub updated_at: DateTime<Utc>,
}

impl RepairTicket {
    /// 构造新接收的工单
    pub fn new_received(
        ticket_id: String,
        cassette_id: String,
        order_id: Option<String>,
        reported_issue: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id,
            cassette_id,
            order_id,
            reported_issue,
            status: RepairStatus::Received,
            qc_passed: None,
            assigned_to: None,
            action_taken: None,
            parts_replaced: None,
            warranty_type: None,
            warranty_period_days: None,
            warranty_start_date: None,
            warranty_end_date: None,
            warranty_claim_count: 0,
            warranty_claimed: false,
            claimed_from_ticket_id: None,
            completed_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 是否活跃工单
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none() && self.status.is_active()
    }

    /// 质检通过且已完成 (保修与待取回判定的前提)
    pub fn is_qc_passed_completion(&self) -> bool {
        self.status == RepairStatus::Completed && self.qc_passed == Some(true)
    }
}

// ==========================================
// Trait: WarrantyCoverage
// ==========================================
// 用途: 保修覆盖判定接口 (纯判定,无 I/O)
pub trait WarrantyCoverage {
    /// 此刻是否处于保修期内
    fn is_under_warranty(&self, now: DateTime<Utc>) -> bool;

    /// 剩余保修天数 (不在保修期内返回 None)
    fn warranty_days_remaining(&self, now: DateTime<Utc>) -> Option<i64>;
}

impl WarrantyCoverage for RepairTicket {
    fn is_under_warranty(&self, now: DateTime<Utc>) -> bool {
        self.is_qc_passed_completion()
            && self.deleted_at.is_none()
            && self.warranty_end_date.map(|end| end >= now).unwrap_or(false)
    }

    fn warranty_days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        if !self.is_under_warranty(now) {
            return None;
        }
        self.warranty_end_date
            .map(|end| end.signed_duration_since(now).num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn completed_ticket(end_offset_days: i64, now: DateTime<Utc>) -> RepairTicket {
        let mut t = RepairTicket::new_received(
            "t-1".to_string(),
            "c-1".to_string(),
            None,
            "卡钞".to_string(),
            now - Duration::days(10),
        );
        t.status = RepairStatus::Completed;
        t.qc_passed = Some(true);
        t.completed_at = Some(now - Duration::days(1));
        t.warranty_end_date = Some(now + Duration::days(end_offset_days));
        t
    }

    #[test]
    fn test_warranty_coverage() {
        let now = Utc::now();
        let t = completed_ticket(30, now);
        assert!(t.is_under_warranty(now));
        assert_eq!(t.warranty_days_remaining(now), Some(30));

        let expired = completed_ticket(-1, now);
        assert!(!expired.is_under_warranty(now));
        assert_eq!(expired.warranty_days_remaining(now), None);
    }

    #[test]
    fn test_active_excludes_soft_deleted() {
        let now = Utc::now();
        let mut t = RepairTicket::new_received(
            "t-2".to_string(),
            "c-1".to_string(),
            None,
            "计数异常".to_string(),
            now,
        );
        assert!(t.is_active());
        t.deleted_at = Some(now);
        assert!(!t.is_active());
    }
}
