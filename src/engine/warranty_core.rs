// ==========================================
// 钞箱维修管理系统 - 保修计算 纯函数库
// ==========================================
// 职责: 保修类型判定、保修期计算、索赔额度判定
// 红线: 无状态、无副作用、无 I/O 操作
// ==========================================

use crate::domain::types::WarrantyType;
use crate::domain::warranty::{WarrantyConfiguration, WarrantySnapshot};
use chrono::{DateTime, Duration, Utc};

// ==========================================
// WarrantyCore - 纯函数工具类
// ==========================================
pub struct WarrantyCore;

impl WarrantyCore {
    /// 内置默认配置(查无配置行时的兜底)
    ///
    /// # 规则
    /// - MA: 90 天, 最多 2 次, 延长 30 天, 首次自动批准
    /// - MS: 60 天, 最多 1 次, 延长 15 天, 需审批
    /// - IN_WARRANTY: 30 天, 最多 1 次, 首次自动批准
    /// - OUT_WARRANTY: 0 天, 0 次, 无任何权益
    pub fn default_config(bank_id: &str, warranty_type: WarrantyType) -> WarrantyConfiguration {
        let now = Utc::now();
        let (period_days, max_claims, extension_days, requires_approval, auto_approve, free) =
            match warranty_type {
                WarrantyType::Ma => (90, Some(2), 30, false, true, true),
                WarrantyType::Ms => (60, Some(1), 15, true, false, true),
                WarrantyType::InWarranty => (30, Some(1), 0, false, true, true),
                WarrantyType::OutWarranty => (0, Some(0), 0, false, false, false),
            };
        WarrantyConfiguration {
            config_id: format!("default-{}-{}", bank_id, warranty_type.to_db_str()),
            bank_id: bank_id.to_string(),
            warranty_type,
            period_days,
            max_claims,
            unlimited_claims: false,
            extension_days,
            requires_approval,
            auto_approve_first_claim: auto_approve,
            free_repair: free,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// 在银行的启用配置中判定保修类型
    ///
    /// # 规则
    /// 优先级 MA > MS > IN_WARRANTY; 无任何启用配置时默认 IN_WARRANTY
    pub fn determine_type(active_types: &[WarrantyType]) -> WarrantyType {
        for candidate in [WarrantyType::Ma, WarrantyType::Ms, WarrantyType::InWarranty] {
            if active_types.contains(&candidate) {
                return candidate;
            }
        }
        WarrantyType::InWarranty
    }

    /// 计算保修快照(纯函数: 相同输入恒得相同输出)
    ///
    /// # 规则
    /// - period = period_days + (previous_claim_count > 0 ? extension_days : 0)
    /// - end = completed_at + period 天
    pub fn calculate(
        config: &WarrantyConfiguration,
        completed_at: DateTime<Utc>,
        previous_claim_count: i32,
    ) -> WarrantySnapshot {
        let period_days = config.period_days
            + if previous_claim_count > 0 {
                config.extension_days
            } else {
                0
            };
        WarrantySnapshot {
            warranty_type: config.warranty_type,
            period_days,
            start_date: completed_at,
            end_date: completed_at + Duration::days(period_days as i64),
        }
    }

    /// 索赔额度判定
    ///
    /// # 规则
    /// - 不限次: 只要保修剩余天数 > 0 即可索赔
    /// - 限次: claim_count < max_claims (max_claims 缺失按 0 处理)
    pub fn can_claim(
        config: &WarrantyConfiguration,
        claim_count: i32,
        days_remaining: i64,
    ) -> bool {
        if config.unlimited_claims {
            days_remaining > 0
        } else {
            claim_count < config.max_claims.unwrap_or(0)
        }
    }

    /// 索赔是否自动批准
    ///
    /// # 规则
    /// auto_approve_first_claim 且原工单索赔计数为 0 (即本次为首次)
    pub fn is_auto_approved(config: &WarrantyConfiguration, original_claim_count: i32) -> bool {
        config.auto_approve_first_claim && original_claim_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_configs() {
        let ma = WarrantyCore::default_config("bank-1", WarrantyType::Ma);
        assert_eq!(ma.period_days, 90);
        assert_eq!(ma.max_claims, Some(2));
        assert_eq!(ma.extension_days, 30);
        assert!(ma.auto_approve_first_claim);

        let ms = WarrantyCore::default_config("bank-1", WarrantyType::Ms);
        assert_eq!(ms.period_days, 60);
        assert!(ms.requires_approval);

        let ow = WarrantyCore::default_config("bank-1", WarrantyType::OutWarranty);
        assert_eq!(ow.period_days, 0);
        assert_eq!(ow.max_claims, Some(0));
        assert!(!ow.free_repair);
    }

    #[test]
    fn test_determine_type_priority() {
        assert_eq!(
            WarrantyCore::determine_type(&[WarrantyType::Ms, WarrantyType::Ma]),
            WarrantyType::Ma
        );
        assert_eq!(
            WarrantyCore::determine_type(&[WarrantyType::InWarranty, WarrantyType::Ms]),
            WarrantyType::Ms
        );
        assert_eq!(WarrantyCore::determine_type(&[]), WarrantyType::InWarranty);
    }

    #[test]
    fn test_calculate_is_pure_and_extends() {
        let config = WarrantyCore::default_config("bank-1", WarrantyType::Ma);
        let completed = Utc.with_ymd_and_hms(2026, 1, 10, 8, 0, 0).unwrap();

        let first = WarrantyCore::calculate(&config, completed, 0);
        assert_eq!(first.period_days, 90);
        assert_eq!(first.end_date, completed + Duration::days(90));
        // 纯函数: 相同输入恒得相同输出
        assert_eq!(WarrantyCore::calculate(&config, completed, 0), first);

        let extended = WarrantyCore::calculate(&config, completed, 1);
        assert_eq!(extended.period_days, 120);
        assert_eq!(extended.end_date, completed + Duration::days(120));
    }

    #[test]
    fn test_can_claim_unlimited_ignores_count() {
        let mut config = WarrantyCore::default_config("bank-1", WarrantyType::Ma);
        config.unlimited_claims = true;
        config.max_claims = None;
        assert!(WarrantyCore::can_claim(&config, 99, 1));
        assert!(!WarrantyCore::can_claim(&config, 0, 0));
    }

    #[test]
    fn test_can_claim_limited() {
        let config = WarrantyCore::default_config("bank-1", WarrantyType::Ma);
        assert!(WarrantyCore::can_claim(&config, 0, 30));
        assert!(WarrantyCore::can_claim(&config, 1, 30));
        assert!(!WarrantyCore::can_claim(&config, 2, 30));
    }

    #[test]
    fn test_auto_approval_first_claim_only() {
        let config = WarrantyCore::default_config("bank-1", WarrantyType::Ma);
        assert!(WarrantyCore::is_auto_approved(&config, 0));
        assert!(!WarrantyCore::is_auto_approved(&config, 1));

        let ms = WarrantyCore::default_config("bank-1", WarrantyType::Ms);
        assert!(!WarrantyCore::is_auto_approved(&ms, 0));
    }
}
