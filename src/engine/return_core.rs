// ==========================================
// 钞箱维修管理系统 - 待取回聚合 纯函数库
// ==========================================
// 职责: 滞留天数、紧急等级分桶、按工单分组与分页
// 红线: 无状态、无副作用、无 I/O 操作
// ==========================================

use crate::domain::types::ReturnUrgency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// UrgencyThresholds - 分桶阈值(天)
// ==========================================
// 可经配置覆盖; 默认 3/7/14
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrgencyThresholds {
    pub attention_days: i64,
    pub urgent_days: i64,
    pub very_urgent_days: i64,
}

impl Default for UrgencyThresholds {
    fn default() -> Self {
        Self {
            attention_days: 3,
            urgent_days: 7,
            very_urgent_days: 14,
        }
    }
}

// ==========================================
// PendingReturnItem - 单钞箱待取回条目
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReturnItem {
    pub cassette_id: String,
    pub serial_number: String,
    pub bank_id: String,
    pub ticket_id: String,
    pub order_id: Option<String>,
    pub completed_at: DateTime<Utc>,
    pub days_in_center: i64,
    pub urgency: ReturnUrgency,
}

// ==========================================
// PendingReturnGroup - 按服务工单分组
// ==========================================
// 组紧急度与滞留天数取组内最大值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReturnGroup {
    /// 工单 ID; 无法解析归属时为 "cassette:<id>" 合成组
    pub group_key: String,
    pub order_id: Option<String>,
    pub urgency: ReturnUrgency,
    pub max_days_in_center: i64,
    pub items: Vec<PendingReturnItem>,
}

// ==========================================
// Pagination - 分页信息
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total_groups: usize,
    pub total_pages: usize,
}

// ==========================================
// ReturnCore - 纯函数工具类
// ==========================================
pub struct ReturnCore;

impl ReturnCore {
    /// 计算滞留中心天数: floor((now - completed_at) / 1天)
    ///
    /// 时钟回拨等异常导致负值时按 0 计
    pub fn days_in_center(completed_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(completed_at).num_days().max(0)
    }

    /// 按滞留天数分桶
    pub fn urgency_for_days(days: i64, thresholds: &UrgencyThresholds) -> ReturnUrgency {
        if days < thresholds.attention_days {
            ReturnUrgency::Normal
        } else if days < thresholds.urgent_days {
            ReturnUrgency::Attention
        } else if days < thresholds.very_urgent_days {
            ReturnUrgency::Urgent
        } else {
            ReturnUrgency::VeryUrgent
        }
    }

    /// 按归属工单分组,组内取最大紧急度与最大滞留天数
    ///
    /// # 规则
    /// - 有 order_id → 组键 = order_id
    /// - 无法解析归属 → 每钞箱单独成组,组键 = "cassette:<id>"
    /// - 分组保持条目首次出现的顺序 (上游按 completed_at 升序)
    pub fn group_by_order(items: Vec<PendingReturnItem>) -> Vec<PendingReturnGroup> {
        let mut groups: Vec<PendingReturnGroup> = Vec::new();
        for item in items {
            let key = match &item.order_id {
                Some(order_id) => order_id.clone(),
                None => format!("cassette:{}", item.cassette_id),
            };
            match groups.iter_mut().find(|g| g.group_key == key) {
                Some(group) => {
                    group.urgency = group.urgency.max(item.urgency);
                    group.max_days_in_center = group.max_days_in_center.max(item.days_in_center);
                    group.items.push(item);
                }
                None => groups.push(PendingReturnGroup {
                    group_key: key,
                    order_id: item.order_id.clone(),
                    urgency: item.urgency,
                    max_days_in_center: item.days_in_center,
                    items: vec![item],
                }),
            }
        }
        groups
    }

    /// 分页作用于组列表,而非展平的钞箱列表
    ///
    /// page 从 1 起; limit 为 0 时按 1 处理
    pub fn paginate_groups(
        groups: Vec<PendingReturnGroup>,
        page: usize,
        limit: usize,
    ) -> (Vec<PendingReturnGroup>, Pagination) {
        let limit = limit.max(1);
        let page = page.max(1);
        let total_groups = groups.len();
        let total_pages = total_groups.div_ceil(limit);
        let start = (page - 1) * limit;
        let page_groups = groups
            .into_iter()
            .skip(start)
            .take(limit)
            .collect::<Vec<_>>();
        (
            page_groups,
            Pagination {
                page,
                limit,
                total_groups,
                total_pages,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(cassette: &str, order: Option<&str>, days: i64, now: DateTime<Utc>) -> PendingReturnItem {
        let completed_at = now - Duration::days(days);
        let days_in_center = ReturnCore::days_in_center(completed_at, now);
        PendingReturnItem {
            cassette_id: cassette.to_string(),
            serial_number: format!("SN-{}", cassette),
            bank_id: "bank-1".to_string(),
            ticket_id: format!("t-{}", cassette),
            order_id: order.map(|s| s.to_string()),
            completed_at,
            days_in_center,
            urgency: ReturnCore::urgency_for_days(days_in_center, &UrgencyThresholds::default()),
        }
    }

    #[test]
    fn test_urgency_buckets() {
        let t = UrgencyThresholds::default();
        assert_eq!(ReturnCore::urgency_for_days(0, &t), ReturnUrgency::Normal);
        assert_eq!(ReturnCore::urgency_for_days(2, &t), ReturnUrgency::Normal);
        assert_eq!(ReturnCore::urgency_for_days(3, &t), ReturnUrgency::Attention);
        assert_eq!(ReturnCore::urgency_for_days(6, &t), ReturnUrgency::Attention);
        assert_eq!(ReturnCore::urgency_for_days(7, &t), ReturnUrgency::Urgent);
        assert_eq!(ReturnCore::urgency_for_days(13, &t), ReturnUrgency::Urgent);
        assert_eq!(ReturnCore::urgency_for_days(14, &t), ReturnUrgency::VeryUrgent);
    }

    #[test]
    fn test_days_in_center_never_negative() {
        let now = Utc::now();
        assert_eq!(ReturnCore::days_in_center(now + Duration::days(1), now), 0);
    }

    #[test]
    fn test_group_takes_max_urgency_and_days() {
        let now = Utc::now();
        let items = vec![
            item("c-1", Some("o-1"), 1, now),
            item("c-2", Some("o-1"), 15, now),
            item("c-3", None, 5, now),
        ];
        let groups = ReturnCore::group_by_order(items);
        assert_eq!(groups.len(), 2);

        let o1 = groups.iter().find(|g| g.group_key == "o-1").unwrap();
        assert_eq!(o1.urgency, ReturnUrgency::VeryUrgent);
        assert_eq!(o1.max_days_in_center, 15);
        assert_eq!(o1.items.len(), 2);

        let synthetic = groups.iter().find(|g| g.group_key == "cassette:c-3").unwrap();
        assert_eq!(synthetic.urgency, ReturnUrgency::Attention);
        assert!(synthetic.order_id.is_none());
    }

    #[test]
    fn test_pagination_applies_to_groups() {
        let now = Utc::now();
        let items = vec![
            item("c-1", Some("o-1"), 1, now),
            item("c-2", Some("o-1"), 2, now),
            item("c-3", Some("o-2"), 3, now),
            item("c-4", Some("o-3"), 4, now),
        ];
        let groups = ReturnCore::group_by_order(items);
        assert_eq!(groups.len(), 3);

        let (page1, pagination) = ReturnCore::paginate_groups(groups.clone(), 1, 2);
        assert_eq!(page1.len(), 2);
        assert_eq!(pagination.total_groups, 3);
        assert_eq!(pagination.total_pages, 2);

        let (page2, _) = ReturnCore::paginate_groups(groups, 2, 2);
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].group_key, "o-3");
    }
}
