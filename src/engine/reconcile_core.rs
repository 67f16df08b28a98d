// ==========================================
// 钞箱维修管理系统 - 服务工单对账 纯函数库
// ==========================================
// 职责: 由维修工单集合派生服务工单的聚合状态
// 红线: 无状态、无副作用、无 I/O; 每次调用至多授权一次写入
// ==========================================

use crate::domain::repair_ticket::RepairTicket;
use crate::domain::types::{OrderStatus, RepairStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

// ==========================================
// OrderUpdate - 对账授权的唯一写入
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum OrderUpdate {
    /// 标记已解决并写入解决时刻
    Resolve { resolved_at: DateTime<Utc> },
    /// 纠正过早/过期的 RESOLVED: 回退到 IN_PROGRESS 并清空 resolved_at
    Reopen,
}

// ==========================================
// ReconcileInput - 对账输入快照
// ==========================================
// 调用方负责: 时间围栏过滤、软删除过滤、置换钞箱剔除
#[derive(Debug, Clone)]
pub struct ReconcileInput<'a> {
    /// 工单当前状态
    pub order_status: OrderStatus,
    /// 需要维修的钞箱数 N (已剔除置换请求钞箱)
    pub repair_cassette_count: usize,
    /// 每个钞箱最新一张工单的状态 (M 条, M <= N)
    pub latest_statuses: &'a [RepairStatus],
    /// 工单内全部钞箱均为置换请求
    pub replacement_only: bool,
}

// ==========================================
// ReconcileCore - 纯函数工具类
// ==========================================
pub struct ReconcileCore;

impl ReconcileCore {
    /// 归并工单列表为"每钞箱最新一张"
    ///
    /// # 前置
    /// - `tickets` 已按 created_at 降序 (仓储层保证)
    ///
    /// # 规则
    /// 同一钞箱可能跨多个服务工单维修多次,只有最新一次
    /// 反映本工单的结果; 首见即最新
    pub fn latest_per_cassette(tickets: &[RepairTicket]) -> HashMap<&str, &RepairTicket> {
        let mut latest: HashMap<&str, &RepairTicket> = HashMap::new();
        for ticket in tickets {
            latest.entry(ticket.cassette_id.as_str()).or_insert(ticket);
        }
        latest
    }

    /// 对账: 派生服务工单应处的聚合状态
    ///
    /// # 规则
    /// 1. 全员置换 → 不做任何事 (由置换流程驱动,非本引擎)
    /// 2. M < N → 尚有钞箱未开单; 若当前 RESOLVED 则回退 (自愈)
    /// 3. M == N 且全部 COMPLETED → RESOLVED (已 RESOLVED 则不重复写)
    /// 4. M == N 但存在未完成 → 若当前 RESOLVED 则回退 (纠正过期解决)
    ///
    /// # 幂等性
    /// 无中间变化时连续调用两次,第二次返回 None (零写入)
    pub fn reconcile(input: &ReconcileInput<'_>, now: DateTime<Utc>) -> Option<OrderUpdate> {
        // 规则 1: 全员置换,对账不介入
        if input.replacement_only {
            return None;
        }

        let n = input.repair_cassette_count;
        let m = input.latest_statuses.len();

        // 规则 2: 覆盖不全,禁止 RESOLVED
        if m < n {
            if input.order_status == OrderStatus::Resolved {
                return Some(OrderUpdate::Reopen);
            }
            return None;
        }

        // 规则 3/4: 覆盖齐全,看是否全部完成
        let all_completed = input
            .latest_statuses
            .iter()
            .all(|s| *s == RepairStatus::Completed);

        if all_completed && n > 0 {
            if input.order_status == OrderStatus::Resolved {
                return None; // 已解决,零写入
            }
            return Some(OrderUpdate::Resolve { resolved_at: now });
        }

        if input.order_status == OrderStatus::Resolved {
            return Some(OrderUpdate::Reopen);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(
        order_status: OrderStatus,
        n: usize,
        statuses: &'a [RepairStatus],
    ) -> ReconcileInput<'a> {
        ReconcileInput {
            order_status,
            repair_cassette_count: n,
            latest_statuses: statuses,
            replacement_only: false,
        }
    }

    #[test]
    fn test_all_completed_resolves() {
        let statuses = [RepairStatus::Completed, RepairStatus::Completed];
        let now = Utc::now();
        let update = ReconcileCore::reconcile(&input(OrderStatus::InProgress, 2, &statuses), now);
        assert_eq!(update, Some(OrderUpdate::Resolve { resolved_at: now }));
    }

    #[test]
    fn test_already_resolved_is_idempotent() {
        let statuses = [RepairStatus::Completed, RepairStatus::Completed];
        let update = ReconcileCore::reconcile(
            &input(OrderStatus::Resolved, 2, &statuses),
            Utc::now(),
        );
        assert_eq!(update, None);
    }

    #[test]
    fn test_missing_ticket_blocks_resolution() {
        let statuses = [RepairStatus::Completed];
        let update = ReconcileCore::reconcile(
            &input(OrderStatus::InProgress, 2, &statuses),
            Utc::now(),
        );
        assert_eq!(update, None);
    }

    #[test]
    fn test_missing_ticket_reverts_stale_resolved() {
        let statuses = [RepairStatus::Completed];
        let update =
            ReconcileCore::reconcile(&input(OrderStatus::Resolved, 2, &statuses), Utc::now());
        assert_eq!(update, Some(OrderUpdate::Reopen));
    }

    #[test]
    fn test_reopened_ticket_reverts_resolved() {
        let statuses = [RepairStatus::Completed, RepairStatus::Diagnosing];
        let update =
            ReconcileCore::reconcile(&input(OrderStatus::Resolved, 2, &statuses), Utc::now());
        assert_eq!(update, Some(OrderUpdate::Reopen));
    }

    #[test]
    fn test_replacement_only_never_resolves() {
        let statuses: [RepairStatus; 0] = [];
        let mut i = input(OrderStatus::InProgress, 0, &statuses);
        i.replacement_only = true;
        assert_eq!(ReconcileCore::reconcile(&i, Utc::now()), None);
    }

    #[test]
    fn test_empty_order_never_resolves() {
        // N == 0 且非全员置换 (空工单): 不授权 RESOLVED
        let statuses: [RepairStatus; 0] = [];
        let update = ReconcileCore::reconcile(
            &input(OrderStatus::InProgress, 0, &statuses),
            Utc::now(),
        );
        assert_eq!(update, None);
    }

    #[test]
    fn test_latest_per_cassette_takes_first_seen() {
        let now = Utc::now();
        let mut older = RepairTicket::new_received(
            "t-old".to_string(),
            "c-1".to_string(),
            None,
            "旧单".to_string(),
            now - chrono::Duration::days(2),
        );
        older.status = RepairStatus::Completed;
        let newer = RepairTicket::new_received(
            "t-new".to_string(),
            "c-1".to_string(),
            None,
            "新单".to_string(),
            now,
        );
        // 仓储层按 created_at 降序返回
        let tickets = vec![newer.clone(), older];
        let latest = ReconcileCore::latest_per_cassette(&tickets);
        assert_eq!(latest.len(), 1);
        assert_eq!(latest["c-1"].ticket_id, "t-new");
    }
}
