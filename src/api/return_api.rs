// ==========================================
// 钞箱维修管理系统 - 待取回聚合 API
// ==========================================
// 职责: 维修完成滞留中心的钞箱按工单聚合、分级、分页输出
// 红线: 只读操作,永不写库; 紧急度阈值走 config_kv
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::types::ReturnUrgency;
use crate::engine::return_core::{
    Pagination, PendingReturnGroup, PendingReturnItem, ReturnCore,
};
use crate::repository::repair_ticket_repo::RepairTicketRepository;
use crate::repository::service_order_repo::ServiceOrderRepository;

// ==========================================
// PendingReturnStatistics - 分桶统计
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingReturnStatistics {
    pub normal: usize,
    pub attention: usize,
    pub urgent: usize,
    pub very_urgent: usize,
    pub total: usize,
}

impl PendingReturnStatistics {
    fn tally(items: &[PendingReturnItem]) -> Self {
        let mut stats = Self::default();
        for item in items {
            match item.urgency {
                ReturnUrgency::Normal => stats.normal += 1,
                ReturnUrgency::Attention => stats.attention += 1,
                ReturnUrgency::Urgent => stats.urgent += 1,
                ReturnUrgency::VeryUrgent => stats.very_urgent += 1,
            }
            stats.total += 1;
        }
        stats
    }
}

// ==========================================
// PendingReturnReport - 聚合输出
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReturnReport {
    pub groups: Vec<PendingReturnGroup>,
    pub statistics: PendingReturnStatistics,
    pub pagination: Pagination,
}

// ==========================================
// ReturnApi - 待取回聚合 API
// ==========================================

/// 待取回聚合 API
///
/// 职责: 候选行查询 → 归属解析 → 纯函数分级/分组/分页
pub struct ReturnApi {
    conn: Arc<Mutex<Connection>>,
    ticket_repo: RepairTicketRepository,
    config: ConfigManager,
}

impl ReturnApi {
    /// 创建新的 ReturnApi 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        let ticket_repo = RepairTicketRepository::from_connection(conn.clone());
        let config = ConfigManager::from_connection(conn.clone());
        Self {
            conn,
            ticket_repo,
            config,
        }
    }

    fn lock_conn(&self) -> ApiResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| ApiError::DatabaseError(format!("锁获取失败: {}", e)))
    }

    /// 待取回聚合报表
    ///
    /// 统计覆盖全量候选钞箱,分页只作用于组列表
    pub fn get_pending_returns(&self, page: usize, limit: usize) -> ApiResult<PendingReturnReport> {
        let thresholds = self.config.return_urgency_thresholds()?;
        let now = Utc::now();

        let candidates = self.ticket_repo.find_pending_return_candidates()?;

        let conn = self.lock_conn()?;
        let mut items: Vec<PendingReturnItem> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            // 工单未携带归属时按 配送 > 明细 > 直接引用 兜底解析
            let order_id = match candidate.order_id {
                Some(id) => Some(id),
                None => ServiceOrderRepository::find_owning_order_id_with(
                    &conn,
                    &candidate.cassette_id,
                )?,
            };
            let days = ReturnCore::days_in_center(candidate.completed_at, now);
            items.push(PendingReturnItem {
                cassette_id: candidate.cassette_id,
                serial_number: candidate.serial_number,
                bank_id: candidate.bank_id,
                ticket_id: candidate.ticket_id,
                order_id,
                completed_at: candidate.completed_at,
                days_in_center: days,
                urgency: ReturnCore::urgency_for_days(days, &thresholds),
            });
        }
        drop(conn);

        let statistics = PendingReturnStatistics::tally(&items);
        let groups = ReturnCore::group_by_order(items);
        let (page_groups, pagination) = ReturnCore::paginate_groups(groups, page, limit);

        tracing::debug!(
            total = statistics.total,
            very_urgent = statistics.very_urgent,
            page = pagination.page,
            "待取回聚合完成"
        );
        Ok(PendingReturnReport {
            groups: page_groups,
            statistics,
            pagination,
        })
    }
}
