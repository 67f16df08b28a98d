// ==========================================
// 钞箱维修管理系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约束: 核心查询一律过滤 deleted_at IS NULL
// ==========================================

pub mod cassette_repo;
pub mod error;
pub mod repair_ticket_repo;
pub mod return_record_repo;
pub mod service_order_repo;
pub mod warranty_config_repo;

// 重导出核心仓储
pub use cassette_repo::CassetteRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use repair_ticket_repo::{PendingReturnCandidate, RepairTicketRepository};
pub use return_record_repo::ReturnRecordRepository;
pub use service_order_repo::ServiceOrderRepository;
pub use warranty_config_repo::WarrantyConfigRepository;
