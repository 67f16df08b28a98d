// ==========================================
// 钞箱维修管理系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供运维入口与上层集成调用
// ==========================================

pub mod error;
pub mod order_api;
pub mod repair_api;
pub mod return_api;
pub mod warranty_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use order_api::{OrderApi, SyncReport};
pub use repair_api::{BulkRepairOutcome, RepairApi, SkippedCassette, BULK_REPAIR_MAX_CASSETTES};
pub use return_api::{PendingReturnReport, PendingReturnStatistics, ReturnApi};
pub use warranty_api::WarrantyApi;
