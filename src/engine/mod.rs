// ==========================================
// 钞箱维修管理系统 - 引擎层
// ==========================================
// 职责: 业务规则的纯逻辑实现,供 API 层编排调用
// 红线: 引擎层无 I/O; 所有写入由 API 层在事务内执行
// ==========================================

pub mod reconcile_core;
pub mod return_core;
pub mod warranty_core;

// 重导出核心类型
pub use reconcile_core::{OrderUpdate, ReconcileCore, ReconcileInput};
pub use return_core::{
    Pagination, PendingReturnGroup, PendingReturnItem, ReturnCore, UrgencyThresholds,
};
pub use warranty_core::WarrantyCore;
