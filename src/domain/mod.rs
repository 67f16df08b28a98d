// ==========================================
// 钞箱维修管理系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、业务规则接口
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod cassette;
pub mod repair_ticket;
pub mod service_order;
pub mod types;
pub mod warranty;

// 重导出核心类型
pub use cassette::Cassette;
pub use repair_ticket::{RepairTicket, WarrantyCoverage};
pub use service_order::{DeliveryRecord, ReturnRecord, ServiceOrder, ServiceOrderDetail};
pub use types::{CassetteStatus, OrderStatus, RepairStatus, ReturnUrgency, WarrantyType};
pub use warranty::{
    WarrantyClaimOutcome, WarrantyConfiguration, WarrantySnapshot, WarrantyStatusView,
};
