// ==========================================
// 钞箱维修管理系统 - 领域类型定义
// ==========================================
// 职责: 定义状态机枚举与数据库字符串映射
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 钞箱状态 (Cassette Status)
// ==========================================
// 红线: 钞箱永不物理删除,只做状态流转或软删除
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CassetteStatus {
    Ok,            // 正常在用
    Bad,           // 故障待修
    InTransitToRc, // 在途(运往维修中心)
    InDelivery,    // 配送中(银行自送)
    InRepair,      // 维修中(已入中心)
    Scrapped,      // 报废
}

impl CassetteStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            CassetteStatus::Ok => "OK",
            CassetteStatus::Bad => "BAD",
            CassetteStatus::InTransitToRc => "IN_TRANSIT_TO_RC",
            CassetteStatus::InDelivery => "IN_DELIVERY",
            CassetteStatus::InRepair => "IN_REPAIR",
            CassetteStatus::Scrapped => "SCRAPPED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "OK" => Some(CassetteStatus::Ok),
            "BAD" => Some(CassetteStatus::Bad),
            "IN_TRANSIT_TO_RC" => Some(CassetteStatus::InTransitToRc),
            "IN_DELIVERY" => Some(CassetteStatus::InDelivery),
            "IN_REPAIR" => Some(CassetteStatus::InRepair),
            "SCRAPPED" => Some(CassetteStatus::Scrapped),
            _ => None,
        }
    }
}

impl fmt::Display for CassetteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 维修工单状态 (Repair Ticket Status)
// ==========================================
// 活跃状态 = RECEIVED / DIAGNOSING / ON_PROGRESS
// 红线: 一个钞箱同一时刻至多一张活跃工单
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepairStatus {
    Received,   // 已接收
    Diagnosing, // 诊断中
    OnProgress, // 维修中
    Completed,  // 已完成
}

impl RepairStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            RepairStatus::Received => "RECEIVED",
            RepairStatus::Diagnosing => "DIAGNOSING",
            RepairStatus::OnProgress => "ON_PROGRESS",
            RepairStatus::Completed => "COMPLETED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "RECEIVED" => Some(RepairStatus::Received),
            "DIAGNOSING" => Some(RepairStatus::Diagnosing),
            "ON_PROGRESS" => Some(RepairStatus::OnProgress),
            "COMPLETED" => Some(RepairStatus::Completed),
            _ => None,
        }
    }

    /// 是否活跃工单(未完成)
    pub fn is_active(&self) -> bool {
        !matches!(self, RepairStatus::Completed)
    }
}

impl fmt::Display for RepairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 服务工单状态 (Service Order Status)
// ==========================================
// RETURN_SHIPPED 为历史遗留值: 解析兼容,新流程不再产生
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Open,          // 已报障
    InDelivery,    // 配送中
    Received,      // 已收货
    InProgress,    // 维修进行中
    Resolved,      // 已解决(全部工单完成)
    Closed,        // 已关闭
    ReturnShipped, // 历史遗留: 返运中
}

impl OrderStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "OPEN",
            OrderStatus::InDelivery => "IN_DELIVERY",
            OrderStatus::Received => "RECEIVED",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::Resolved => "RESOLVED",
            OrderStatus::Closed => "CLOSED",
            OrderStatus::ReturnShipped => "RETURN_SHIPPED",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(OrderStatus::Open),
            "IN_DELIVERY" => Some(OrderStatus::InDelivery),
            "RECEIVED" => Some(OrderStatus::Received),
            "IN_PROGRESS" => Some(OrderStatus::InProgress),
            "RESOLVED" => Some(OrderStatus::Resolved),
            "CLOSED" => Some(OrderStatus::Closed),
            "RETURN_SHIPPED" => Some(OrderStatus::ReturnShipped),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 保修类型 (Warranty Type)
// ==========================================
// 优先级: MA > MS > IN_WARRANTY > OUT_WARRANTY
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarrantyType {
    Ma,          // 综合维保合同
    Ms,          // 单次维保合同
    InWarranty,  // 原厂保内
    OutWarranty, // 保外
}

impl WarrantyType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            WarrantyType::Ma => "MA",
            WarrantyType::Ms => "MS",
            WarrantyType::InWarranty => "IN_WARRANTY",
            WarrantyType::OutWarranty => "OUT_WARRANTY",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "MA" => Some(WarrantyType::Ma),
            "MS" => Some(WarrantyType::Ms),
            "IN_WARRANTY" => Some(WarrantyType::InWarranty),
            "OUT_WARRANTY" => Some(WarrantyType::OutWarranty),
            _ => None,
        }
    }
}

impl fmt::Display for WarrantyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 待取回紧急等级 (Return Urgency)
// ==========================================
// 等级制,不是评分制; 按滞留天数分桶
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnUrgency {
    Normal,     // 滞留 <3 天
    Attention,  // 滞留 <7 天
    Urgent,     // 滞留 <14 天
    VeryUrgent, // 滞留 >=14 天
}

impl fmt::Display for ReturnUrgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnUrgency::Normal => write!(f, "NORMAL"),
            ReturnUrgency::Attention => write!(f, "ATTENTION"),
            ReturnUrgency::Urgent => write!(f, "URGENT"),
            ReturnUrgency::VeryUrgent => write!(f, "VERY_URGENT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_db_roundtrip() {
        for s in [
            CassetteStatus::Ok,
            CassetteStatus::Bad,
            CassetteStatus::InTransitToRc,
            CassetteStatus::InDelivery,
            CassetteStatus::InRepair,
            CassetteStatus::Scrapped,
        ] {
            assert_eq!(CassetteStatus::from_db_str(s.to_db_str()), Some(s));
        }
        assert_eq!(CassetteStatus::from_db_str("UNKNOWN"), None);
    }

    #[test]
    fn test_active_repair_status() {
        assert!(RepairStatus::Received.is_active());
        assert!(RepairStatus::Diagnosing.is_active());
        assert!(RepairStatus::OnProgress.is_active());
        assert!(!RepairStatus::Completed.is_active());
    }

    #[test]
    fn test_legacy_order_status_parses() {
        assert_eq!(
            OrderStatus::from_db_str("RETURN_SHIPPED"),
            Some(OrderStatus::ReturnShipped)
        );
    }

    #[test]
    fn test_urgency_ordering() {
        assert!(ReturnUrgency::VeryUrgent > ReturnUrgency::Urgent);
        assert!(ReturnUrgency::Urgent > ReturnUrgency::Attention);
        assert!(ReturnUrgency::Attention > ReturnUrgency::Normal);
    }
}
