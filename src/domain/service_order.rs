// ==========================================
// 钞箱维修管理系统 - 服务工单领域模型
// ==========================================
// 用途: 一次报障 = 一张服务工单,覆盖 1~N 个钞箱
// 红线: RESOLVED 是派生属性,只能由对账引擎写入
// ==========================================

use crate::domain::types::OrderStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ServiceOrder - 服务工单 (问题单)
// ==========================================
// 钞箱集合来源: 直接引用 cassette_id / 明细表 / 配送表,三者并集
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceOrder {
    pub order_id: String,
    pub bank_id: String,
    pub cassette_id: Option<String>, // 单钞箱工单的直接引用
    pub status: OrderStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>, // 时间围栏: 只认 created_at >= 此时刻的维修工单
    pub updated_at: DateTime<Utc>,
}

// ==========================================
// ServiceOrderDetail - 工单明细 (多钞箱)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceOrderDetail {
    pub order_id: String,
    pub cassette_id: String,
    // 置换请求: 不修,直接换箱; 对账时跳过该钞箱
    pub request_replacement: bool,
}

// ==========================================
// DeliveryRecord - 配送记录
// ==========================================
// 归属解析优先级最高的数据源 (配送表 > 明细表 > 直接引用)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub delivery_id: String,
    pub order_id: String,
    pub cassette_id: String,
    pub delivered_at: DateTime<Utc>,
}

// ==========================================
// ReturnRecord - 取回记录
// ==========================================
// 确认取回时写入; 待取回视图以"无取回记录"为筛选条件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRecord {
    pub return_id: String,
    pub order_id: Option<String>, // 无法解析归属工单时为 None
    pub cassette_id: String,
    pub picked_up_by: String,
    pub picked_up_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
