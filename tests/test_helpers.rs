// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、测试数据生成等功能
// ==========================================

use std::error::Error;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tempfile::NamedTempFile;

use cassette_repair::db;
use cassette_repair::domain::types::{CassetteStatus, OrderStatus};
use cassette_repair::domain::{
    Cassette, DeliveryRecord, RepairTicket, ServiceOrder, ServiceOrderDetail,
};
use cassette_repair::repository::{CassetteRepository, ServiceOrderRepository};

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = db::open_sqlite_connection(&db_path)?;
    db::init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开带统一 PRAGMA 的测试连接
pub fn open_test_connection(db_path: &str) -> Result<Connection, Box<dyn Error>> {
    Ok(db::open_sqlite_connection(db_path)?)
}

/// 创建测试数据库并返回共享连接
pub fn setup_test_db() -> (NamedTempFile, Arc<Mutex<Connection>>) {
    cassette_repair::logging::init_test();
    let (temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let conn = open_test_connection(&db_path).expect("打开数据库失败");
    (temp_file, Arc::new(Mutex::new(conn)))
}

/// 创建测试钞箱
pub fn insert_cassette(
    conn: &Arc<Mutex<Connection>>,
    cassette_id: &str,
    bank_id: &str,
    status: CassetteStatus,
) -> Cassette {
    let now = Utc::now();
    let cassette = Cassette {
        cassette_id: cassette_id.to_string(),
        serial_number: format!("SN-{}", cassette_id),
        bank_id: bank_id.to_string(),
        cassette_type: "RB-2000".to_string(),
        status,
        deleted_at: None,
        created_at: now,
        updated_at: now,
    };
    CassetteRepository::from_connection(conn.clone())
        .create(&cassette)
        .expect("创建钞箱失败");
    cassette
}

/// 创建测试服务工单
pub fn insert_order(
    conn: &Arc<Mutex<Connection>>,
    order_id: &str,
    bank_id: &str,
    cassette_id: Option<&str>,
    status: OrderStatus,
) -> ServiceOrder {
    insert_order_at(conn, order_id, bank_id, cassette_id, status, Utc::now())
}

/// 创建指定创建时刻的服务工单（时间围栏测试用）
pub fn insert_order_at(
    conn: &Arc<Mutex<Connection>>,
    order_id: &str,
    bank_id: &str,
    cassette_id: Option<&str>,
    status: OrderStatus,
    created_at: DateTime<Utc>,
) -> ServiceOrder {
    let order = ServiceOrder {
        order_id: order_id.to_string(),
        bank_id: bank_id.to_string(),
        cassette_id: cassette_id.map(|s| s.to_string()),
        status,
        resolved_at: None,
        deleted_at: None,
        created_at,
        updated_at: created_at,
    };
    ServiceOrderRepository::from_connection(conn.clone())
        .create(&order)
        .expect("创建服务工单失败");
    order
}

/// 追加工单明细行
pub fn insert_detail(
    conn: &Arc<Mutex<Connection>>,
    order_id: &str,
    cassette_id: &str,
    request_replacement: bool,
) {
    ServiceOrderRepository::from_connection(conn.clone())
        .add_detail(&ServiceOrderDetail {
            order_id: order_id.to_string(),
            cassette_id: cassette_id.to_string(),
            request_replacement,
        })
        .expect("追加工单明细失败");
}

/// 追加配送记录
pub fn insert_delivery(
    conn: &Arc<Mutex<Connection>>,
    delivery_id: &str,
    order_id: &str,
    cassette_id: &str,
    delivered_at: DateTime<Utc>,
) {
    ServiceOrderRepository::from_connection(conn.clone())
        .add_delivery(&DeliveryRecord {
            delivery_id: delivery_id.to_string(),
            order_id: order_id.to_string(),
            cassette_id: cassette_id.to_string(),
            delivered_at,
        })
        .expect("追加配送记录失败");
}

/// 直接插入已完成(质检通过)的历史工单
///
/// 聚合/保修测试需要控制 completed_at 与保修快照,走 API 做不到
#[allow(clippy::too_many_arguments)]
pub fn insert_completed_ticket(
    conn: &Arc<Mutex<Connection>>,
    ticket_id: &str,
    cassette_id: &str,
    order_id: Option<&str>,
    warranty_type: Option<&str>,
    warranty_end_date: Option<DateTime<Utc>>,
    claim_count: i32,
    completed_at: DateTime<Utc>,
) -> RepairTicket {
    let created_at = completed_at - chrono::Duration::hours(2);
    let ticket = RepairTicket {
        ticket_id: ticket_id.to_string(),
        cassette_id: cassette_id.to_string(),
        order_id: order_id.map(|s| s.to_string()),
        reported_issue: "历史工单".to_string(),
        status: cassette_repair::RepairStatus::Completed,
        qc_passed: Some(true),
        assigned_to: Some("tech-01".to_string()),
        action_taken: Some("更换走钞带".to_string()),
        parts_replaced: None,
        warranty_type: warranty_type.map(|s| s.to_string()),
        warranty_period_days: warranty_type.map(|_| 90),
        warranty_start_date: warranty_type.map(|_| completed_at),
        warranty_end_date,
        warranty_claim_count: claim_count,
        warranty_claimed: claim_count > 0,
        claimed_from_ticket_id: None,
        completed_at: Some(completed_at),
        deleted_at: None,
        created_at,
        updated_at: completed_at,
    };
    let guard = conn.lock().expect("锁获取失败");
    cassette_repair::repository::RepairTicketRepository::create_with(&guard, &ticket)
        .expect("插入历史工单失败");
    ticket
}

/// 写入 config_kv 配置项
pub fn set_config(conn: &Arc<Mutex<Connection>>, key: &str, value: &str) {
    let guard = conn.lock().expect("锁获取失败");
    guard
        .execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES ('global', ?1, ?2, ?3)
            ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = ?3
            "#,
            params![key, value, Utc::now()],
        )
        .expect("写入配置失败");
}
