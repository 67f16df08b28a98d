// ==========================================
// 批量接收集成测试
// ==========================================
// 测试范围:
// 1. 并集去重与置换跳过
// 2. 幂等重试(同工单活跃工单不重建)
// 3. 跨工单陈旧活跃工单的软删重建
// 4. 钞箱状态自愈; 钞箱数硬上限
// ==========================================

mod test_helpers;

use chrono::Utc;

use cassette_repair::api::{ApiError, RepairApi, BULK_REPAIR_MAX_CASSETTES};
use cassette_repair::domain::types::{CassetteStatus, OrderStatus};
use cassette_repair::repository::{CassetteRepository, RepairTicketRepository};

#[test]
fn test_bulk_dedups_union_and_skips_replacement() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    test_helpers::insert_cassette(&conn, "cas-1", "bank-a", CassetteStatus::InTransitToRc);
    test_helpers::insert_cassette(&conn, "cas-2", "bank-a", CassetteStatus::InTransitToRc);
    test_helpers::insert_cassette(&conn, "cas-3", "bank-a", CassetteStatus::InTransitToRc);

    // cas-1 同时出现在直接引用/明细/配送三个来源
    test_helpers::insert_order(&conn, "ord-1", "bank-a", Some("cas-1"), OrderStatus::Received);
    test_helpers::insert_detail(&conn, "ord-1", "cas-1", false);
    test_helpers::insert_detail(&conn, "ord-1", "cas-2", false);
    test_helpers::insert_detail(&conn, "ord-1", "cas-3", true); // 置换请求
    test_helpers::insert_delivery(&conn, "del-1", "ord-1", "cas-1", Utc::now());

    let api = RepairApi::new(conn.clone());
    let outcome = api.create_bulk_repairs("ord-1").unwrap();

    // cas-1 只建一张, cas-3 跳过
    assert_eq!(outcome.count, 2);
    assert_eq!(outcome.skipped_count, 1);
    assert_eq!(outcome.skipped[0].cassette_id, "cas-3");

    // 置换箱不进维修
    let c3 = CassetteRepository::from_connection(conn)
        .find_by_id("cas-3")
        .unwrap()
        .unwrap();
    assert_eq!(c3.status, CassetteStatus::InTransitToRc);
}

#[test]
fn test_bulk_retry_is_idempotent() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    test_helpers::insert_cassette(&conn, "cas-1", "bank-a", CassetteStatus::InTransitToRc);
    test_helpers::insert_cassette(&conn, "cas-2", "bank-a", CassetteStatus::InTransitToRc);
    test_helpers::insert_order(&conn, "ord-1", "bank-a", None, OrderStatus::Received);
    test_helpers::insert_detail(&conn, "ord-1", "cas-1", false);
    test_helpers::insert_detail(&conn, "ord-1", "cas-2", false);

    let api = RepairApi::new(conn.clone());
    let first = api.create_bulk_repairs("ord-1").unwrap();
    assert_eq!(first.count, 2);

    // 重试: 活跃工单已在本工单下,全部跳过,不产生新行
    let second = api.create_bulk_repairs("ord-1").unwrap();
    assert_eq!(second.count, 0);
    assert_eq!(second.skipped_count, 2);

    let active = RepairTicketRepository::from_connection(conn)
        .find_active_by_cassette("cas-1")
        .unwrap()
        .unwrap();
    assert_eq!(active.ticket_id, first.created[0].ticket_id);
}

#[test]
fn test_bulk_rebuilds_stale_ticket_from_other_order() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    test_helpers::insert_cassette(&conn, "cas-1", "bank-a", CassetteStatus::InTransitToRc);
    test_helpers::insert_order(&conn, "ord-old", "bank-a", Some("cas-1"), OrderStatus::Received);
    test_helpers::insert_order(&conn, "ord-new", "bank-a", Some("cas-1"), OrderStatus::Received);

    let api = RepairApi::new(conn.clone());
    let old = api.create_bulk_repairs("ord-old").unwrap();
    assert_eq!(old.count, 1);

    // 同一钞箱换到新工单: 旧活跃工单软删,重建新工单
    let new = api.create_bulk_repairs("ord-new").unwrap();
    assert_eq!(new.count, 1);

    let repo = RepairTicketRepository::from_connection(conn);
    let active = repo.find_active_by_cassette("cas-1").unwrap().unwrap();
    assert_eq!(active.order_id.as_deref(), Some("ord-new"));
    // 旧工单已软删,核心查询不可见
    assert!(repo.find_by_id(&old.created[0].ticket_id).unwrap().is_none());
}

#[test]
fn test_bulk_self_heals_cassette_status() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    // 上游漏同步: 还停在 IN_DELIVERY / OK 的钞箱照收不拒
    test_helpers::insert_cassette(&conn, "cas-1", "bank-a", CassetteStatus::InDelivery);
    test_helpers::insert_cassette(&conn, "cas-2", "bank-a", CassetteStatus::Ok);
    test_helpers::insert_order(&conn, "ord-1", "bank-a", None, OrderStatus::Received);
    test_helpers::insert_detail(&conn, "ord-1", "cas-1", false);
    test_helpers::insert_detail(&conn, "ord-1", "cas-2", false);

    let outcome = RepairApi::new(conn.clone()).create_bulk_repairs("ord-1").unwrap();
    assert_eq!(outcome.count, 2);

    let repo = CassetteRepository::from_connection(conn);
    assert_eq!(
        repo.find_by_id("cas-1").unwrap().unwrap().status,
        CassetteStatus::InRepair
    );
    assert_eq!(
        repo.find_by_id("cas-2").unwrap().unwrap().status,
        CassetteStatus::InRepair
    );
}

#[test]
fn test_bulk_skips_missing_and_scrapped() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    test_helpers::insert_cassette(&conn, "cas-scrap", "bank-a", CassetteStatus::Scrapped);
    test_helpers::insert_order(&conn, "ord-1", "bank-a", None, OrderStatus::Received);
    test_helpers::insert_detail(&conn, "ord-1", "cas-scrap", false);

    let outcome = RepairApi::new(conn.clone()).create_bulk_repairs("ord-1").unwrap();
    assert_eq!(outcome.count, 0);
    assert_eq!(outcome.skipped_count, 1);

    // 一张未建: 工单不推进 IN_PROGRESS
    let order = cassette_repair::repository::ServiceOrderRepository::from_connection(conn)
        .find_by_id("ord-1")
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Received);
}

#[test]
fn test_bulk_rejects_over_cap() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    test_helpers::insert_order(&conn, "ord-1", "bank-a", None, OrderStatus::Received);
    for i in 0..(BULK_REPAIR_MAX_CASSETTES + 1) {
        let id = format!("cas-{}", i);
        test_helpers::insert_cassette(&conn, &id, "bank-a", CassetteStatus::InTransitToRc);
        test_helpers::insert_detail(&conn, "ord-1", &id, false);
    }

    match RepairApi::new(conn.clone()).create_bulk_repairs("ord-1") {
        Err(ApiError::LimitExceeded { actual, limit }) => {
            assert_eq!(actual, BULK_REPAIR_MAX_CASSETTES + 1);
            assert_eq!(limit, BULK_REPAIR_MAX_CASSETTES);
        }
        other => panic!("期望 LimitExceeded,实际 {:?}", other.map(|o| o.count)),
    }

    // 整体失败: 事务回滚,一张工单都不落库
    let repo = RepairTicketRepository::from_connection(conn);
    assert!(repo.find_active_by_cassette("cas-0").unwrap().is_none());
}

#[test]
fn test_bulk_missing_order_not_found() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    assert!(matches!(
        RepairApi::new(conn).create_bulk_repairs("ord-miss"),
        Err(ApiError::NotFound(_))
    ));
}
