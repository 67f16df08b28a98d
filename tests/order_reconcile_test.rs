// ==========================================
// 服务工单状态对账集成测试
// ==========================================
// 测试范围:
// 1. 单工单对账: 全部完成 → RESOLVED
// 2. 部分完成不推进(checked 计数仍累加)
// 3. 重开驱动 RESOLVED → IN_PROGRESSS 回退
// 4. 全量巡检(幂等、单工单失败不中断)
// 5. 置换工单不自动 RESOLVED; 时间围栏
// ==========================================

mod test_helpers;

use chrono::{Duration, Utc};

use cassette_repair::api::{OrderApi, RepairApi};
use cassette_repair::domain::types::{CassetteStatus, OrderStatus};
use cassette_repair::repository::ServiceOrderRepository;

fn order_status(conn: &std::sync::Arc<std::sync::Mutex<rusqlite::Connection>>, id: &str) -> OrderStatus {
    ServiceOrderRepository::from_connection(conn.clone())
        .find_by_id(id)
        .unwrap()
        .unwrap()
        .status
}

#[test]
fn test_order_resolves_when_all_tickets_completed() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    test_helpers::insert_cassette(&conn, "cas-1", "bank-a", CassetteStatus::InTransitToRc);
    test_helpers::insert_cassette(&conn, "cas-2", "bank-a", CassetteStatus::InTransitToRc);
    test_helpers::insert_order(&conn, "ord-1", "bank-a", None, OrderStatus::Received);
    test_helpers::insert_detail(&conn, "ord-1", "cas-1", false);
    test_helpers::insert_detail(&conn, "ord-1", "cas-2", false);

    let repair = RepairApi::new(conn.clone());
    let outcome = repair.create_bulk_repairs("ord-1").unwrap();
    assert_eq!(outcome.count, 2);
    assert_eq!(order_status(&conn, "ord-1"), OrderStatus::InProgress);

    // 只完成一半,工单不推进
    let t1 = &outcome.created[0];
    repair.complete_repair(&t1.ticket_id, true, "清理", None).unwrap();
    assert_eq!(order_status(&conn, "ord-1"), OrderStatus::InProgress);

    // 全部完成,完成内联对账推进 RESOLVED
    let t2 = &outcome.created[1];
    repair.complete_repair(&t2.ticket_id, true, "清理", None).unwrap();
    let order = ServiceOrderRepository::from_connection(conn.clone())
        .find_by_id("ord-1")
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Resolved);
    assert!(order.resolved_at.is_some());
}

#[test]
fn test_reopen_reverts_resolved_order() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    test_helpers::insert_cassette(&conn, "cas-1", "bank-a", CassetteStatus::InTransitToRc);
    test_helpers::insert_order(&conn, "ord-1", "bank-a", Some("cas-1"), OrderStatus::Received);

    let repair = RepairApi::new(conn.clone());
    let outcome = repair.create_bulk_repairs("ord-1").unwrap();
    let ticket = &outcome.created[0];
    repair.complete_repair(&ticket.ticket_id, true, "清理", None).unwrap();
    assert_eq!(order_status(&conn, "ord-1"), OrderStatus::Resolved);

    repair.reopen(&ticket.ticket_id).unwrap();
    let order = ServiceOrderRepository::from_connection(conn.clone())
        .find_by_id("ord-1")
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::InProgress);
    assert!(order.resolved_at.is_none());
}

#[test]
fn test_sync_single_counts_unchanged_order() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    test_helpers::insert_cassette(&conn, "cas-1", "bank-a", CassetteStatus::InTransitToRc);
    test_helpers::insert_order(&conn, "ord-1", "bank-a", Some("cas-1"), OrderStatus::Received);
    RepairApi::new(conn.clone()).create_bulk_repairs("ord-1").unwrap();

    // 工单未完成: 巡检过但不更新
    let report = OrderApi::new(conn.clone()).sync_order_status(Some("ord-1")).unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.updated, 0);
    assert!(report.errors.is_empty());
}

#[test]
fn test_sync_all_is_idempotent() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    test_helpers::insert_cassette(&conn, "cas-1", "bank-a", CassetteStatus::InTransitToRc);
    test_helpers::insert_order(&conn, "ord-1", "bank-a", Some("cas-1"), OrderStatus::Received);

    let repair = RepairApi::new(conn.clone());
    let outcome = repair.create_bulk_repairs("ord-1").unwrap();
    repair
        .complete_repair(&outcome.created[0].ticket_id, true, "清理", None)
        .unwrap();
    assert_eq!(order_status(&conn, "ord-1"), OrderStatus::Resolved);

    // RESOLVED 已不在巡检候选池,重复巡检不再改动任何行
    let api = OrderApi::new(conn.clone());
    let first = api.sync_order_status(None).unwrap();
    assert_eq!(first.updated, 0);
    let second = api.sync_order_status(None).unwrap();
    assert_eq!(second.updated, 0);
    assert_eq!(order_status(&conn, "ord-1"), OrderStatus::Resolved);
}

#[test]
fn test_sync_missing_order_not_found() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    let api = OrderApi::new(conn);
    assert!(api.sync_order_status(Some("ord-miss")).is_err());
}

#[test]
fn test_replacement_only_order_never_auto_resolves() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    test_helpers::insert_cassette(&conn, "cas-1", "bank-a", CassetteStatus::InTransitToRc);
    test_helpers::insert_order(&conn, "ord-1", "bank-a", None, OrderStatus::InProgress);
    test_helpers::insert_detail(&conn, "ord-1", "cas-1", true);

    // 纯置换工单: 无维修子集,巡检不动它
    let report = OrderApi::new(conn.clone()).sync_order_status(Some("ord-1")).unwrap();
    assert_eq!(report.checked, 1);
    assert_eq!(report.updated, 0);
    assert_eq!(order_status(&conn, "ord-1"), OrderStatus::InProgress);
}

#[test]
fn test_time_fence_ignores_older_tickets() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    test_helpers::insert_cassette(&conn, "cas-1", "bank-a", CassetteStatus::InRepair);

    // 历史工单完成于工单创建之前,不参与对账
    let old_completed = Utc::now() - Duration::days(10);
    test_helpers::insert_completed_ticket(
        &conn, "tic-old", "cas-1", None, None, None, 0, old_completed,
    );
    test_helpers::insert_order(&conn, "ord-1", "bank-a", Some("cas-1"), OrderStatus::InProgress);

    let report = OrderApi::new(conn.clone()).sync_order_status(Some("ord-1")).unwrap();
    assert_eq!(report.checked, 1);
    // 围栏内无任何工单 → 缺口方向,非 RESOLVED 工单保持不动
    assert_eq!(report.updated, 0);
    assert_eq!(order_status(&conn, "ord-1"), OrderStatus::InProgress);
}

#[test]
fn test_missing_ticket_reverts_resolved_order() {
    let (_tmp, conn) = test_helpers::setup_test_db();
    test_helpers::insert_cassette(&conn, "cas-1", "bank-a", CassetteStatus::InRepair);
    // 人工误标 RESOLVED,但围栏内没有工单 → 巡检回退
    test_helpers::insert_order(&conn, "ord-1", "bank-a", Some("cas-1"), OrderStatus::Resolved);

    // RESOLVED 不在默认巡检池,单工单指定仍可对账
    let report = OrderApi::new(conn.clone()).sync_order_status(Some("ord-1")).unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(order_status(&conn, "ord-1"), OrderStatus::InProgress);
}
