// ==========================================
// 钞箱维修管理系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为,避免"部分模块外键开启/部分不开启"
// - 统一 busy_timeout,减少并发写入时的偶发 busy 错误
// - 提供建库脚本 (init_schema),供 CLI init-db 与测试共用
// ==========================================

use rusqlite::Connection;
use std::time::Duration;

/// 默认 busy_timeout(毫秒)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明:
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 初始化数据库 schema(幂等,重复执行安全)
///
/// 时间列统一存 RFC3339 文本(经 rusqlite chrono 特性读写 DateTime<Utc>)
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS cassette (
            cassette_id    TEXT PRIMARY KEY,
            serial_number  TEXT NOT NULL UNIQUE,
            bank_id        TEXT NOT NULL,
            cassette_type  TEXT NOT NULL,
            status         TEXT NOT NULL,
            deleted_at     TEXT,
            created_at     TEXT NOT NULL,
            updated_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS repair_ticket (
            ticket_id              TEXT PRIMARY KEY,
            cassette_id            TEXT NOT NULL REFERENCES cassette(cassette_id),
            order_id               TEXT,
            reported_issue         TEXT NOT NULL,
            status                 TEXT NOT NULL,
            qc_passed              INTEGER,
            assigned_to            TEXT,
            action_taken           TEXT,
            parts_replaced         TEXT,
            warranty_type          TEXT,
            warranty_period_days   INTEGER,
            warranty_start_date    TEXT,
            warranty_end_date      TEXT,
            warranty_claim_count   INTEGER NOT NULL DEFAULT 0,
            warranty_claimed       INTEGER NOT NULL DEFAULT 0,
            claimed_from_ticket_id TEXT,
            completed_at           TEXT,
            deleted_at             TEXT,
            created_at             TEXT NOT NULL,
            updated_at             TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_repair_ticket_cassette
            ON repair_ticket(cassette_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_repair_ticket_order
            ON repair_ticket(order_id);

        CREATE TABLE IF NOT EXISTS service_order (
            order_id    TEXT PRIMARY KEY,
            bank_id     TEXT NOT NULL,
            cassette_id TEXT,
            status      TEXT NOT NULL,
            resolved_at TEXT,
            deleted_at  TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS service_order_detail (
            order_id            TEXT NOT NULL REFERENCES service_order(order_id),
            cassette_id         TEXT NOT NULL,
            request_replacement INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (order_id, cassette_id)
        );

        CREATE TABLE IF NOT EXISTS delivery_record (
            delivery_id  TEXT PRIMARY KEY,
            order_id     TEXT NOT NULL REFERENCES service_order(order_id),
            cassette_id  TEXT NOT NULL,
            delivered_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_delivery_record_cassette
            ON delivery_record(cassette_id, delivered_at);

        CREATE TABLE IF NOT EXISTS warranty_config (
            config_id               TEXT PRIMARY KEY,
            bank_id                 TEXT NOT NULL,
            warranty_type           TEXT NOT NULL,
            period_days             INTEGER NOT NULL,
            max_claims              INTEGER,
            unlimited_claims        INTEGER NOT NULL DEFAULT 0,
            extension_days          INTEGER NOT NULL DEFAULT 0,
            requires_approval       INTEGER NOT NULL DEFAULT 0,
            auto_approve_first_claim INTEGER NOT NULL DEFAULT 0,
            free_repair             INTEGER NOT NULL DEFAULT 0,
            is_active               INTEGER NOT NULL DEFAULT 1,
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL,
            UNIQUE (bank_id, warranty_type)
        );

        CREATE TABLE IF NOT EXISTS return_record (
            return_id    TEXT PRIMARY KEY,
            order_id     TEXT,
            cassette_id  TEXT NOT NULL,
            picked_up_by TEXT NOT NULL,
            picked_up_at TEXT NOT NULL,
            created_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_return_record_cassette
            ON return_record(cassette_id);

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id   TEXT NOT NULL,
            key        TEXT NOT NULL,
            value      TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_idempotent() {
        let conn = Connection::open_in_memory().expect("打开内存库失败");
        configure_sqlite_connection(&conn).expect("PRAGMA 配置失败");
        init_schema(&conn).expect("首次建库失败");
        init_schema(&conn).expect("重复建库应幂等");
    }
}
