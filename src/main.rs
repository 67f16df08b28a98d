// ==========================================
// 钞箱维修管理系统 - 运维入口
// ==========================================
// 技术栈: Rust + SQLite
// 用途: 对账巡检 / 待取回报表 / 留存清理 / 库初始化
// ==========================================

use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};

use cassette_repair::api::{OrderApi, ReturnApi};
use cassette_repair::config::ConfigManager;
use cassette_repair::repository::RepairTicketRepository;
use cassette_repair::{db, logging};

fn main() -> ExitCode {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{} v{}", cassette_repair::APP_NAME, cassette_repair::VERSION);
    tracing::info!("==================================================");

    let args: Vec<String> = std::env::args().collect();
    let (command, db_path) = match (args.get(1), args.get(2)) {
        (Some(command), Some(db_path)) => (command.as_str(), db_path.as_str()),
        _ => {
            print_usage();
            return ExitCode::from(2);
        }
    };

    match run(command, db_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "命令执行失败");
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!("用法: cassette-repair-aps <命令> <数据库路径>");
    eprintln!();
    eprintln!("命令:");
    eprintln!("  init-db          初始化数据库结构");
    eprintln!("  sync             全量服务工单状态对账巡检");
    eprintln!("  pending-returns  输出待取回聚合报表");
    eprintln!("  sweep            硬删除超过留存期的软删除工单");
}

fn run(command: &str, db_path: &str) -> anyhow::Result<()> {
    tracing::info!("使用数据库: {}", db_path);
    let conn = db::open_sqlite_connection(db_path)?;

    if command == "init-db" {
        db::init_schema(&conn)?;
        tracing::info!("数据库结构初始化完成");
        return Ok(());
    }

    let conn = Arc::new(Mutex::new(conn));
    match command {
        "sync" => {
            let report = OrderApi::new(conn).sync_order_status(None)?;
            tracing::info!(
                checked = report.checked,
                updated = report.updated,
                errors = report.errors.len(),
                "对账巡检完成"
            );
            for error in &report.errors {
                tracing::warn!("巡检失败项: {}", error);
            }
        }
        "pending-returns" => {
            let report = ReturnApi::new(conn).get_pending_returns(1, 100)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "sweep" => {
            let config = ConfigManager::from_connection(conn.clone());
            let retention_days = config.ticket_retention_days()?;
            let cutoff = Utc::now() - Duration::days(retention_days);
            let purged = RepairTicketRepository::from_connection(conn)
                .purge_soft_deleted_before(cutoff)?;
            tracing::info!(retention_days, purged, "留存清理完成");
        }
        _ => {
            print_usage();
            anyhow::bail!("未知命令: {}", command);
        }
    }
    Ok(())
}
