// ==========================================
// 钞箱维修管理系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value, scope_id='global')
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use crate::engine::return_core::UrgencyThresholds;

/// 全局作用域 ID
const GLOBAL_SCOPE: &str = "global";

// ===== 配置键 =====
const KEY_RETURN_ATTENTION_DAYS: &str = "return.attention_days";
const KEY_RETURN_URGENT_DAYS: &str = "return.urgent_days";
const KEY_RETURN_VERY_URGENT_DAYS: &str = "return.very_urgent_days";
const KEY_TICKET_RETENTION_DAYS: &str = "retention.ticket_days";

/// 工单软删除留存天数默认值
const DEFAULT_TICKET_RETENTION_DAYS: i64 = 180;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取配置值(scope_id='global'); 无记录返回 None
    pub fn get_string(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![GLOBAL_SCOPE, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 读取整数配置; 缺失或不可解析时返回默认值并记录警告
    pub fn get_i64_or(&self, key: &str, default: i64) -> RepositoryResult<i64> {
        match self.get_string(key)? {
            Some(raw) => match raw.parse::<i64>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!(key, raw, "配置值不可解析为整数,使用默认值 {}", default);
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    /// 写入配置值(upsert)
    pub fn set(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT (scope_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![GLOBAL_SCOPE, key, value],
        )?;
        Ok(())
    }

    /// 待取回紧急分桶阈值(默认 3/7/14 天)
    pub fn return_urgency_thresholds(&self) -> RepositoryResult<UrgencyThresholds> {
        let defaults = UrgencyThresholds::default();
        Ok(UrgencyThresholds {
            attention_days: self.get_i64_or(KEY_RETURN_ATTENTION_DAYS, defaults.attention_days)?,
            urgent_days: self.get_i64_or(KEY_RETURN_URGENT_DAYS, defaults.urgent_days)?,
            very_urgent_days: self
                .get_i64_or(KEY_RETURN_VERY_URGENT_DAYS, defaults.very_urgent_days)?,
        })
    }

    /// 工单软删除留存天数(默认 180 天)
    pub fn ticket_retention_days(&self) -> RepositoryResult<i64> {
        self.get_i64_or(KEY_TICKET_RETENTION_DAYS, DEFAULT_TICKET_RETENTION_DAYS)
    }
}
