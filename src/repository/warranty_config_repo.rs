// ==========================================
// 钞箱维修管理系统 - 保修配置仓储
// ==========================================
// 红线: Repository 不含业务逻辑,只负责数据访问
// 约束: 内置默认配置由引擎层兜底,本层查不到即返回 None
// ==========================================

use crate::domain::types::WarrantyType;
use crate::domain::warranty::WarrantyConfiguration;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    config_id, bank_id, warranty_type, period_days, max_claims,
    unlimited_claims, extension_days, requires_approval,
    auto_approve_first_claim, free_repair, is_active,
    created_at, updated_at
"#;

/// 保修配置仓储
/// 职责: 管理 warranty_config 表的 CRUD 操作
pub struct WarrantyConfigRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WarrantyConfigRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增或覆盖配置(按 (bank_id, warranty_type) 唯一键)
    pub fn upsert(&self, config: &WarrantyConfiguration) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO warranty_config (
                config_id, bank_id, warranty_type, period_days, max_claims,
                unlimited_claims, extension_days, requires_approval,
                auto_approve_first_claim, free_repair, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT (bank_id, warranty_type) DO UPDATE SET
                period_days = excluded.period_days,
                max_claims = excluded.max_claims,
                unlimited_claims = excluded.unlimited_claims,
                extension_days = excluded.extension_days,
                requires_approval = excluded.requires_approval,
                auto_approve_first_claim = excluded.auto_approve_first_claim,
                free_repair = excluded.free_repair,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
            params![
                config.config_id,
                config.bank_id,
                config.warranty_type.to_db_str(),
                config.period_days,
                config.max_claims,
                config.unlimited_claims,
                config.extension_days,
                config.requires_approval,
                config.auto_approve_first_claim,
                config.free_repair,
                config.is_active,
                config.created_at,
                config.updated_at,
            ],
        )?;
        Ok(())
    }

    /// 按 (银行, 保修类型) 查询
    pub fn find_by_bank_and_type(
        &self,
        bank_id: &str,
        warranty_type: WarrantyType,
    ) -> RepositoryResult<Option<WarrantyConfiguration>> {
        let conn = self.get_conn()?;
        Self::find_by_bank_and_type_with(&conn, bank_id, warranty_type)
    }

    /// 按 (银行, 保修类型) 查询(事务内)
    pub fn find_by_bank_and_type_with(
        conn: &Connection,
        bank_id: &str,
        warranty_type: WarrantyType,
    ) -> RepositoryResult<Option<WarrantyConfiguration>> {
        let sql = format!(
            "SELECT {} FROM warranty_config WHERE bank_id = ?1 AND warranty_type = ?2",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let result = stmt.query_row(params![bank_id, warranty_type.to_db_str()], map_config_row);
        match result {
            Ok(config) => Ok(Some(config?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 列出银行的启用配置(保修类型判定输入)
    pub fn list_active_by_bank(
        &self,
        bank_id: &str,
    ) -> RepositoryResult<Vec<WarrantyConfiguration>> {
        let conn = self.get_conn()?;
        Self::list_active_by_bank_with(&conn, bank_id)
    }

    /// 列出银行的启用配置(事务内)
    pub fn list_active_by_bank_with(
        conn: &Connection,
        bank_id: &str,
    ) -> RepositoryResult<Vec<WarrantyConfiguration>> {
        let sql = format!(
            r#"SELECT {} FROM warranty_config
               WHERE bank_id = ?1 AND is_active = 1
               ORDER BY warranty_type ASC"#,
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![bank_id], map_config_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().collect()
    }

    /// 列出银行的全部配置(含停用,管理界面用)
    pub fn list_by_bank(&self, bank_id: &str) -> RepositoryResult<Vec<WarrantyConfiguration>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM warranty_config WHERE bank_id = ?1 ORDER BY warranty_type ASC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![bank_id], map_config_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().collect()
    }
}

// ==========================================
// 行映射
// ==========================================

/// 映射 warranty_config 行(保修类型非法时报 FieldValueError)
fn map_config_row(row: &Row<'_>) -> rusqlite::Result<RepositoryResult<WarrantyConfiguration>> {
    let type_str: String = row.get(2)?;
    Ok(match WarrantyType::from_db_str(&type_str) {
        Some(warranty_type) => Ok(WarrantyConfiguration {
            config_id: row.get(0)?,
            bank_id: row.get(1)?,
            warranty_type,
            period_days: row.get(3)?,
            max_claims: row.get(4)?,
            unlimited_claims: row.get(5)?,
            extension_days: row.get(6)?,
            requires_approval: row.get(7)?,
            auto_approve_first_claim: row.get(8)?,
            free_repair: row.get(9)?,
            is_active: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        }),
        None => Err(RepositoryError::bad_field(
            "warranty_config.warranty_type",
            &type_str,
        )),
    })
}
