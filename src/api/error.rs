// ==========================================
// 钞箱维修管理系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型,转换Repository错误为用户可读的错误消息
// 约束: 所有错误同步返回,核心不做自动重试; 重试属于调用方
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效的状态转换: {entity} from={from} to={to}")]
    InvalidState {
        entity: String,
        from: String,
        to: String,
    },

    #[error("工单已完成,不可重复完成: ticket_id={0}")]
    AlreadyCompleted(String),

    #[error("领单冲突: ticket_id={ticket_id} 已分配给 {assigned_to}")]
    Conflict {
        ticket_id: String,
        assigned_to: String,
    },

    #[error("批量上限超出: 工单覆盖 {actual} 个钞箱,上限 {limit}")]
    LimitExceeded { actual: usize, limit: usize },

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    // ==========================================
    // 保修错误
    // ==========================================
    #[error("保修已过期: ticket_id={0}")]
    WarrantyExpired(String),

    #[error("索赔次数已达上限: ticket_id={ticket_id}, 已索赔 {claim_count} 次")]
    ClaimLimitReached { ticket_id: String, claim_count: i32 },

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),
}

// Repository错误转换为API错误
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{} (id={})", entity, id))
            }
            other => ApiError::DatabaseError(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::from(RepositoryError::from(err))
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
