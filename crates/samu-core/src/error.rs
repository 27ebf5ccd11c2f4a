//! 错误定义模块

use thiserror::Error;

/// SAMU系统统一错误类型
#[derive(Error, Debug)]
pub enum SamuError {
    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {kind} {id}")]
    ReferenceNotFound { kind: String, id: String },

    #[error("无效状态转换: {entity} 当前状态 {from}, 尝试 {attempted}")]
    IllegalStateTransition {
        entity: String,
        from: String,
        attempted: String,
    },

    #[error("车辆不可用: {vehicle_id} ({reason})")]
    VehicleNotAvailable { vehicle_id: String, reason: String },

    #[error("上游服务超时: {0}")]
    UpstreamTimeout(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl SamuError {
    /// 构造资源未找到错误
    pub fn not_found(kind: &str, id: impl ToString) -> Self {
        Self::ReferenceNotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }

    /// 构造状态转换错误
    pub fn illegal_transition(
        entity: &str,
        from: impl std::fmt::Debug,
        attempted: impl std::fmt::Debug,
    ) -> Self {
        Self::IllegalStateTransition {
            entity: entity.to_string(),
            from: format!("{:?}", from),
            attempted: format!("{:?}", attempted),
        }
    }

    /// 构造车辆不可用错误
    pub fn vehicle_not_available(vehicle_id: impl ToString, reason: impl Into<String>) -> Self {
        Self::VehicleNotAvailable {
            vehicle_id: vehicle_id.to_string(),
            reason: reason.into(),
        }
    }
}

/// SAMU系统统一结果类型
pub type Result<T> = std::result::Result<T, SamuError>;
