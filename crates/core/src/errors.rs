use thiserror::Error;

/// 派单引擎错误类型定义
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("订单存储错误: {0}")]
    OrderStore(String),

    #[error("骑手注册表错误: {0}")]
    CourierRegistry(String),

    #[error("连接注册表错误: {0}")]
    ConnectionRegistry(String),

    #[error("拒单缓存错误: {0}")]
    RejectionCache(String),

    #[error("通知发送失败: {0}")]
    Notification(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("派单引擎已停止")]
    EngineStopped,

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
