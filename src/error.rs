use thiserror::Error;

/// 基底注册表错误类型
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("编解码错误 [{algorithm}]: {message}")]
    Codec { algorithm: String, message: String },

    #[error("未找到: {0}")]
    NotFound(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, RegistryError>;
