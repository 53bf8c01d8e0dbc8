//! Proxmox API 错误类型

use thiserror::Error;

/// Proxmox API 访问错误
#[derive(Debug, Error)]
pub enum PveError {
    /// HTTP 请求本身失败（网络、TLS、超时等）
    #[error("请求失败: {0}")]
    Request(#[from] reqwest::Error),

    /// 无法建立到集群的连接，reason 中带有排查提示
    #[error("无法连接到集群 {host}: {reason}")]
    Connection { host: String, reason: String },

    /// API Token 认证失败
    #[error("API 认证失败: {0}")]
    Authentication(String),

    /// API 返回了错误状态码
    #[error("API 调用失败 (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// 响应格式不符合预期
    #[error("响应解析失败: {0}")]
    Parse(String),

    /// 请求的资源不存在
    #[error("资源不存在: {0}")]
    NotFound(String),
}

/// Proxmox API 操作的统一结果类型
pub type Result<T> = std::result::Result<T, PveError>;
