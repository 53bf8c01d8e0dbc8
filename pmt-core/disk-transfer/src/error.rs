//! 磁盘传输错误定义

use thiserror::Error;

/// 磁盘传输结果类型
pub type Result<T> = std::result::Result<T, TransferError>;

/// 磁盘传输错误类型
///
/// 重命名与临时文件清理的失败只降级为警告，不会出现在这里。
#[derive(Error, Debug)]
pub enum TransferError {
    /// 在源端找不到磁盘对应的文件或设备
    #[error("无法定位源磁盘: {0}")]
    Locate(String),

    /// 找到的路径不是块设备，无法按块设备方式复制
    #[error("仅支持复制块设备: {0}")]
    UnsupportedDevice(String),

    /// dd 生成块设备快照失败
    #[error("创建块设备快照失败: {0}")]
    Snapshot(String),

    /// 目标端可用空间不足
    #[error("目标 {path} 空间不足: 需要 {required_gb}GB（含 20% 余量），可用 {available_gb}GB")]
    Space {
        path: String,
        required_gb: u64,
        available_gb: u64,
    },

    /// 目标目录无法创建或验证
    #[error("无法创建或验证目标目录 {path}: {reason}")]
    DestDir { path: String, reason: String },

    /// Proxmox API 错误
    #[error("Proxmox API 错误: {0}")]
    Pve(#[from] pmt_proxmox::PveError),

    /// SSH 错误
    #[error("SSH 错误: {0}")]
    Ssh(#[from] pmt_ssh_executor::SshError),

    /// 本地暂存文件 IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}
