//! 迁移工作流错误类型

use thiserror::Error;

/// 迁移过程的失败分类
///
/// 底层各 crate 的错误通过 `#[from]` 原样带上来，编排层只补充
/// 自己语义内的几类：参数校验、并发互斥、超时与资源耗尽。
#[derive(Debug, Error)]
pub enum MigrationError {
    /// 请求参数缺失或格式不对，尚未触达任何远端
    #[error("请求校验失败: {0}")]
    Validation(String),

    /// 已有迁移任务在进行，单槽位互斥拒绝
    #[error("已有迁移任务在进行中")]
    Busy,

    /// 注册表里查不到这个集群
    #[error("集群 {0} 未注册")]
    ClusterNotFound(String),

    /// 控制平面 API 失败（连接、认证、调用均归于此）
    #[error("Proxmox API 错误: {0}")]
    Pve(#[from] pmt_proxmox::PveError),

    /// SSH 执行失败
    #[error("SSH 错误: {0}")]
    Ssh(#[from] pmt_ssh_executor::SshError),

    /// 磁盘数据搬运失败
    #[error("磁盘传输失败: {0}")]
    Transfer(#[from] pmt_disk_transfer::TransferError),

    /// 等待类操作超过了时限
    #[error("{0}")]
    Timeout(String),

    /// 可分配资源耗尽（例如找不到可用的虚拟机编号）
    #[error("{0}")]
    ResourceExhausted(String),
}

/// 迁移编排的统一结果类型
pub type Result<T> = std::result::Result<T, MigrationError>;
