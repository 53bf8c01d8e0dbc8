//! PMT Proxmox VE API 客户端
//!
//! 封装迁移流程用到的 PVE REST 接口：节点与虚拟机查询、虚拟机创建与
//! 配置修改、存储内容管理、集群资源列表。认证使用 API Token，响应统一
//! 剥掉 `{"data": ...}` 外层。
//!
//! # 使用方式
//!
//! ```no_run
//! use pmt_proxmox::PveClient;
//!
//! # async fn demo() -> pmt_proxmox::Result<()> {
//! let client = PveClient::new("192.168.1.10:8006", "root@pam!pmt", "secret")?;
//! let nodes = client.validate().await?;
//! let vms = client.vm().list(&nodes[0].node).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod error;
pub mod models;

pub use api::{ClusterApi, NodeApi, StorageApi, VmApi};
pub use client::PveClient;
pub use error::{PveError, Result};
pub use models::{
    config_text, is_block_storage, is_disk_slot, is_mounted_storage, ClusterResource, NodeInfo,
    StorageContent, StorageInfo, VmConfig, VmEntry, VmStatus, VmSummary, VolumeDescriptor,
};
