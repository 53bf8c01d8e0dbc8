//! PMT 迁移编排器
//!
//! 把一台虚拟机从一个 Proxmox 集群搬到另一个独立集群的完整流程：
//! 读取源端配置、必要时停机、在目标端重建虚拟机、逐块磁盘经由
//! SSH 中转搬运数据、重映射存储与网桥，最后按需删除源虚拟机。
//! 全程进度写入共享的进度跟踪器，供 HTTP 层对外展示。
//!
//! 对外入口是 [`MigrationService`]，内部的工作流、配置拆分与
//! 磁盘规划都不直接暴露。

mod config;
mod error;
mod request;
mod service;
mod workflow;

pub use error::{MigrationError, Result};
pub use request::MigrationRequest;
pub use service::MigrationService;
