//! PMT 磁盘迁移引擎
//!
//! 负责单块磁盘在两个集群之间的完整搬运：识别源存储类型，定位后备
//! 文件或块设备，经本地暂存目录下载再上传，按目标存储的目录约定落位
//! 并重命名为规范文件名。传输全程通过进度跟踪器上报节流后的速度、
//! 百分比与剩余时间估算。

mod dest_path;
mod error;
mod locate;
mod service;
mod throttle;

pub use error::{Result, TransferError};
pub use service::{DiskTransferService, TransferEndpoints};
