//! PMT 进度跟踪
//!
//! 迁移工作流的状态中枢：把细粒度的步骤上报折算成整体进度百分比，
//! 维护活动日志与单盘传输子状态，供 HTTP 状态接口轮询。
//!
//! # 主要组件
//!
//! - [`ProgressTracker`]: 共享状态跟踪器，工作流写、接口读
//! - [`MigrationStatus`]: 对外暴露的完整状态快照
//! - [`stages`]: 阶段表与纯进度计算函数
//! - [`format`]: 速度、剩余时间、容量的展示格式化

pub mod format;
pub mod stages;
pub mod status;
pub mod tracker;

pub use format::{format_eta, format_size, format_speed};
pub use stages::{
    calculate_disk_progress, calculate_stage_progress, classify_stage, stage_display_name,
    StageSpec, STAGES,
};
pub use status::{
    ActivityEntry, DiskTransferStatus, MigrationStatus, TransferDirection, MAX_ACTIVITY_ENTRIES,
};
pub use tracker::ProgressTracker;
