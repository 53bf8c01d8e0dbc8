//! 迁移状态数据结构
//!
//! [`MigrationStatus`] 是状态接口返回的完整快照，字段名即对外 JSON 字段，
//! 前端轮询 `/api/migration-status` 时直接渲染。

use serde::{Deserialize, Serialize};

/// 活动日志的最大条数，超出后丢弃最旧的记录
pub const MAX_ACTIVITY_ENTRIES: usize = 30;

/// 去重时向前回看的日志条数
pub const DEDUP_LOOKBACK: usize = 3;

/// 磁盘数据的传输方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    /// 源节点落到本机暂存
    Download,
    /// 本机暂存推到目标节点
    Upload,
}

impl std::fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferDirection::Download => write!(f, "download"),
            TransferDirection::Upload => write!(f, "upload"),
        }
    }
}

/// 活动日志单条记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// 记录时刻，`HH:MM:SS`
    pub timestamp: String,
    /// 展示文本，详情优先于概要
    pub message: String,
    /// 所属阶段的展示名称
    pub stage: String,
    /// 记录时的整体进度（取整）
    pub progress: i64,
    /// 前端列表渲染用的去重键
    pub key: String,
}

/// 正在进行的单盘传输状态
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiskTransferStatus {
    /// 是否有传输正在进行
    pub active: bool,
    /// 当前传输的磁盘名
    pub current_disk_name: String,
    /// 传输方向
    pub transfer_type: Option<TransferDirection>,
    /// 本盘传输百分比（0-100）
    pub progress: f64,
    /// 格式化后的速度
    pub speed: String,
    /// 格式化后的剩余时间，速度未知时为空
    pub eta: String,
    /// 已传输字节数
    pub transferred: u64,
    /// 总字节数
    pub total_size: u64,
}

/// 一次迁移的完整状态快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationStatus {
    /// 是否有迁移在进行
    pub active: bool,
    /// 目标集群上的虚拟机编号
    pub vmid: Option<u32>,
    /// 最近一次上报的步骤名
    pub step: String,
    /// 步骤归类后的阶段键
    pub current_stage: String,
    /// 整体进度（0-100）
    pub progress: f64,
    /// 当前概要信息
    pub message: String,
    /// 活动日志，最多保留 [`MAX_ACTIVITY_ENTRIES`] 条
    pub details: Vec<ActivityEntry>,
    /// 正在处理第几块磁盘（从 1 计）
    pub current_disk: u32,
    /// 待迁移磁盘总数
    pub total_disks: u32,
    /// 单盘传输子状态
    pub disk_transfer: DiskTransferStatus,
    /// 是否在等待用户确认停机
    pub needs_confirmation: bool,
    /// 用户是否已确认停机
    pub stop_confirmed: bool,
}

impl Default for MigrationStatus {
    fn default() -> Self {
        Self {
            active: false,
            vmid: None,
            step: String::new(),
            current_stage: String::new(),
            progress: 0.0,
            message: String::new(),
            details: Vec::new(),
            current_disk: 0,
            total_disks: 0,
            disk_transfer: DiskTransferStatus::default(),
            needs_confirmation: false,
            stop_confirmed: false,
        }
    }
}
