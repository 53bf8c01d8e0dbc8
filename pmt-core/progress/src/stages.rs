//! 迁移阶段表与进度计算
//!
//! 迁移全程被划分为 13 个阶段，每个阶段占用整体进度条上的一段固定区间。
//! 阶段内部的相对进度（0-100）按区间宽度折算成整体百分比，
//! 因此无论单个阶段内部上报多少次，整体进度都不会越过阶段边界回跳。

/// 磁盘迁移阶段的键名，跟踪器需要据此启用按磁盘细分的进度公式
pub const STAGE_DISK_MIGRATION: &str = "disk_migration";

/// 完成阶段的键名，进度恒为 100
pub const STAGE_COMPLETED: &str = "completed";

/// 失败步骤的键名
pub const STEP_ERROR: &str = "error";

/// 磁盘迁移阶段在整体进度条上的起点与宽度
pub const DISK_BAND_START: f64 = 50.0;
pub const DISK_BAND_WIDTH: f64 = 40.0;

/// 单个迁移阶段的区间定义
#[derive(Debug, Clone, Copy)]
pub struct StageSpec {
    /// 阶段键名
    pub key: &'static str,
    /// 区间起点（整体百分比）
    pub start: f64,
    /// 区间终点（整体百分比）
    pub end: f64,
    /// 展示名称
    pub name: &'static str,
}

/// 全部迁移阶段，按整体进度顺序排列
pub const STAGES: &[StageSpec] = &[
    StageSpec { key: "initializing", start: 0.0, end: 3.0, name: "初始化" },
    StageSpec { key: "validation", start: 3.0, end: 6.0, name: "参数校验" },
    StageSpec { key: "connecting", start: 6.0, end: 12.0, name: "连接源集群" },
    StageSpec { key: "vm_info", start: 12.0, end: 15.0, name: "获取虚拟机信息" },
    StageSpec { key: "vm_stopping", start: 15.0, end: 25.0, name: "停止虚拟机" },
    StageSpec { key: "ssh_connection", start: 25.0, end: 30.0, name: "建立 SSH 连接" },
    StageSpec { key: "dest_connecting", start: 30.0, end: 35.0, name: "连接目标集群" },
    StageSpec { key: "config_reading", start: 35.0, end: 40.0, name: "读取虚拟机配置" },
    StageSpec { key: "vm_creation", start: 40.0, end: 50.0, name: "创建目标虚拟机" },
    StageSpec { key: STAGE_DISK_MIGRATION, start: 50.0, end: 90.0, name: "磁盘迁移" },
    StageSpec { key: "network_config", start: 90.0, end: 95.0, name: "网络配置" },
    StageSpec { key: "cleanup", start: 95.0, end: 98.0, name: "清理" },
    StageSpec { key: STAGE_COMPLETED, start: 98.0, end: 100.0, name: "迁移完成" },
];

/// 查找阶段定义，未知阶段返回 None
pub fn stage_spec(key: &str) -> Option<&'static StageSpec> {
    STAGES.iter().find(|s| s.key == key)
}

/// 阶段展示名称，未知阶段回退为键名本身
pub fn stage_display_name(key: &str) -> &str {
    stage_spec(key).map(|s| s.name).unwrap_or(key)
}

/// 把细粒度的步骤名归类到所属阶段
///
/// 工作流上报的步骤比阶段更细（例如 `disk_copying`、`vm_id_changed`），
/// 这里按前缀或枚举归并到阶段键；未收录的步骤名按原样返回，
/// 由进度计算兜底为 0。
pub fn classify_stage(step: &str) -> &str {
    match step {
        "vm_stopped" | "vm_ready" => "vm_stopping",
        "ssh_connecting" | "ssh_connected" => "ssh_connection",
        "vm_id_check" | "vm_id_available" | "vm_id_changed" | "vm_creating" | "vm_created" => {
            "vm_creation"
        }
        "network_mapping" | "network_applied" => "network_config",
        "cleanup_done" => "cleanup",
        STEP_ERROR => STEP_ERROR,
        _ if step.starts_with("disk_") => STAGE_DISK_MIGRATION,
        _ => step,
    }
}

/// 把阶段内部进度（0-100）折算为整体百分比
///
/// 完成阶段恒为 100，未知阶段恒为 0，其余阶段线性插值且不超过 100。
pub fn calculate_stage_progress(stage: &str, stage_progress: f64) -> f64 {
    if stage == STAGE_COMPLETED {
        return 100.0;
    }
    match stage_spec(stage) {
        Some(spec) => {
            let pct = stage_progress.clamp(0.0, 100.0);
            (spec.start + (spec.end - spec.start) * pct / 100.0).min(100.0)
        }
        None => 0.0,
    }
}

/// 磁盘迁移阶段内按磁盘细分的进度偏移（相对磁盘区间起点，0-40）
///
/// 区间宽度被均分给每块磁盘，第 k 块磁盘只能在自己的份额内推进，
/// 整体进度 = 区间起点 + 本函数返回值。无磁盘可迁时返回 0。
pub fn calculate_disk_progress(current_disk: u32, total_disks: u32, stage_progress: f64) -> f64 {
    if total_disks == 0 {
        return 0.0;
    }
    let portion = DISK_BAND_WIDTH / total_disks as f64;
    let done = (current_disk.max(1) - 1) as f64 * portion;
    let within = stage_progress.clamp(0.0, 100.0) * portion / 100.0;
    (done + within).min(DISK_BAND_WIDTH)
}

// =============================================================================
// 测试
// =============================================================================
