//! 进度跟踪器
//!
//! [`ProgressTracker`] 持有一份共享的 [`MigrationStatus`]，工作流各环节通过它
//! 上报步骤，HTTP 层通过它读取快照。所有写入都在同一把锁内完成步骤归类、
//! 进度折算、活动日志去重与截断，调用方只管报告发生了什么。

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use crate::format::{format_eta, format_speed};
use crate::stages::{
    calculate_disk_progress, calculate_stage_progress, classify_stage, stage_display_name,
    DISK_BAND_START, STAGE_DISK_MIGRATION, STEP_ERROR,
};
use crate::status::{
    ActivityEntry, DiskTransferStatus, MigrationStatus, TransferDirection, DEDUP_LOOKBACK,
    MAX_ACTIVITY_ENTRIES,
};

/// 迁移进度跟踪器，可廉价克隆后在任务间共享
#[derive(Clone, Default)]
pub struct ProgressTracker {
    inner: Arc<Mutex<MigrationStatus>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试开始一次新迁移
    ///
    /// 已有迁移在进行时返回 false，否则清空上一次的状态并标记激活。
    /// 检查与激活在同一把锁内完成，并发请求只会有一个成功。
    pub async fn try_begin(&self, vmid: u32) -> bool {
        let mut status = self.inner.lock().await;
        if status.active {
            return false;
        }
        *status = MigrationStatus {
            active: true,
            vmid: Some(vmid),
            ..MigrationStatus::default()
        };
        true
    }

    /// 上报一个步骤（无详情）
    pub async fn update(&self, step: &str, message: impl Into<String>, stage_progress: f64) {
        self.apply(step, message.into(), None, stage_progress, None).await;
    }

    /// 上报一个步骤并附带详情，详情会进入活动日志
    pub async fn update_detailed(
        &self,
        step: &str,
        message: impl Into<String>,
        details: impl Into<String>,
        stage_progress: f64,
    ) {
        self.apply(step, message.into(), Some(details.into()), stage_progress, None)
            .await;
    }

    /// 标记迁移完成，整体进度固定为 100
    pub async fn complete(&self, message: impl Into<String>, details: impl Into<String>) {
        self.apply("completed", message.into(), Some(details.into()), 100.0, Some(100.0))
            .await;
        let mut status = self.inner.lock().await;
        status.active = false;
    }

    /// 标记迁移失败，保留失败前的进度值
    pub async fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        let mut status = self.inner.lock().await;
        status.active = false;
        status.step = STEP_ERROR.to_string();
        status.current_stage = STEP_ERROR.to_string();
        status.message = message.clone();
        let progress = status.progress;
        push_entry(&mut status, STEP_ERROR, message, progress);
    }

    /// 更新迁移目标虚拟机编号（目标编号被占用改号后调用）
    pub async fn set_vmid(&self, vmid: u32) {
        self.inner.lock().await.vmid = Some(vmid);
    }

    /// 设置待迁移磁盘总数
    pub async fn set_total_disks(&self, total: u32) {
        self.inner.lock().await.total_disks = total;
    }

    /// 设置当前处理到第几块磁盘（从 1 计）
    pub async fn set_current_disk(&self, current: u32) {
        self.inner.lock().await.current_disk = current;
    }

    /// 刷新单盘传输子状态，速度与剩余时间在此格式化
    pub async fn update_disk_transfer(
        &self,
        disk_name: &str,
        direction: TransferDirection,
        progress: f64,
        transferred: u64,
        total_size: u64,
        speed_mbps: f64,
    ) {
        let mut status = self.inner.lock().await;
        status.disk_transfer = DiskTransferStatus {
            active: true,
            current_disk_name: disk_name.to_string(),
            transfer_type: Some(direction),
            progress: progress.clamp(0.0, 100.0),
            speed: format_speed(speed_mbps),
            eta: format_eta(transferred, total_size, speed_mbps),
            transferred,
            total_size,
        };
    }

    /// 结束单盘传输展示，保留最后一次的数值供前端停留显示
    pub async fn stop_disk_transfer(&self) {
        self.inner.lock().await.disk_transfer.active = false;
    }

    /// 进入等待用户确认停机的状态
    pub async fn request_confirmation(&self) {
        self.inner.lock().await.needs_confirmation = true;
    }

    /// 用户确认停机，无进行中的迁移时返回 false
    pub async fn confirm_stop(&self) -> bool {
        let mut status = self.inner.lock().await;
        if !status.active {
            return false;
        }
        status.stop_confirmed = true;
        status.needs_confirmation = false;
        true
    }

    /// 取消迁移，无进行中的迁移时返回 false
    ///
    /// 只把激活位清掉，正在轮询确认的工作流看到后会自行收尾退出。
    pub async fn cancel(&self) -> bool {
        let mut status = self.inner.lock().await;
        if !status.active {
            return false;
        }
        status.active = false;
        status.needs_confirmation = false;
        status.step = "cancelled".to_string();
        status.message = "迁移已取消".to_string();
        true
    }

    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.active
    }

    pub async fn is_stop_confirmed(&self) -> bool {
        self.inner.lock().await.stop_confirmed
    }

    /// 当前完整状态的拷贝
    pub async fn snapshot(&self) -> MigrationStatus {
        self.inner.lock().await.clone()
    }

    async fn apply(
        &self,
        step: &str,
        message: String,
        details: Option<String>,
        stage_progress: f64,
        progress_override: Option<f64>,
    ) {
        let mut status = self.inner.lock().await;
        let stage = classify_stage(step).to_string();
        let progress = match progress_override {
            Some(p) => p.min(100.0),
            None if stage == STAGE_DISK_MIGRATION && status.total_disks > 0 => {
                DISK_BAND_START
                    + calculate_disk_progress(
                        status.current_disk,
                        status.total_disks,
                        stage_progress,
                    )
            }
            None => calculate_stage_progress(&stage, stage_progress),
        };
        status.step = step.to_string();
        status.current_stage = stage;
        status.progress = progress;
        status.message = message.clone();

        let text = match details {
            Some(d) if !d.is_empty() => d,
            _ => message,
        };
        if !text.is_empty() {
            push_entry(&mut status, step, text, progress);
        }

        info!(
            "迁移进度 {:.1}% [{}] {}",
            status.progress, status.step, status.message
        );
    }
}

/// 追加一条活动日志，带去重与容量上限
///
/// 最近几条里已有同文本且进度差不超过 1 个点的记录时跳过，
/// 避免轮询式步骤刷屏；超出上限时丢弃最旧的。
fn push_entry(status: &mut MigrationStatus, step: &str, text: String, progress: f64) {
    let progress_int = progress.round() as i64;
    let duplicate = status
        .details
        .iter()
        .rev()
        .take(DEDUP_LOOKBACK)
        .any(|e| e.message == text && (e.progress - progress_int).abs() <= 1);
    if duplicate {
        return;
    }
    let timestamp = chrono::Local::now().format("%H:%M:%S").to_string();
    let key = format!("{}_{}_{}", step, progress_int, timestamp.replace(':', ""));
    status.details.push(ActivityEntry {
        timestamp,
        message: text,
        stage: stage_display_name(&status.current_stage).to_string(),
        progress: progress_int,
        key,
    });
    if status.details.len() > MAX_ACTIVITY_ENTRIES {
        let overflow = status.details.len() - MAX_ACTIVITY_ENTRIES;
        status.details.drain(..overflow);
    }
}

// =============================================================================
// 测试
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_try_begin_rejects_second_run() {
        let tracker = ProgressTracker::new();
        assert!(tracker.try_begin(100).await);
        assert!(!tracker.try_begin(101).await);
        let status = tracker.snapshot().await;
        assert!(status.active);
        assert_eq!(status.vmid, Some(100));
    }

    #[tokio::test]
    async fn test_begin_clears_previous_run() {
        let tracker = ProgressTracker::new();
        assert!(tracker.try_begin(100).await);
        tracker.update("validation", "校验参数", 50.0).await;
        tracker.fail("源集群不可达").await;
        assert!(tracker.try_begin(200).await);
        let status = tracker.snapshot().await;
        assert_eq!(status.vmid, Some(200));
        assert_eq!(status.progress, 0.0);
        assert!(status.details.is_empty());
    }

    #[tokio::test]
    async fn test_update_maps_step_to_stage() {
        let tracker = ProgressTracker::new();
        tracker.try_begin(100).await;
        tracker.update("ssh_connected", "SSH 已连接", 100.0).await;
        let status = tracker.snapshot().await;
        assert_eq!(status.current_stage, "ssh_connection");
        assert_eq!(status.progress, 30.0);
        assert_eq!(status.details.last().map(|e| e.stage.as_str()), Some("建立 SSH 连接"));
    }

    #[tokio::test]
    async fn test_disk_steps_use_per_disk_band() {
        let tracker = ProgressTracker::new();
        tracker.try_begin(100).await;
        tracker.set_total_disks(2).await;
        tracker.set_current_disk(2).await;
        tracker.update("disk_copying", "复制磁盘数据", 50.0).await;
        let status = tracker.snapshot().await;
        // 第 2/2 块磁盘的份额是 70-90，中点应为 80
        assert_eq!(status.progress, 80.0);
    }

    #[tokio::test]
    async fn test_complete_forces_100_and_deactivates() {
        let tracker = ProgressTracker::new();
        tracker.try_begin(100).await;
        tracker.complete("迁移完成", "虚拟机已迁移为 105").await;
        let status = tracker.snapshot().await;
        assert_eq!(status.progress, 100.0);
        assert!(!status.active);
        assert_eq!(status.step, "completed");
    }

    #[tokio::test]
    async fn test_fail_keeps_progress() {
        let tracker = ProgressTracker::new();
        tracker.try_begin(100).await;
        tracker.update("vm_creating", "创建虚拟机", 80.0).await;
        let before = tracker.snapshot().await.progress;
        tracker.fail("目标集群拒绝连接").await;
        let status = tracker.snapshot().await;
        assert!(!status.active);
        assert_eq!(status.step, "error");
        assert_eq!(status.progress, before);
        assert_eq!(status.message, "目标集群拒绝连接");
    }

    #[tokio::test]
    async fn test_activity_log_dedup() {
        let tracker = ProgressTracker::new();
        tracker.try_begin(100).await;
        tracker.update("vm_stopping", "等待虚拟机停止", 10.0).await;
        tracker.update("vm_stopping", "等待虚拟机停止", 10.0).await;
        tracker.update("vm_stopping", "等待虚拟机停止", 11.0).await;
        let status = tracker.snapshot().await;
        assert_eq!(status.details.len(), 1);
    }

    #[tokio::test]
    async fn test_activity_log_capped() {
        let tracker = ProgressTracker::new();
        tracker.try_begin(100).await;
        for i in 0..40 {
            tracker
                .update("disk_copying", format!("复制数据块 {}", i), (i % 100) as f64)
                .await;
        }
        let status = tracker.snapshot().await;
        assert_eq!(status.details.len(), MAX_ACTIVITY_ENTRIES);
        // 最旧的记录被丢弃
        assert_eq!(status.details.first().map(|e| e.message.as_str()), Some("复制数据块 10"));
    }

    #[tokio::test]
    async fn test_details_preferred_over_message() {
        let tracker = ProgressTracker::new();
        tracker.try_begin(100).await;
        tracker
            .update_detailed("disk_created", "创建磁盘", "磁盘 local:vm-100-disk-0 已创建", 40.0)
            .await;
        let status = tracker.snapshot().await;
        assert_eq!(
            status.details.last().map(|e| e.message.as_str()),
            Some("磁盘 local:vm-100-disk-0 已创建")
        );
        assert_eq!(status.message, "创建磁盘");
    }

    #[tokio::test]
    async fn test_confirm_and_cancel() {
        let tracker = ProgressTracker::new();
        assert!(!tracker.confirm_stop().await);
        assert!(!tracker.cancel().await);

        tracker.try_begin(100).await;
        tracker.request_confirmation().await;
        assert!(tracker.snapshot().await.needs_confirmation);
        assert!(tracker.confirm_stop().await);
        let status = tracker.snapshot().await;
        assert!(status.stop_confirmed);
        assert!(!status.needs_confirmation);

        assert!(tracker.cancel().await);
        assert!(!tracker.is_active().await);
    }

    #[tokio::test]
    async fn test_disk_transfer_status_formatting() {
        let tracker = ProgressTracker::new();
        tracker.try_begin(100).await;
        let mb = 1024 * 1024;
        tracker
            .update_disk_transfer("vm-100-disk-0.qcow2", TransferDirection::Download, 25.0, 250 * mb, 1000 * mb, 10.0)
            .await;
        let status = tracker.snapshot().await;
        assert!(status.disk_transfer.active);
        assert_eq!(status.disk_transfer.speed, "10.0 MB/s");
        assert_eq!(status.disk_transfer.eta, "1m 15s");
        tracker.stop_disk_transfer().await;
        let status = tracker.snapshot().await;
        assert!(!status.disk_transfer.active);
        assert_eq!(status.disk_transfer.transferred, 250 * mb);
    }
}
