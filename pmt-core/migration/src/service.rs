//! 迁移服务门面
//!
//! 对外只有四个动作：受理、查状态、确认停机、取消。同一时间只允许
//! 一个迁移任务在跑，受理成功即返回，工作流在后台任务里推进，调用
//! 方通过状态快照轮询进展。

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use pmt_common::ClusterRegistry;
use pmt_progress::{MigrationStatus, ProgressTracker};

use crate::error::{MigrationError, Result};
use crate::request::MigrationRequest;
use crate::workflow::{MigrationWorkflow, WorkflowOutcome};

/// 迁移编排服务
///
/// busy 判定和对外状态都以内部唯一的进度跟踪器为准。
pub struct MigrationService {
    registry: Arc<dyn ClusterRegistry>,
    tracker: ProgressTracker,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MigrationService {
    pub fn new(registry: Arc<dyn ClusterRegistry>) -> Self {
        Self {
            registry,
            tracker: ProgressTracker::new(),
            handle: Mutex::new(None),
        }
    }

    /// 受理一次迁移请求
    ///
    /// 已有任务在进行中时直接拒绝；受理会重置进度状态并启动后台
    /// 工作流，后续结果通过 [`status`](Self::status) 轮询。
    pub async fn start(&self, request: MigrationRequest) -> Result<()> {
        if !self.tracker.try_begin(request.vmid).await {
            return Err(MigrationError::Busy);
        }
        info!(
            "受理迁移请求: 虚拟机 {} ({} -> {})",
            request.vmid, request.source_cluster_id, request.dest_cluster_id
        );
        let tracker = self.tracker.clone();
        let workflow = MigrationWorkflow::new(request, self.registry.clone(), tracker.clone());
        let handle = tokio::spawn(async move {
            match workflow.run().await {
                Ok(WorkflowOutcome::Completed { message }) => info!("{}", message),
                Ok(WorkflowOutcome::Cancelled) => info!("迁移任务已按用户要求取消"),
                Err(err) => {
                    error!("迁移失败: {}", err);
                    tracker.fail(format!("迁移失败: {}", err)).await;
                }
            }
        });
        *self.handle.lock().await = Some(handle);
        Ok(())
    }

    /// 当前迁移状态的快照
    pub async fn status(&self) -> MigrationStatus {
        self.tracker.snapshot().await
    }

    /// 确认停止源虚拟机，返回是否有迁移接收了这次确认
    pub async fn confirm_stop(&self) -> bool {
        self.tracker.confirm_stop().await
    }

    /// 取消当前迁移，返回是否有任务被取消
    pub async fn cancel(&self) -> bool {
        self.tracker.cancel().await
    }
}

// =============================================================================
// 测试
// =============================================================================
