//! 磁盘传输服务
//!
//! 单块磁盘从源集群搬到目标集群的完整过程：
//! - 识别源存储类型，文件类直接传文件，其余按块设备做 dd 快照
//! - 候选路径探测加 find 兜底的多级定位
//! - 经本地暂存目录下载再上传，传输中按间隔上报速度与剩余时间
//! - 目标端空间检查、建目录验证、上传后重命名为规范文件名
//! - 本地与源端临时文件的限次清理，清理失败不影响结果

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pmt_progress::{format_size, ProgressTracker, TransferDirection};
use pmt_proxmox::{PveClient, StorageInfo, VolumeDescriptor};
use pmt_ssh_executor::{sh_quote, SshClient};

use crate::dest_path::{default_location, rename_target, resolve_location, DestLocation};
use crate::error::{Result, TransferError};
use crate::locate::{
    base_name, candidate_paths, first_block_candidate, first_find_match, first_substring_match,
    sanitize_temp_component, search_bases,
};
use crate::throttle::{ThrottledReporter, TransferSample};

// ============================================
// 常量
// ============================================

/// 本地暂存目录（相对工作目录）
const STAGING_DIR: &str = "temp_migration";

/// 源端块设备快照的存放目录
const SOURCE_TEMP_DIR: &str = "/var/tmp";

/// 传输进度的最小上报间隔
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// 本地暂存文件删除的尝试次数
const CLEANUP_ATTEMPTS: u32 = 3;

/// 每次删除尝试前的等待
const CLEANUP_RETRY_DELAY: Duration = Duration::from_secs(1);

/// 空间检查在源文件大小上追加的安全余量
const SPACE_SAFETY_FACTOR: f64 = 1.2;

/// 源文件大小取不到时按这个值做空间检查（GB）
const FALLBACK_SIZE_GB: f64 = 10.0;

/// 传输两端的连接句柄
pub struct TransferEndpoints {
    pub source_api: PveClient,
    pub dest_api: PveClient,
    pub source_ssh: SshClient,
    pub dest_ssh: SshClient,
}

/// 磁盘传输服务
///
/// 一次迁移构造一个实例，按磁盘逐个调用 [`copy_disk`](Self::copy_disk)。
pub struct DiskTransferService {
    endpoints: TransferEndpoints,
    tracker: ProgressTracker,
    source_vmid: u32,
    target_vmid: u32,
    dest_node: String,
}

impl DiskTransferService {
    /// 创建磁盘传输服务
    ///
    /// 候选路径探测用源端虚拟机编号，目标落点与临时文件命名用目标编号。
    pub fn new(
        endpoints: TransferEndpoints,
        tracker: ProgressTracker,
        source_vmid: u32,
        target_vmid: u32,
        dest_node: impl Into<String>,
    ) -> Self {
        Self {
            endpoints,
            tracker,
            source_vmid,
            target_vmid,
            dest_node: dest_node.into(),
        }
    }

    /// 复制一块磁盘，返回数据在目标端的最终路径
    ///
    /// `dest_storage` 是存储映射里的目标存储名，`dest_format` 是目标磁盘
    /// 创建时的格式，重命名的扩展名跟它走。
    pub async fn copy_disk(
        &self,
        descriptor: &VolumeDescriptor,
        dest_storage: Option<&str>,
        dest_format: &str,
    ) -> Result<String> {
        let uuid = Uuid::new_v4().to_string();
        let copy_id = &uuid[..8];
        info!(
            "[{}] 开始复制磁盘 {}:{}",
            copy_id, descriptor.storage, descriptor.volume
        );

        let storage_type = self.source_storage_type(&descriptor.storage).await;
        debug!("[{}] 源存储 {} 类型: {}", copy_id, descriptor.storage, storage_type);

        // 文件类存储直接传文件，其余（含识别失败）一律按块设备处理
        match storage_type.as_str() {
            "dir" | "glusterfs" | "nfs" | "cifs" => {
                self.copy_file_based(copy_id, &storage_type, descriptor, dest_storage, dest_format)
                    .await
            }
            _ => {
                self.copy_block_based(copy_id, descriptor, dest_storage, dest_format)
                    .await
            }
        }
    }

    /// 查源存储的类型，查不到按 unknown 处理
    async fn source_storage_type(&self, storage_name: &str) -> String {
        match self.endpoints.source_api.storage().list().await {
            Ok(list) => match list.into_iter().find(|s| s.storage == storage_name) {
                Some(info) => info.kind,
                None => {
                    warn!("源集群没有名为 {} 的存储定义", storage_name);
                    "unknown".to_string()
                }
            },
            Err(err) => {
                warn!("查询源存储类型失败: {}", err);
                "unknown".to_string()
            }
        }
    }

    // =========================================================================
    // 文件类存储
    // =========================================================================

    async fn copy_file_based(
        &self,
        copy_id: &str,
        storage_type: &str,
        descriptor: &VolumeDescriptor,
        dest_storage: Option<&str>,
        dest_format: &str,
    ) -> Result<String> {
        let disk_path = descriptor.volume.as_str();
        let file_name = descriptor.file_name();

        self.tracker
            .update_detailed(
                "disk_detecting_type",
                format!("检测到 {} 存储，使用直接文件传输", storage_type),
                "直接传输磁盘文件，无需临时快照",
                75.0,
            )
            .await;

        let source_path = self
            .locate_source_file(copy_id, storage_type, &descriptor.storage, disk_path, file_name)
            .await?;

        // 源文件大小决定空间检查的需求量和下载进度的分母
        self.tracker
            .update_detailed("disk_size_check", "检查文件大小...", "确定复制所需空间", 83.0)
            .await;
        let source_size = match self.endpoints.source_ssh.file_size(&source_path).await {
            Ok(size) => {
                info!("[{}] 源文件大小: {} 字节 ({})", copy_id, size, format_size(size));
                Some(size)
            }
            Err(err) => {
                warn!("[{}] 无法获取源文件大小: {}", copy_id, err);
                None
            }
        };

        let dest = self.resolve_dest(copy_id, dest_storage, file_name).await;
        let required_gb = source_size
            .map(|bytes| bytes as f64 / 1024f64.powi(3))
            .unwrap_or(FALLBACK_SIZE_GB);
        self.check_dest_space(copy_id, &dest, required_gb).await?;
        self.tracker.update("disk_dest_prep", "准备目标目录...", 84.0).await;
        self.ensure_dest_dir(copy_id, &dest).await?;

        self.tracker
            .update("disk_download_start", "开始从源端下载文件...", 85.0)
            .await;
        let source_filename = base_name(&source_path).to_string();
        let local_path = self
            .staging_file(&format!("vm-{}-{}", self.target_vmid, source_filename))
            .await?;

        let outcome = self
            .run_file_transfer(copy_id, &source_path, source_size.unwrap_or(0), &local_path, &dest, dest_format)
            .await;
        match outcome {
            Ok(final_path) => {
                self.tracker.update("disk_cleanup", "清理临时文件...", 94.0).await;
                remove_local_with_retries(&local_path).await;
                info!("[{}] 磁盘复制完成: {}", copy_id, final_path);
                Ok(final_path)
            }
            Err(err) => {
                if let Err(rm_err) = tokio::fs::remove_file(&local_path).await {
                    debug!("[{}] 出错后清理本地暂存文件未完成: {}", copy_id, rm_err);
                }
                Err(err)
            }
        }
    }

    /// 下载、上传与重命名，三步里任何失败都原样上抛，暂存清理由调用方兜底
    async fn run_file_transfer(
        &self,
        copy_id: &str,
        source_path: &str,
        source_size: u64,
        local_path: &Path,
        dest: &DestLocation,
        dest_format: &str,
    ) -> Result<String> {
        let disk_label = base_name(source_path);

        self.tracker
            .update_detailed(
                "disk_downloading",
                format!("正在下载 {}...", disk_label),
                "从源端传输文件",
                85.0,
            )
            .await;
        self.download_with_telemetry(disk_label, source_path, local_path, source_size)
            .await?;

        let local_size = tokio::fs::metadata(local_path).await?.len();
        self.tracker
            .update(
                "disk_download_complete",
                format!("下载完成 ({})", format_size(local_size)),
                88.0,
            )
            .await;

        self.tracker.update("disk_upload_start", "开始上传到目标端...", 89.0).await;
        self.tracker
            .update_detailed("disk_uploading", "正在上传到目标服务器...", "向目标端传输文件", 90.0)
            .await;
        self.upload_with_telemetry(disk_label, local_path, &dest.path).await?;

        let final_path = self.rename_to_canonical(copy_id, &dest.path, dest_format).await;
        self.tracker.update("disk_upload_complete", "上传完成", 93.0).await;
        Ok(final_path)
    }

    /// 按候选路径表探测源文件，失败后用 find 做精确名和通配名两轮搜索
    async fn locate_source_file(
        &self,
        copy_id: &str,
        storage_type: &str,
        storage_name: &str,
        disk_path: &str,
        file_name: &str,
    ) -> Result<String> {
        self.tracker
            .update_detailed(
                "disk_locating",
                format!("在 {} 存储上定位磁盘文件...", storage_type),
                "确定磁盘文件路径",
                78.0,
            )
            .await;

        for base in search_bases(storage_type, storage_name) {
            debug!("[{}] 在基准目录 {} 下探测", copy_id, base);
            for candidate in candidate_paths(&base, self.source_vmid, disk_path, file_name) {
                if self.endpoints.source_ssh.file_exists(&candidate).await? {
                    self.tracker
                        .update_detailed("disk_found", "找到磁盘文件", format!("位于: {}", candidate), 80.0)
                        .await;
                    info!("[{}] 找到磁盘文件: {}", copy_id, candidate);
                    return Ok(candidate);
                }
            }
        }

        self.tracker
            .update_detailed("disk_searching", "使用 find 命令搜索磁盘文件...", "执行扩展搜索", 79.0)
            .await;
        let exact = self
            .endpoints
            .source_ssh
            .execute(&format!(
                "find /var/lib/vz /mnt/pve -name '{}' -type f 2>/dev/null",
                file_name
            ))
            .await?;
        if let Some(found) = first_find_match(&exact.stdout) {
            self.tracker
                .update_detailed("disk_found_fallback", "找到磁盘文件", format!("位于: {}", found), 82.0)
                .await;
            info!("[{}] find 命中: {}", copy_id, found);
            return Ok(found.to_string());
        }

        let wildcard = self
            .endpoints
            .source_ssh
            .execute(&format!(
                "find /var/lib/vz /mnt/pve -name '*{}*' -type f 2>/dev/null | head -5",
                file_name
            ))
            .await?;
        if let Some(found) = first_substring_match(&wildcard.stdout, file_name) {
            self.tracker
                .update_detailed("disk_found_fallback", "找到磁盘文件", format!("位于: {}", found), 82.0)
                .await;
            info!("[{}] 通配搜索命中: {}", copy_id, found);
            return Ok(found.to_string());
        }

        Err(TransferError::Locate(format!(
            "在 {} 存储上找不到磁盘文件 {}",
            storage_type, file_name
        )))
    }

    // =========================================================================
    // 块设备类存储
    // =========================================================================

    async fn copy_block_based(
        &self,
        copy_id: &str,
        descriptor: &VolumeDescriptor,
        dest_storage: Option<&str>,
        dest_format: &str,
    ) -> Result<String> {
        let disk_name = descriptor.file_name();

        self.tracker
            .update("disk_detecting_block", "检测到块设备存储，使用临时文件方式", 75.0)
            .await;
        self.tracker.update("disk_locating_block", "定位块设备...", 76.0).await;

        let output = self
            .endpoints
            .source_ssh
            .execute(&format!(
                "find /var/lib/vz /dev -name '*{}*' 2>/dev/null | head -5",
                disk_name
            ))
            .await?;
        let source_path = first_block_candidate(&output.stdout)
            .ok_or_else(|| TransferError::Locate(format!("找不到磁盘 {} 对应的设备", disk_name)))?
            .to_string();
        self.tracker
            .update("disk_found_block", format!("找到块设备: {}", source_path), 78.0)
            .await;

        let is_block = self.endpoints.source_ssh.block_device_exists(&source_path).await?;
        let device_type = if is_block { "BLOCK" } else { "FILE" };
        self.tracker
            .update("disk_type_detected", format!("设备类型: {}", device_type), 79.0)
            .await;
        if !is_block {
            return Err(TransferError::UnsupportedDevice(format!(
                "{} 不是块设备，该存储类型暂不支持",
                source_path
            )));
        }

        self.tracker
            .update("disk_temp_create", "从块设备创建临时文件...", 80.0)
            .await;
        let temp_filename = format!(
            "vm-{}-{}.img",
            self.target_vmid,
            sanitize_temp_component(disk_name)
        );
        let temp_file = format!("{}/{}", SOURCE_TEMP_DIR, temp_filename);
        if let Err(err) = self.endpoints.source_ssh.mkdir_p(SOURCE_TEMP_DIR).await {
            warn!("[{}] 创建源端临时目录失败，继续尝试 dd: {}", copy_id, err);
        }

        self.tracker
            .update("disk_dd_start", "执行 dd 命令创建临时文件...", 81.0)
            .await;
        let dd = dd_command(&source_path, &temp_file);
        info!("[{}] {}", copy_id, dd);
        let dd_output = self.endpoints.source_ssh.execute(&dd).await?;
        if !dd_output.is_success() {
            return Err(TransferError::Snapshot(format!(
                "dd 退出码 {:?}: {}",
                dd_output.exit_code, dd_output.stderr
            )));
        }

        let ls_output = self
            .endpoints
            .source_ssh
            .execute(&format!("ls -la {}", sh_quote(&temp_file)))
            .await?;
        self.tracker
            .update_detailed(
                "disk_temp_created",
                "临时文件创建成功",
                format!("文件信息: {}", ls_output.stdout),
                83.0,
            )
            .await;

        self.tracker
            .update("disk_transfer_start", "开始通过本地中转传输文件...", 84.0)
            .await;
        let local_path = match self.staging_file(&temp_filename).await {
            Ok(path) => path,
            Err(err) => {
                self.remove_remote_temp(copy_id, &temp_file).await;
                return Err(err);
            }
        };

        let outcome = self
            .run_block_transfer(copy_id, &temp_file, &temp_filename, &local_path, dest_storage, disk_name, dest_format)
            .await;
        match outcome {
            Ok(final_path) => {
                self.tracker
                    .update("disk_cleanup_block", "清理临时文件...", 94.0)
                    .await;
                self.remove_remote_temp(copy_id, &temp_file).await;
                remove_local_with_retries(&local_path).await;
                info!("[{}] 磁盘复制完成: {}", copy_id, final_path);
                Ok(final_path)
            }
            Err(err) => {
                self.remove_remote_temp(copy_id, &temp_file).await;
                if let Err(rm_err) = tokio::fs::remove_file(&local_path).await {
                    debug!("[{}] 出错后清理本地暂存文件未完成: {}", copy_id, rm_err);
                }
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_block_transfer(
        &self,
        copy_id: &str,
        temp_file: &str,
        temp_filename: &str,
        local_path: &Path,
        dest_storage: Option<&str>,
        disk_name: &str,
        dest_format: &str,
    ) -> Result<String> {
        self.tracker
            .update("disk_downloading_block", "下载临时文件...", 85.0)
            .await;
        let temp_size = self.endpoints.source_ssh.file_size(temp_file).await?;
        self.download_with_telemetry(temp_filename, temp_file, local_path, temp_size)
            .await?;

        let local_size = tokio::fs::metadata(local_path).await?.len();
        self.tracker
            .update(
                "disk_download_complete_block",
                format!("下载完成 ({})", format_size(local_size)),
                88.0,
            )
            .await;

        let dest = self.resolve_dest(copy_id, dest_storage, disk_name).await;
        let required_gb = local_size as f64 / 1024f64.powi(3);
        self.check_dest_space(copy_id, &dest, required_gb).await?;
        self.tracker
            .update("disk_dest_prep_block", "准备目标目录...", 89.0)
            .await;
        self.ensure_dest_dir(copy_id, &dest).await?;

        self.tracker
            .update("disk_upload_start_block", "正在上传到目标服务器...", 90.0)
            .await;
        self.upload_with_telemetry(temp_filename, local_path, &dest.path).await?;

        let final_path = self.rename_to_canonical(copy_id, &dest.path, dest_format).await;
        self.tracker
            .update("disk_upload_complete_block", "上传完成", 93.0)
            .await;
        Ok(final_path)
    }

    async fn remove_remote_temp(&self, copy_id: &str, temp_file: &str) {
        match self.endpoints.source_ssh.remove_file(temp_file).await {
            Ok(()) => info!("[{}] 已清理源端临时文件: {}", copy_id, temp_file),
            Err(err) => warn!("[{}] 清理源端临时文件失败: {}", copy_id, err),
        }
    }

    // =========================================================================
    // 目标端落位
    // =========================================================================

    /// 解析目标落点，任何一步解析不出来都回落默认路径
    async fn resolve_dest(
        &self,
        copy_id: &str,
        dest_storage: Option<&str>,
        disk_filename: &str,
    ) -> DestLocation {
        let Some(storage_name) = dest_storage else {
            warn!("[{}] 未指定目标存储，使用默认路径", copy_id);
            return default_location(self.target_vmid, disk_filename);
        };
        let info = self.dest_storage_info(storage_name).await;
        if info.is_none() {
            warn!("[{}] 查不到目标存储 {} 的信息，使用默认路径", copy_id, storage_name);
        }
        let location = resolve_location(info.as_ref(), self.target_vmid, disk_filename);
        debug!("[{}] 目标落点: {}", copy_id, location.path);
        location
    }

    async fn dest_storage_info(&self, storage_name: &str) -> Option<StorageInfo> {
        match self.endpoints.dest_api.storage().node_list(&self.dest_node).await {
            Ok(list) => list.into_iter().find(|s| s.storage == storage_name),
            Err(err) => {
                warn!("查询目标存储信息失败: {}", err);
                None
            }
        }
    }

    /// 目标端空间检查，df 解析不出来就放行
    async fn check_dest_space(&self, copy_id: &str, dest: &DestLocation, required_gb: f64) -> Result<()> {
        match self.endpoints.dest_ssh.available_space_gb(&dest.dir).await {
            Ok(Some(available_gb)) => {
                let required = (required_gb * SPACE_SAFETY_FACTOR) as u64;
                if available_gb < required {
                    return Err(TransferError::Space {
                        path: dest.dir.clone(),
                        required_gb: required,
                        available_gb,
                    });
                }
                debug!(
                    "[{}] 目标空间充足: 可用 {}GB >= 需要 {}GB",
                    copy_id, available_gb, required
                );
                Ok(())
            }
            Ok(None) => {
                debug!("[{}] 无法解析目标端 df 输出，跳过空间检查", copy_id);
                Ok(())
            }
            Err(err) => {
                warn!("[{}] 目标端空间检查失败，继续执行: {}", copy_id, err);
                Ok(())
            }
        }
    }

    async fn ensure_dest_dir(&self, copy_id: &str, dest: &DestLocation) -> Result<()> {
        self.endpoints.dest_ssh.mkdir_p(&dest.dir).await?;
        match self
            .endpoints
            .dest_ssh
            .execute_checked(&format!("ls -ld {}", sh_quote(&dest.dir)))
            .await
        {
            Ok(output) => {
                debug!("[{}] 目标目录验证: {}", copy_id, output.stdout);
                Ok(())
            }
            Err(err) => Err(TransferError::DestDir {
                path: dest.dir.clone(),
                reason: err.to_string(),
            }),
        }
    }

    /// 上传后把文件重命名成 `vm-<目标编号>-disk-<n>.<格式>`
    ///
    /// 推导不出序号或两次重命名都失败时保留上传文件名，只告警。
    async fn rename_to_canonical(&self, copy_id: &str, uploaded_path: &str, dest_format: &str) -> String {
        let Some(new_path) = rename_target(uploaded_path, self.target_vmid, dest_format) else {
            warn!(
                "[{}] 无法从 {} 解析磁盘序号，保留上传文件名",
                copy_id,
                base_name(uploaded_path)
            );
            return uploaded_path.to_string();
        };
        if new_path == uploaded_path {
            return new_path;
        }
        info!("[{}] 重命名 {} -> {}", copy_id, uploaded_path, new_path);
        for attempt in 1..=2 {
            match self.endpoints.dest_ssh.rename(uploaded_path, &new_path).await {
                Ok(()) => return new_path,
                Err(err) if attempt < 2 => {
                    warn!("[{}] 重命名失败，重试一次: {}", copy_id, err);
                }
                Err(err) => {
                    warn!("[{}] 重命名仍然失败，保留上传文件名: {}", copy_id, err);
                }
            }
        }
        uploaded_path.to_string()
    }

    // =========================================================================
    // 本地暂存与传输遥测
    // =========================================================================

    async fn staging_file(&self, file_name: &str) -> Result<PathBuf> {
        let dir = Path::new(STAGING_DIR);
        tokio::fs::create_dir_all(dir).await?;
        Ok(dir.join(file_name))
    }

    async fn download_with_telemetry(
        &self,
        disk_label: &str,
        remote_path: &str,
        local_path: &Path,
        total_size: u64,
    ) -> Result<u64> {
        self.tracker
            .update_disk_transfer(disk_label, TransferDirection::Download, 0.0, 0, total_size, 0.0)
            .await;
        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = self.spawn_forwarder(disk_label, TransferDirection::Download, rx);
        let mut reporter = ThrottledReporter::new(PROGRESS_INTERVAL);
        let result = self
            .endpoints
            .source_ssh
            .download_file(remote_path, local_path, total_size, move |transferred, total| {
                if let Some(sample) = reporter.sample(transferred, total) {
                    let _ = tx.send(sample);
                }
            })
            .await;
        let _ = forwarder.await;
        self.tracker.stop_disk_transfer().await;
        Ok(result?)
    }

    async fn upload_with_telemetry(
        &self,
        disk_label: &str,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<u64> {
        let total_size = tokio::fs::metadata(local_path).await?.len();
        self.tracker
            .update_disk_transfer(disk_label, TransferDirection::Upload, 0.0, 0, total_size, 0.0)
            .await;
        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = self.spawn_forwarder(disk_label, TransferDirection::Upload, rx);
        let mut reporter = ThrottledReporter::new(PROGRESS_INTERVAL);
        let result = self
            .endpoints
            .dest_ssh
            .upload_file(local_path, remote_path, move |transferred, total| {
                if let Some(sample) = reporter.sample(transferred, total) {
                    let _ = tx.send(sample);
                }
            })
            .await;
        let _ = forwarder.await;
        self.tracker.stop_disk_transfer().await;
        Ok(result?)
    }

    /// 把节流后的采样转发给进度跟踪器，发送端关闭后自行退出
    fn spawn_forwarder(
        &self,
        disk_label: &str,
        direction: TransferDirection,
        mut rx: mpsc::UnboundedReceiver<TransferSample>,
    ) -> tokio::task::JoinHandle<()> {
        let tracker = self.tracker.clone();
        let label = disk_label.to_string();
        tokio::spawn(async move {
            while let Some(sample) = rx.recv().await {
                tracker
                    .update_disk_transfer(
                        &label,
                        direction,
                        sample.progress,
                        sample.transferred,
                        sample.total,
                        sample.speed_mbps,
                    )
                    .await;
            }
        })
    }
}

/// 渲染块设备快照的 dd 命令
fn dd_command(source: &str, dest: &str) -> String {
    format!("dd if={} of={} bs=1M", source, dest)
}

/// 删除本地暂存文件，限次重试，始终不上抛
async fn remove_local_with_retries(path: &Path) {
    for attempt in 1..=CLEANUP_ATTEMPTS {
        sleep(CLEANUP_RETRY_DELAY).await;
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!("已清理本地暂存文件: {}", path.display());
                return;
            }
            Err(err) if attempt < CLEANUP_ATTEMPTS => {
                warn!("删除本地暂存文件重试 {}/{}: {}", attempt, CLEANUP_ATTEMPTS, err);
            }
            Err(err) => {
                warn!("暂时无法删除本地暂存文件 {}: {}", path.display(), err);
            }
        }
    }
}

// =============================================================================
// 测试
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dd_command() {
        assert_eq!(
            dd_command("/dev/pve/vm-100-disk-1", "/var/tmp/vm-104-vm-100-disk-1.img"),
            "dd if=/dev/pve/vm-100-disk-1 of=/var/tmp/vm-104-vm-100-disk-1.img bs=1M"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_local_with_retries_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vm-104-disk.img");
        tokio::fs::write(&path, b"data").await.unwrap();

        remove_local_with_retries(&path).await;
        assert!(!path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_local_with_retries_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-there.img");
        // 文件不存在时重试耗尽后安静返回
        remove_local_with_retries(&path).await;
        assert!(!path.exists());
    }
}
