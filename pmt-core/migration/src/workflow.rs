//! 迁移工作流
//!
//! 单次迁移的线性状态机，按固定顺序推进：
//! 校验 → 连接源集群 → 读取虚拟机信息 → （运行中则等确认后停机）→
//! SSH 连接 → 连接目标集群 → 读取并拆分配置 → 找可用编号 →
//! 创建目标虚拟机 → 逐块磁盘创建、挂载、搬运 → 网卡重映射 →
//! 可选删除源虚拟机 → 完成。
//!
//! 虚拟机在目标端创建成功之后的任何失败都会触发补偿清理，
//! 尽量删掉半成品虚拟机和残留磁盘卷；清理本身的失败只记日志。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use pmt_common::{ClusterEndpoint, ClusterRegistry};
use pmt_disk_transfer::{DiskTransferService, TransferEndpoints};
use pmt_progress::ProgressTracker;
use pmt_proxmox::{config_text, is_block_storage, PveClient, VolumeDescriptor};
use pmt_ssh_executor::{SshClient, SshConfig};

use crate::config::{
    attach_value, derive_disk_size, disk_number, remap_bridge, sanitize_create_params,
    split_config, SplitConfig,
};
use crate::error::{MigrationError, Result};
use crate::request::MigrationRequest;

// ============================================
// 常量
// ============================================

/// 等待用户确认停机的轮询间隔
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 等待用户确认停机的时限
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(300);

/// 等待虚拟机停止的轮询间隔
const STOP_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// 等待虚拟机停止的时限
const STOP_TIMEOUT: Duration = Duration::from_secs(300);

/// 目标编号被占用时顺延探测的次数上限
const MAX_VMID_ATTEMPTS: u32 = 100;

/// 槽位映射为空时的兜底存储名
const FALLBACK_STORAGE: &str = "local";

/// 工作流的终态
pub(crate) enum WorkflowOutcome {
    /// 正常完成，附带给调用方的摘要
    Completed { message: String },
    /// 在停机确认阶段被用户取消
    Cancelled,
}

/// 停机确认门的出口
#[derive(Debug)]
enum Gate {
    Confirmed,
    Cancelled,
}

/// 迁移计划里的一块磁盘
struct DiskPlan {
    slot: String,
    raw: String,
    descriptor: VolumeDescriptor,
    dest_storage: String,
}

/// 目标端已分配的磁盘
struct CreatedDisk {
    /// 控制平面返回的规范卷名（不含存储前缀）
    name: String,
    /// 实际创建格式，数据落位后的扩展名跟它走
    format: String,
}

/// 单次迁移工作流
pub(crate) struct MigrationWorkflow {
    request: MigrationRequest,
    registry: Arc<dyn ClusterRegistry>,
    tracker: ProgressTracker,
}

impl MigrationWorkflow {
    pub(crate) fn new(
        request: MigrationRequest,
        registry: Arc<dyn ClusterRegistry>,
        tracker: ProgressTracker,
    ) -> Self {
        Self {
            request,
            registry,
            tracker,
        }
    }

    /// 跑完整个迁移流程
    pub(crate) async fn run(self) -> Result<WorkflowOutcome> {
        let vmid = self.request.vmid;
        self.tracker
            .update_detailed("initializing", "开始迁移流程...", "迁移任务已创建", 0.0)
            .await;
        info!(
            "开始迁移: 虚拟机 {} 从 {} 迁往 {}",
            vmid, self.request.source_cluster_id, self.request.dest_cluster_id
        );

        self.tracker.update("validation", "校验请求参数...", 50.0).await;
        self.request.validate()?;

        self.tracker.update("connecting", "连接源集群...", 30.0).await;
        let source = self.endpoint(&self.request.source_cluster_id).await?;
        let dest = self.endpoint(&self.request.dest_cluster_id).await?;
        info!(
            "源集群 {} ({})，目标集群 {} ({})",
            source.id, source.api_host, dest.id, dest.api_host
        );
        let source_api = PveClient::for_endpoint(&source)?;
        source_api.validate().await?;

        self.tracker
            .update_detailed(
                "vm_info",
                format!("获取虚拟机 {} 的信息...", vmid),
                format!("从节点 {} 读取虚拟机数据", self.request.source_node),
                0.0,
            )
            .await;
        let summary = source_api.vm().info(&self.request.source_node, vmid).await?;
        info!(
            "虚拟机概要: {} (编号 {})，状态 {}，{} 个磁盘槽位",
            summary.name,
            summary.vmid,
            summary.status,
            summary.disk_slots.len()
        );

        if summary.status == "running" {
            if let Gate::Cancelled = self.confirm_stop_gate().await? {
                info!("迁移在停机确认阶段被取消");
                return Ok(WorkflowOutcome::Cancelled);
            }
            self.tracker
                .update_detailed(
                    "vm_stopping",
                    format!("停止虚拟机 {}...", vmid),
                    "虚拟机正在运行，先行停机",
                    0.0,
                )
                .await;
            source_api.vm().stop(&self.request.source_node, vmid).await?;
            self.wait_until_stopped(&source_api).await?;
        } else {
            self.tracker
                .update("vm_ready", "虚拟机已处于停止状态，可以直接迁移", 100.0)
                .await;
        }

        self.tracker.update("ssh_connection", "建立 SSH 连接...", 20.0).await;
        let ssh_host = source.api_host_without_port().to_string();
        self.tracker
            .update("ssh_connecting", format!("通过 SSH 连接 {}...", ssh_host), 30.0)
            .await;
        let source_ssh = SshClient::connect(
            SshConfig::with_password(&ssh_host, "root", &source.ssh_password)
                .port(source.ssh_port),
        )
        .await?;
        self.tracker
            .update_detailed("ssh_connected", "SSH 连接建立成功", "可以开始数据传输", 100.0)
            .await;

        self.tracker
            .update_detailed(
                "dest_connecting",
                "连接目标集群...",
                format!("连接 {}", dest.api_host),
                50.0,
            )
            .await;
        let dest_api = PveClient::for_endpoint(&dest)?;
        dest_api.validate().await?;

        self.tracker
            .update_detailed("config_reading", "读取虚拟机配置...", "获取配置与磁盘信息", 30.0)
            .await;
        let vm_config = source_api.vm().config(&self.request.source_node, vmid).await?;
        let split = split_config(&vm_config);
        let plan = self.plan_disks(&split).await;
        self.tracker.set_total_disks(plan.len() as u32).await;

        self.tracker
            .update_detailed(
                "vm_id_check",
                "检查目标集群上可用的虚拟机编号...",
                format!("待迁移磁盘 {} 块", plan.len()),
                20.0,
            )
            .await;
        let target_vmid = self.find_free_vmid(&dest_api).await?;
        if target_vmid != vmid {
            self.tracker
                .update_detailed(
                    "vm_id_changed",
                    format!("虚拟机编号从 {} 调整为 {}", vmid, target_vmid),
                    "原编号已被占用",
                    70.0,
                )
                .await;
            self.tracker.set_vmid(target_vmid).await;
        }

        let create_params = sanitize_create_params(split.params);
        self.tracker
            .update_detailed(
                "vm_creating",
                format!("在目标节点 {} 创建虚拟机 {}...", self.request.dest_node, target_vmid),
                "先创建不带磁盘的虚拟机",
                80.0,
            )
            .await;
        let mut params = vec![("vmid".to_string(), target_vmid.to_string())];
        params.extend(create_params);
        dest_api.vm().create(&self.request.dest_node, &params).await?;
        self.tracker
            .update_detailed(
                "vm_created",
                format!("虚拟机 {} 创建成功", target_vmid),
                "虚拟机已创建（暂无磁盘）",
                100.0,
            )
            .await;

        // 虚拟机已经落在目标集群上，再往后的失败都要做补偿清理
        if let Err(err) = self
            .finish_on_destination(&source_api, source_ssh, &dest, &dest_api, target_vmid, plan)
            .await
        {
            self.cleanup_partial_vm(&dest_api, target_vmid).await;
            return Err(err);
        }

        let mut message = format!("迁移完成，虚拟机的新编号是 {}", target_vmid);
        if target_vmid != vmid {
            message.push_str(&format!("（原编号 {} 已被占用）", vmid));
        }
        self.tracker
            .complete("迁移完成！", format!("虚拟机已迁移为编号 {}", target_vmid))
            .await;
        info!("✅ {}", message);
        Ok(WorkflowOutcome::Completed { message })
    }

    async fn endpoint(&self, cluster_id: &str) -> Result<ClusterEndpoint> {
        self.registry
            .get(cluster_id)
            .await
            .ok_or_else(|| MigrationError::ClusterNotFound(cluster_id.to_string()))
    }

    /// 等待外部确认停机
    ///
    /// 轮询确认标志；迁移被取消（active 被清掉）则提前退出，
    /// 超时按失败处理。
    async fn confirm_stop_gate(&self) -> Result<Gate> {
        self.tracker.request_confirmation().await;
        self.tracker
            .update_detailed(
                "vm_stopping",
                "虚拟机正在运行，等待确认停机...",
                "请确认是否停止源虚拟机",
                0.0,
            )
            .await;
        let deadline = Instant::now() + CONFIRM_TIMEOUT;
        loop {
            if self.tracker.is_stop_confirmed().await {
                info!("用户已确认停机");
                return Ok(Gate::Confirmed);
            }
            if !self.tracker.is_active().await {
                return Ok(Gate::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(MigrationError::Timeout(format!(
                    "等待停机确认超时（{} 秒）",
                    CONFIRM_TIMEOUT.as_secs()
                )));
            }
            sleep(CONFIRM_POLL_INTERVAL).await;
        }
    }

    /// 轮询直到虚拟机停止
    async fn wait_until_stopped(&self, source_api: &PveClient) -> Result<()> {
        let vmid = self.request.vmid;
        let node = &self.request.source_node;
        let started = Instant::now();
        loop {
            let status = source_api.vm().status(node, vmid).await?;
            if status.is_stopped() {
                self.tracker
                    .update_detailed("vm_stopped", "虚拟机已停止", "可以开始迁移数据", 100.0)
                    .await;
                info!("虚拟机 {} 已停止", vmid);
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed >= STOP_TIMEOUT {
                return Err(MigrationError::Timeout(format!(
                    "等待虚拟机 {} 停止超时（{} 秒）",
                    vmid,
                    STOP_TIMEOUT.as_secs()
                )));
            }
            let stage_progress =
                (elapsed.as_secs_f64() / STOP_TIMEOUT.as_secs_f64() * 100.0).min(90.0);
            self.tracker
                .update(
                    "vm_stopping",
                    format!("等待虚拟机停止... ({} 秒)", elapsed.as_secs()),
                    stage_progress,
                )
                .await;
            sleep(STOP_POLL_INTERVAL).await;
        }
    }

    /// 从拆分结果里筛出要迁移的磁盘
    ///
    /// 只迁移存储映射里列出的槽位；光驱和未映射的槽位跳过并记录，
    /// 映射里指向不存在槽位的键只提醒。
    async fn plan_disks(&self, split: &SplitConfig) -> Vec<DiskPlan> {
        let mut plan = Vec::new();
        for (slot, raw) in &split.disks {
            let Some(descriptor) = VolumeDescriptor::parse(raw) else {
                warn!("磁盘槽位 {} 的值无法解析，跳过: {}", slot, raw);
                continue;
            };
            if descriptor.is_cdrom() {
                self.tracker
                    .update_detailed(
                        "disk_skipped",
                        format!("跳过光驱槽位 {}", slot),
                        "光驱不参与迁移",
                        10.0,
                    )
                    .await;
                continue;
            }
            let Some(dest_storage) = self.dest_storage_for(slot) else {
                self.tracker
                    .update_detailed(
                        "disk_skipped",
                        format!("跳过未映射的磁盘槽位 {}", slot),
                        format!("存储映射里没有 {}", slot),
                        10.0,
                    )
                    .await;
                continue;
            };
            plan.push(DiskPlan {
                slot: slot.clone(),
                raw: raw.clone(),
                descriptor,
                dest_storage,
            });
        }
        for slot in self.request.storage_mappings.keys() {
            if !split.disks.iter().any(|(key, _)| key == slot) {
                warn!("存储映射中的槽位 {} 在源配置里不存在", slot);
            }
        }
        plan
    }

    /// 槽位的目标存储：映射值优先，空值退回请求级兜底
    fn dest_storage_for(&self, slot: &str) -> Option<String> {
        let mapped = self.request.storage_mappings.get(slot)?;
        if !mapped.is_empty() {
            return Some(mapped.clone());
        }
        let fallback = self
            .request
            .dest_storage
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| FALLBACK_STORAGE.to_string());
        warn!("槽位 {} 的映射为空，使用兜底存储 {}", slot, fallback);
        Some(fallback)
    }

    /// 在目标集群上找一个可用的虚拟机编号
    ///
    /// 集群资源列表一次拿到全部占用编号；接口不可用时退回逐个探测。
    async fn find_free_vmid(&self, dest_api: &PveClient) -> Result<u32> {
        let requested = self.request.vmid;
        match dest_api.cluster().vm_ids().await {
            Ok(ids) => {
                let taken: HashSet<u32> = ids.into_iter().collect();
                match next_free_vmid(&taken, requested, MAX_VMID_ATTEMPTS) {
                    Some(vmid) => {
                        for (attempt, candidate) in (requested..vmid).enumerate() {
                            self.publish_vmid_taken(candidate, attempt as u32).await;
                        }
                        self.publish_vmid_available(vmid).await;
                        Ok(vmid)
                    }
                    None => Err(MigrationError::ResourceExhausted(format!(
                        "尝试 {} 次后没有找到可用的虚拟机编号",
                        MAX_VMID_ATTEMPTS
                    ))),
                }
            }
            Err(err) => {
                warn!("查询集群资源列表失败，改为逐个探测编号: {}", err);
                self.probe_free_vmid(dest_api).await
            }
        }
    }

    /// 逐个编号查配置来探测占用情况
    async fn probe_free_vmid(&self, dest_api: &PveClient) -> Result<u32> {
        let node = &self.request.dest_node;
        let mut candidate = self.request.vmid;
        for attempt in 0..MAX_VMID_ATTEMPTS {
            match dest_api.vm().config(node, candidate).await {
                Ok(_) => {
                    self.publish_vmid_taken(candidate, attempt).await;
                    candidate += 1;
                }
                Err(err) => {
                    // 探测接口对不存在的编号直接报错，视为可用
                    debug!("编号 {} 探测返回错误，视为可用: {}", candidate, err);
                    self.publish_vmid_available(candidate).await;
                    return Ok(candidate);
                }
            }
        }
        Err(MigrationError::ResourceExhausted(format!(
            "尝试 {} 次后没有找到可用的虚拟机编号",
            MAX_VMID_ATTEMPTS
        )))
    }

    async fn publish_vmid_taken(&self, candidate: u32, attempt: u32) {
        let progress = 20.0 + (attempt as f64 / MAX_VMID_ATTEMPTS as f64) * 30.0;
        self.tracker
            .update(
                "vm_id_check",
                format!("虚拟机编号 {} 已被占用，检查下一个...", candidate),
                progress,
            )
            .await;
    }

    async fn publish_vmid_available(&self, vmid: u32) {
        self.tracker
            .update_detailed(
                "vm_id_available",
                format!("虚拟机编号 {} 可用", vmid),
                format!("迁移将使用编号 {}", vmid),
                60.0,
            )
            .await;
    }

    /// 目标虚拟机建好之后的全部收尾：磁盘、网卡、可选的源删除
    async fn finish_on_destination(
        &self,
        source_api: &PveClient,
        source_ssh: SshClient,
        dest: &ClusterEndpoint,
        dest_api: &PveClient,
        target_vmid: u32,
        plan: Vec<DiskPlan>,
    ) -> Result<()> {
        if plan.is_empty() {
            info!("没有需要迁移的磁盘，跳过数据复制");
        } else {
            // 目标端 SSH 只连一次，所有磁盘复用
            let dest_host = dest.api_host_without_port().to_string();
            let dest_ssh = SshClient::connect(
                SshConfig::with_password(&dest_host, "root", &dest.ssh_password)
                    .port(dest.ssh_port),
            )
            .await?;
            let transfer = DiskTransferService::new(
                TransferEndpoints {
                    source_api: source_api.clone(),
                    dest_api: dest_api.clone(),
                    source_ssh,
                    dest_ssh,
                },
                self.tracker.clone(),
                self.request.vmid,
                target_vmid,
                self.request.dest_node.as_str(),
            );

            let total = plan.len();
            for (index, disk) in plan.iter().enumerate() {
                let current = (index + 1) as u32;
                self.tracker.set_current_disk(current).await;
                self.tracker
                    .update_detailed(
                        "disk_processing",
                        format!("处理磁盘 {}/{}: {}...", current, total, disk.slot),
                        format!("磁盘配置: {}", disk.raw),
                        5.0,
                    )
                    .await;
                self.migrate_disk(dest_api, &transfer, target_vmid, disk).await?;
            }
        }

        self.apply_network_mappings(dest_api, target_vmid).await?;

        if self.request.delete_source {
            self.tracker
                .update_detailed(
                    "cleanup",
                    format!("删除源虚拟机 {}...", self.request.vmid),
                    "清理源集群...",
                    50.0,
                )
                .await;
            source_api
                .vm()
                .delete(&self.request.source_node, self.request.vmid)
                .await?;
            self.tracker.update("cleanup_done", "源虚拟机已删除", 100.0).await;
        }
        Ok(())
    }

    /// 单块磁盘的创建、挂载与数据搬运
    async fn migrate_disk(
        &self,
        dest_api: &PveClient,
        transfer: &DiskTransferService,
        target_vmid: u32,
        disk: &DiskPlan,
    ) -> Result<()> {
        let size = derive_disk_size(&disk.slot, &disk.descriptor);
        self.tracker
            .update_detailed(
                "disk_creating",
                format!("在存储 {} 上创建磁盘 {} ({})...", disk.dest_storage, disk.slot, size),
                "分配磁盘空间...",
                20.0,
            )
            .await;
        let created = self.create_dest_disk(dest_api, target_vmid, disk, &size).await?;
        self.tracker
            .update_detailed(
                "disk_created",
                format!("磁盘 {} 创建成功", disk.slot),
                format!("已分配磁盘: {}", created.name),
                40.0,
            )
            .await;

        let value = attach_value(&disk.dest_storage, &created.name, &disk.descriptor, &disk.slot);
        self.tracker
            .update_detailed(
                "disk_attaching",
                format!("把磁盘 {} 挂载到虚拟机...", disk.slot),
                format!("磁盘配置: {}", value),
                50.0,
            )
            .await;
        dest_api
            .vm()
            .set_config(&self.request.dest_node, target_vmid, &[(disk.slot.clone(), value)])
            .await?;
        self.tracker
            .update("disk_attached", format!("磁盘 {} 已挂载", disk.slot), 60.0)
            .await;

        self.tracker
            .update_detailed(
                "disk_copying",
                format!("复制磁盘 {} 的数据...", disk.slot),
                "向目标存储传输数据",
                70.0,
            )
            .await;
        let dest_path = transfer
            .copy_disk(&disk.descriptor, Some(disk.dest_storage.as_str()), &created.format)
            .await?;
        self.tracker
            .update_detailed(
                "disk_copied",
                format!("磁盘 {} 数据复制完成", disk.slot),
                format!("数据已写入: {}", dest_path),
                95.0,
            )
            .await;
        Ok(())
    }

    /// 在目标存储上分配磁盘，返回规范卷名与实际格式
    ///
    /// 块设备类存储的卷名不带扩展名且固定 raw 格式，文件类存储
    /// 沿用源盘格式（默认 qcow2）。
    async fn create_dest_disk(
        &self,
        dest_api: &PveClient,
        target_vmid: u32,
        disk: &DiskPlan,
        size: &str,
    ) -> Result<CreatedDisk> {
        let node = &self.request.dest_node;
        let storage = &disk.dest_storage;

        let storage_type = match dest_api.storage().list().await {
            Ok(list) => match list.into_iter().find(|s| s.storage == *storage) {
                Some(info) => info.kind,
                None => {
                    warn!("目标集群没有名为 {} 的存储定义，按 dir 处理", storage);
                    "dir".to_string()
                }
            },
            Err(err) => {
                warn!("查询目标存储类型失败，按 dir 处理: {}", err);
                "dir".to_string()
            }
        };

        let number = disk_number(&disk.slot, disk.descriptor.file_name());
        let (filename, format) = if is_block_storage(&storage_type) {
            (format!("vm-{}-disk-{}", target_vmid, number), "raw".to_string())
        } else {
            let fmt = disk.descriptor.format().unwrap_or("qcow2").to_string();
            (format!("vm-{}-disk-{}.{}", target_vmid, number, fmt), fmt)
        };
        debug!("目标磁盘命名: {} (存储类型 {})", filename, storage_type);

        self.remove_colliding_volume(dest_api, storage, &filename).await;

        dest_api
            .storage()
            .alloc(node, storage, target_vmid, &filename, size, Some(format.as_str()))
            .await?;

        // 重新列一遍存储内容确认磁盘在位，并采用控制平面的规范卷名
        let name = match dest_api.storage().content(node, storage).await {
            Ok(contents) => match contents.iter().find(|c| c.volid.ends_with(&filename)) {
                Some(content) => match content.volid.split_once(':') {
                    Some((_, volume)) => volume.to_string(),
                    None => filename.clone(),
                },
                None => {
                    warn!("存储 {} 的内容列表里没有找到新建的磁盘 {}", storage, filename);
                    filename.clone()
                }
            },
            Err(err) => {
                warn!("无法校验磁盘创建结果: {}", err);
                filename.clone()
            }
        };
        Ok(CreatedDisk { name, format })
    }

    /// 同名卷残留时先删掉，避免分配接口报冲突
    async fn remove_colliding_volume(&self, dest_api: &PveClient, storage: &str, filename: &str) {
        let node = &self.request.dest_node;
        let contents = match dest_api.storage().content(node, storage).await {
            Ok(contents) => contents,
            Err(err) => {
                debug!("无法检查存储 {} 上的同名卷: {}", storage, err);
                return;
            }
        };
        for content in contents {
            if content.volid.ends_with(filename) {
                warn!("存储 {} 上已存在同名卷 {}，先删除", storage, content.volid);
                if let Err(err) = dest_api
                    .storage()
                    .delete_volume(node, storage, &content.volid)
                    .await
                {
                    warn!("删除残留卷 {} 失败: {}", content.volid, err);
                }
            }
        }
    }

    /// 把网卡映射应用到目标虚拟机，全部改动合成一次配置修改
    async fn apply_network_mappings(&self, dest_api: &PveClient, target_vmid: u32) -> Result<()> {
        let Some(mappings) = &self.request.network_mappings else {
            return Ok(());
        };
        if mappings.is_empty() {
            return Ok(());
        }
        self.tracker
            .update_detailed("network_mapping", "应用网卡映射...", "更新网络配置", 30.0)
            .await;
        let current = dest_api
            .vm()
            .config(&self.request.dest_node, target_vmid)
            .await?;
        let mut updates = Vec::new();
        for (interface, bridge) in mappings {
            if let Some(value) = current.get(interface).and_then(config_text) {
                let updated = remap_bridge(&value, bridge);
                info!("网卡 {} 重新映射: {} -> {}", interface, value, updated);
                updates.push((interface.clone(), updated));
            }
        }
        if !updates.is_empty() {
            dest_api
                .vm()
                .set_config(&self.request.dest_node, target_vmid, &updates)
                .await?;
            self.tracker
                .update_detailed(
                    "network_applied",
                    "网卡映射应用成功",
                    format!("更新了 {} 个网卡", updates.len()),
                    80.0,
                )
                .await;
        }
        Ok(())
    }

    /// 创建虚拟机之后的任何失败都走这里，尽量抹掉目标端残留
    ///
    /// 先试整机删除（会一并释放已挂载的磁盘）；删不掉再逐个存储池
    /// 搜残留卷删除。清理失败只记日志，不覆盖原始错误。
    async fn cleanup_partial_vm(&self, dest_api: &PveClient, target_vmid: u32) {
        warn!("迁移失败，开始清理目标端残留（虚拟机 {}）", target_vmid);
        match dest_api.vm().delete(&self.request.dest_node, target_vmid).await {
            Ok(()) => {
                info!("已删除部分创建的虚拟机 {}", target_vmid);
                return;
            }
            Err(err) => {
                warn!("删除虚拟机 {} 失败，改为逐卷清理: {}", target_vmid, err);
            }
        }
        let marker = format!("vm-{}-disk-", target_vmid);
        let mut pools: Vec<&String> = self.request.storage_mappings.values().collect();
        if let Some(fallback) = &self.request.dest_storage {
            pools.push(fallback);
        }
        pools.sort();
        pools.dedup();
        for storage in pools {
            let contents = match dest_api.storage().content(&self.request.dest_node, storage).await
            {
                Ok(contents) => contents,
                Err(err) => {
                    warn!("无法列出存储 {} 的内容: {}", storage, err);
                    continue;
                }
            };
            for content in contents {
                if content.volid.contains(&marker) {
                    match dest_api
                        .storage()
                        .delete_volume(&self.request.dest_node, storage, &content.volid)
                        .await
                    {
                        Ok(()) => info!("已删除残留卷 {}", content.volid),
                        Err(err) => warn!("删除残留卷 {} 失败: {}", content.volid, err),
                    }
                }
            }
        }
    }
}

/// 从请求的编号起顺延，找第一个不在占用集合里的编号
fn next_free_vmid(taken: &HashSet<u32>, start: u32, max_attempts: u32) -> Option<u32> {
    (0..max_attempts)
        .map(|offset| start + offset)
        .find(|candidate| !taken.contains(candidate))
}

// =============================================================================
// 测试
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use pmt_common::StaticRegistry;

    fn request() -> MigrationRequest {
        MigrationRequest {
            source_cluster_id: "cluster-a".to_string(),
            dest_cluster_id: "cluster-b".to_string(),
            vmid: 100,
            source_node: "pve1".to_string(),
            dest_node: "pve2".to_string(),
            storage_mappings: HashMap::from([("scsi0".to_string(), "local".to_string())]),
            network_mappings: None,
            dest_storage: None,
            delete_source: false,
        }
    }

    fn workflow() -> MigrationWorkflow {
        MigrationWorkflow::new(
            request(),
            StaticRegistry::new().into_shared(),
            ProgressTracker::new(),
        )
    }

    #[test]
    fn test_next_free_vmid() {
        let taken: HashSet<u32> = [100, 101, 102, 103, 104].into_iter().collect();
        assert_eq!(next_free_vmid(&taken, 100, 100), Some(105));
        assert_eq!(next_free_vmid(&HashSet::new(), 100, 100), Some(100));
        // 连续占满整个探测窗口
        let wall: HashSet<u32> = (200..300).collect();
        assert_eq!(next_free_vmid(&wall, 200, 100), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_gate_passes_after_confirmation() {
        let wf = workflow();
        wf.tracker.try_begin(100).await;
        wf.tracker.confirm_stop().await;
        assert!(matches!(wf.confirm_stop_gate().await.unwrap(), Gate::Confirmed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_gate_returns_on_cancel() {
        let wf = workflow();
        wf.tracker.try_begin(100).await;
        wf.tracker.cancel().await;
        assert!(matches!(wf.confirm_stop_gate().await.unwrap(), Gate::Cancelled));
        // 等待确认的标志已经被打开过
        assert!(!wf.tracker.snapshot().await.active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_gate_times_out() {
        let wf = workflow();
        wf.tracker.try_begin(100).await;
        let err = wf.confirm_stop_gate().await.unwrap_err();
        assert!(matches!(err, MigrationError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_plan_disks_selection() {
        let mut req = request();
        req.storage_mappings = HashMap::from([
            ("scsi0".to_string(), "local".to_string()),
            ("virtio5".to_string(), "local".to_string()),
        ]);
        let wf = MigrationWorkflow::new(
            req,
            StaticRegistry::new().into_shared(),
            ProgressTracker::new(),
        );
        let split = SplitConfig {
            disks: vec![
                ("ide2".to_string(), "local:iso/debian.iso,media=cdrom".to_string()),
                ("scsi0".to_string(), "local:100/vm-100-disk-0.qcow2,size=32G".to_string()),
                ("scsi1".to_string(), "local:100/vm-100-disk-1.qcow2,size=8G".to_string()),
            ],
            params: Vec::new(),
        };
        let plan = wf.plan_disks(&split).await;
        // 光驱和未映射的 scsi1 被跳过，映射里的 virtio5 在配置里不存在
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].slot, "scsi0");
        assert_eq!(plan[0].dest_storage, "local");
    }

    #[tokio::test]
    async fn test_dest_storage_fallback_chain() {
        let mut req = request();
        req.storage_mappings = HashMap::from([
            ("scsi0".to_string(), "pool-a".to_string()),
            ("scsi1".to_string(), String::new()),
        ]);
        req.dest_storage = Some("pool-b".to_string());
        let wf = MigrationWorkflow::new(
            req,
            StaticRegistry::new().into_shared(),
            ProgressTracker::new(),
        );
        assert_eq!(wf.dest_storage_for("scsi0"), Some("pool-a".to_string()));
        assert_eq!(wf.dest_storage_for("scsi1"), Some("pool-b".to_string()));
        assert_eq!(wf.dest_storage_for("scsi9"), None);

        let mut req = request();
        req.storage_mappings = HashMap::from([("scsi1".to_string(), String::new())]);
        let wf = MigrationWorkflow::new(
            req,
            StaticRegistry::new().into_shared(),
            ProgressTracker::new(),
        );
        assert_eq!(wf.dest_storage_for("scsi1"), Some("local".to_string()));
    }
}
