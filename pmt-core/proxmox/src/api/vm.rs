//! 虚拟机接口

use tracing::info;

use crate::client::PveClient;
use crate::error::Result;
use crate::models::{config_text, is_disk_slot, VmConfig, VmEntry, VmStatus, VmSummary};

/// 虚拟机相关操作
pub struct VmApi<'a> {
    client: &'a PveClient,
}

impl<'a> VmApi<'a> {
    pub(crate) fn new(client: &'a PveClient) -> Self {
        Self { client }
    }

    /// 列出节点上的全部 QEMU 虚拟机
    pub async fn list(&self, node: &str) -> Result<Vec<VmEntry>> {
        self.client.get(&format!("/nodes/{}/qemu", node)).await
    }

    /// 虚拟机当前运行状态
    pub async fn status(&self, node: &str, vmid: u32) -> Result<VmStatus> {
        self.client
            .get(&format!("/nodes/{}/qemu/{}/status/current", node, vmid))
            .await
    }

    /// 读取虚拟机完整配置
    pub async fn config(&self, node: &str, vmid: u32) -> Result<VmConfig> {
        self.client
            .get(&format!("/nodes/{}/qemu/{}/config", node, vmid))
            .await
    }

    /// 虚拟机概要，把配置和运行状态合并成一条摘要
    pub async fn info(&self, node: &str, vmid: u32) -> Result<VmSummary> {
        let config = self.config(node, vmid).await?;
        let status = self.status(node, vmid).await?;
        let disk_slots = config
            .iter()
            .filter(|(key, value)| {
                is_disk_slot(key) && config_text(value).map_or(false, |v| v.contains(':'))
            })
            .map(|(key, _)| key.clone())
            .collect();
        Ok(VmSummary {
            vmid,
            name: config
                .get("name")
                .and_then(config_text)
                .unwrap_or_else(|| format!("VM-{}", vmid)),
            status: status.status,
            memory: config
                .get("memory")
                .and_then(config_text)
                .unwrap_or_else(|| "0".to_string()),
            cores: config
                .get("cores")
                .and_then(config_text)
                .unwrap_or_else(|| "0".to_string()),
            node: node.to_string(),
            disk_slots,
        })
    }

    /// 停止虚拟机，返回任务标识
    pub async fn stop(&self, node: &str, vmid: u32) -> Result<String> {
        info!("停止虚拟机 {} (节点 {})", vmid, node);
        self.client
            .post_form(&format!("/nodes/{}/qemu/{}/status/stop", node, vmid), &[])
            .await
    }

    /// 创建虚拟机，参数表需要包含 `vmid`，返回任务标识
    pub async fn create(&self, node: &str, params: &[(String, String)]) -> Result<String> {
        info!("在节点 {} 创建虚拟机（{} 个配置项）", node, params.len());
        self.client
            .post_form(&format!("/nodes/{}/qemu", node), params)
            .await
    }

    /// 修改虚拟机配置（同步接口）
    pub async fn set_config(&self, node: &str, vmid: u32, params: &[(String, String)]) -> Result<()> {
        info!("更新虚拟机 {} 配置: {:?}", vmid, params.iter().map(|(k, _)| k).collect::<Vec<_>>());
        self.client
            .put_form_unit(&format!("/nodes/{}/qemu/{}/config", node, vmid), params)
            .await
    }

    /// 删除虚拟机
    pub async fn delete(&self, node: &str, vmid: u32) -> Result<()> {
        info!("删除虚拟机 {} (节点 {})", vmid, node);
        self.client
            .delete_unit(&format!("/nodes/{}/qemu/{}", node, vmid))
            .await
    }
}
