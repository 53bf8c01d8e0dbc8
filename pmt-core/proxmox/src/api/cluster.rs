//! 集群级接口

use crate::client::PveClient;
use crate::error::Result;
use crate::models::ClusterResource;

/// 集群级操作
pub struct ClusterApi<'a> {
    client: &'a PveClient,
}

impl<'a> ClusterApi<'a> {
    pub(crate) fn new(client: &'a PveClient) -> Self {
        Self { client }
    }

    /// 集群资源列表，可按类型过滤（`vm` / `storage` / `node`）
    pub async fn resources(&self, kind: Option<&str>) -> Result<Vec<ClusterResource>> {
        match kind {
            Some(k) => {
                self.client
                    .get_query("/cluster/resources", &[("type", k)])
                    .await
            }
            None => self.client.get("/cluster/resources").await,
        }
    }

    /// 集群内全部已占用的虚拟机编号（QEMU 与容器）
    pub async fn vm_ids(&self) -> Result<Vec<u32>> {
        let resources = self.resources(Some("vm")).await?;
        Ok(resources.into_iter().filter_map(|r| r.vmid).collect())
    }
}
