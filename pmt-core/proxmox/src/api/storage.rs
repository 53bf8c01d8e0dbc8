//! 存储接口

use tracing::info;

use crate::client::PveClient;
use crate::error::Result;
use crate::models::{StorageContent, StorageInfo};

/// 存储相关操作
pub struct StorageApi<'a> {
    client: &'a PveClient,
}

impl<'a> StorageApi<'a> {
    pub(crate) fn new(client: &'a PveClient) -> Self {
        Self { client }
    }

    /// 集群级存储定义列表
    pub async fn list(&self) -> Result<Vec<StorageInfo>> {
        self.client.get("/storage").await
    }

    /// 节点视角的存储列表（含挂载状态）
    pub async fn node_list(&self, node: &str) -> Result<Vec<StorageInfo>> {
        self.client.get(&format!("/nodes/{}/storage", node)).await
    }

    /// 存储上的内容对象列表
    pub async fn content(&self, node: &str, storage: &str) -> Result<Vec<StorageContent>> {
        self.client
            .get(&format!("/nodes/{}/storage/{}/content", node, storage))
            .await
    }

    /// 在存储上分配一块磁盘，返回卷标识
    ///
    /// 块设备类存储的 `filename` 不带扩展名，文件类存储带扩展名并指明格式。
    pub async fn alloc(
        &self,
        node: &str,
        storage: &str,
        vmid: u32,
        filename: &str,
        size: &str,
        format: Option<&str>,
    ) -> Result<String> {
        info!("在存储 {} 上分配磁盘 {} (大小 {})", storage, filename, size);
        let mut params = vec![
            ("vmid".to_string(), vmid.to_string()),
            ("filename".to_string(), filename.to_string()),
            ("size".to_string(), size.to_string()),
        ];
        if let Some(fmt) = format {
            params.push(("format".to_string(), fmt.to_string()));
        }
        self.client
            .post_form(&format!("/nodes/{}/storage/{}/content", node, storage), &params)
            .await
    }

    /// 删除存储上的一个卷
    pub async fn delete_volume(&self, node: &str, storage: &str, volid: &str) -> Result<()> {
        info!("删除卷 {} (存储 {})", volid, storage);
        self.client
            .delete_unit(&format!("/nodes/{}/storage/{}/content/{}", node, storage, volid))
            .await
    }
}
