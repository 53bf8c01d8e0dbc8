//! 节点接口

use crate::client::PveClient;
use crate::error::Result;
use crate::models::NodeInfo;

/// 节点相关操作
pub struct NodeApi<'a> {
    client: &'a PveClient,
}

impl<'a> NodeApi<'a> {
    pub(crate) fn new(client: &'a PveClient) -> Self {
        Self { client }
    }

    /// 列出集群全部节点
    pub async fn list(&self) -> Result<Vec<NodeInfo>> {
        self.client.get("/nodes").await
    }
}
