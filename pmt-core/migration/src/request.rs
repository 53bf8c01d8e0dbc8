//! 迁移请求定义与校验

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};

/// 一次迁移的完整输入
///
/// 由外部接口原样反序列化得到，进入工作流前必须先过
/// [`validate`](Self::validate)。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRequest {
    /// 源集群标识
    pub source_cluster_id: String,

    /// 目标集群标识
    pub dest_cluster_id: String,

    /// 待迁移的虚拟机编号
    pub vmid: u32,

    /// 虚拟机所在的源节点
    pub source_node: String,

    /// 目标节点
    pub dest_node: String,

    /// 磁盘槽位到目标存储的映射，只有列在这里的槽位会被迁移
    pub storage_mappings: HashMap<String, String>,

    /// 网卡槽位到目标网桥的映射，缺省不做网络改写
    #[serde(default)]
    pub network_mappings: Option<HashMap<String, String>>,

    /// 槽位没有映射时的兜底目标存储
    #[serde(default)]
    pub dest_storage: Option<String>,

    /// 迁移完成后删除源虚拟机
    #[serde(default)]
    pub delete_source: bool,
}

impl MigrationRequest {
    /// 校验必填字段，报错信息指出缺的是哪个字段
    pub fn validate(&self) -> Result<()> {
        let text_fields = [
            ("source_cluster_id", &self.source_cluster_id),
            ("dest_cluster_id", &self.dest_cluster_id),
            ("source_node", &self.source_node),
            ("dest_node", &self.dest_node),
        ];
        for (name, value) in text_fields {
            if value.trim().is_empty() {
                return Err(MigrationError::Validation(format!("缺少必填字段: {}", name)));
            }
        }
        if self.vmid == 0 {
            return Err(MigrationError::Validation("缺少必填字段: vmid".to_string()));
        }
        if self.storage_mappings.is_empty() {
            return Err(MigrationError::Validation(
                "storage_mappings 不能为空".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// 测试
// =============================================================================
