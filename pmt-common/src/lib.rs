//! PMT 通用类型定义
//!
//! 此 crate 包含迁移引擎与应用层之间共享的类型：
//! - 集群端点描述（API 地址、令牌、SSH 凭据）
//! - 集群注册表接口（由外部应用提供实现）

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 默认 API 端口（Proxmox VE 标准端口）
pub const DEFAULT_API_PORT: u16 = 8006;

/// 集群连接端点
///
/// 描述一个受管集群的全部接入信息：控制平面 API 地址与令牌，
/// 以及访问同一批物理主机的 SSH 凭据。由外部注册表提供，
/// 迁移核心只读不写。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterEndpoint {
    /// 集群标识（注册表内唯一）
    pub id: String,

    /// 集群显示名称
    #[serde(default)]
    pub name: String,

    /// API 地址，格式 `IP` 或 `IP:PORT`（不带协议前缀）
    pub api_host: String,

    /// API 令牌标识，格式 `user@realm!token_name`
    pub api_token_id: String,

    /// API 令牌密钥
    pub api_token_secret: String,

    /// SSH 密码（root 用户）
    pub ssh_password: String,

    /// SSH 端口
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
}

fn default_ssh_port() -> u16 {
    22
}

impl ClusterEndpoint {
    /// 创建端点并规范化 API 地址
    pub fn new(
        id: impl Into<String>,
        api_host: impl Into<String>,
        api_token_id: impl Into<String>,
        api_token_secret: impl Into<String>,
        ssh_password: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            api_host: normalize_api_host(&api_host.into()),
            api_token_id: api_token_id.into(),
            api_token_secret: api_token_secret.into(),
            ssh_password: ssh_password.into(),
            ssh_port: default_ssh_port(),
        }
    }

    /// 设置显示名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 设置 SSH 端口
    pub fn with_ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    /// 从令牌标识提取认证主体（`user@realm` 部分）
    ///
    /// 令牌标识格式为 `user@realm!token_name`；缺少分隔符时
    /// 回退到 `root@pam`。
    pub fn api_user(&self) -> &str {
        if self.api_token_id.contains('@') && self.api_token_id.contains('!') {
            self.api_token_id
                .split('!')
                .next()
                .unwrap_or("root@pam")
        } else {
            "root@pam"
        }
    }

    /// 从令牌标识提取令牌名称（`!` 之后的部分）
    pub fn api_token_name(&self) -> &str {
        match self.api_token_id.rsplit_once('!') {
            Some((_, name)) => name,
            None => &self.api_token_id,
        }
    }

    /// API 主机名（去掉端口部分）
    pub fn api_host_without_port(&self) -> &str {
        match self.api_host.split_once(':') {
            Some((host, _)) => host,
            None => &self.api_host,
        }
    }

    /// API 端口，未指定或无法解析时使用默认端口 8006
    pub fn api_port(&self) -> u16 {
        self.api_host
            .split_once(':')
            .and_then(|(_, port)| port.parse().ok())
            .unwrap_or(DEFAULT_API_PORT)
    }
}

/// 规范化 API 地址：去除协议前缀、首尾空白与结尾斜杠
pub fn normalize_api_host(api_host: &str) -> String {
    let mut host = api_host.trim();

    if let Some(stripped) = host.strip_prefix("https://") {
        host = stripped;
    } else if let Some(stripped) = host.strip_prefix("http://") {
        host = stripped;
    }

    host.trim_end_matches('/').to_string()
}

/// 集群注册表接口
///
/// 由外部应用实现（CLI 的 TOML 配置、数据库等），
/// 迁移核心通过标识查询端点。
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    /// 按标识查询集群端点，不存在时返回 None
    async fn get(&self, cluster_id: &str) -> Option<ClusterEndpoint>;

    /// 列出全部已注册端点
    async fn list(&self) -> Vec<ClusterEndpoint>;
}

/// 内存注册表（测试与静态配置场景）
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    clusters: HashMap<String, ClusterEndpoint>,
}

impl StaticRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 从端点列表构建注册表
    pub fn from_endpoints(endpoints: Vec<ClusterEndpoint>) -> Self {
        let clusters = endpoints
            .into_iter()
            .map(|e| (e.id.clone(), e))
            .collect();
        Self { clusters }
    }

    /// 添加端点（同标识覆盖）
    pub fn insert(&mut self, endpoint: ClusterEndpoint) {
        self.clusters.insert(endpoint.id.clone(), endpoint);
    }

    /// 转为可共享的 trait 对象
    pub fn into_shared(self) -> Arc<dyn ClusterRegistry> {
        Arc::new(self)
    }
}

#[async_trait]
impl ClusterRegistry for StaticRegistry {
    async fn get(&self, cluster_id: &str) -> Option<ClusterEndpoint> {
        self.clusters.get(cluster_id).cloned()
    }

    async fn list(&self) -> Vec<ClusterEndpoint> {
        self.clusters.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(host: &str, token_id: &str) -> ClusterEndpoint {
        ClusterEndpoint::new("c1", host, token_id, "secret", "sshpw")
    }

    #[test]
    fn test_normalize_api_host() {
        assert_eq!(normalize_api_host("192.168.1.10:8006"), "192.168.1.10:8006");
        assert_eq!(normalize_api_host("https://192.168.1.10:8006/"), "192.168.1.10:8006");
        assert_eq!(normalize_api_host("http://pve.local"), "pve.local");
        assert_eq!(normalize_api_host("  10.0.0.1  "), "10.0.0.1");
    }

    #[test]
    fn test_token_id_parsing() {
        let ep = endpoint("10.0.0.1", "root@pam!migrator");
        assert_eq!(ep.api_user(), "root@pam");
        assert_eq!(ep.api_token_name(), "migrator");

        // 缺少分隔符时的回退
        let ep = endpoint("10.0.0.1", "plaintoken");
        assert_eq!(ep.api_user(), "root@pam");
        assert_eq!(ep.api_token_name(), "plaintoken");
    }

    #[test]
    fn test_host_and_port() {
        let ep = endpoint("10.0.0.1:8006", "root@pam!t");
        assert_eq!(ep.api_host_without_port(), "10.0.0.1");
        assert_eq!(ep.api_port(), 8006);

        let ep = endpoint("10.0.0.2", "root@pam!t");
        assert_eq!(ep.api_host_without_port(), "10.0.0.2");
        assert_eq!(ep.api_port(), DEFAULT_API_PORT);

        // 端口无法解析时回退默认值
        let ep = endpoint("10.0.0.3:abc", "root@pam!t");
        assert_eq!(ep.api_port(), DEFAULT_API_PORT);
    }

    #[tokio::test]
    async fn test_static_registry() {
        let mut registry = StaticRegistry::new();
        registry.insert(endpoint("10.0.0.1:8006", "root@pam!t"));

        assert!(registry.get("c1").await.is_some());
        assert!(registry.get("missing").await.is_none());
        assert_eq!(registry.list().await.len(), 1);
    }
}
