//! CLI 配置管理
//!
//! **数据存储方式**: TOML 文件 (~/.config/pmt/config.toml)
//! 两个集群之间迁移是主流场景，登记数量很少，TOML 文件足够。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use pmt_common::{ClusterEndpoint, StaticRegistry};

/// CLI 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// 已登记的集群，键为集群标识
    #[serde(default)]
    pub clusters: HashMap<String, ClusterConfig>,
}

/// 单个集群的接入配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// 显示名称
    #[serde(default)]
    pub name: String,

    /// API 地址（IP 或 IP:端口）
    pub api_host: String,

    /// API 令牌标识，格式 `user@realm!token_name`
    pub api_token_id: String,

    /// API 令牌密钥
    pub api_token_secret: String,

    /// 主机 root 用户的 SSH 密码
    pub ssh_password: String,

    /// SSH 端口
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
}

fn default_ssh_port() -> u16 {
    22
}

impl CliConfig {
    /// 获取配置文件路径
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("无法获取用户主目录")?;
        Ok(home.join(".config").join("pmt").join("config.toml"))
    }

    /// 加载配置
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;

        toml::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {:?}", path))
    }

    /// 保存配置
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        // 确保目录存在
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("创建配置目录失败: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("序列化配置失败")?;

        fs::write(&path, content)
            .with_context(|| format!("写入配置文件失败: {:?}", path))?;

        Ok(())
    }

    /// 登记集群
    pub fn add_cluster(&mut self, id: &str, cluster: ClusterConfig) -> Result<()> {
        if self.clusters.contains_key(id) {
            anyhow::bail!("集群 {} 已登记", id);
        }

        self.clusters.insert(id.to_string(), cluster);
        Ok(())
    }

    /// 移除集群
    pub fn remove_cluster(&mut self, id: &str) -> Result<()> {
        if self.clusters.remove(id).is_none() {
            anyhow::bail!("集群 {} 不存在", id);
        }

        Ok(())
    }

    /// 转成迁移核心使用的端点注册表
    pub fn to_registry(&self) -> StaticRegistry {
        let endpoints = self
            .clusters
            .iter()
            .map(|(id, c)| {
                ClusterEndpoint::new(
                    id,
                    &c.api_host,
                    &c.api_token_id,
                    &c.api_token_secret,
                    &c.ssh_password,
                )
                .with_name(&c.name)
                .with_ssh_port(c.ssh_port)
            })
            .collect();
        StaticRegistry::from_endpoints(endpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(host: &str) -> ClusterConfig {
        ClusterConfig {
            name: String::new(),
            api_host: host.to_string(),
            api_token_id: "root@pam!pmt".to_string(),
            api_token_secret: "secret".to_string(),
            ssh_password: "password".to_string(),
            ssh_port: 22,
        }
    }

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert_eq!(config.clusters.len(), 0);
    }

    #[test]
    fn test_add_remove_cluster() {
        let mut config = CliConfig::default();

        config.add_cluster("a", cluster("192.168.1.10")).unwrap();
        config.add_cluster("b", cluster("192.168.2.10")).unwrap();
        assert_eq!(config.clusters.len(), 2);

        config.remove_cluster("a").unwrap();
        assert_eq!(config.clusters.len(), 1);

        // 移除不存在的集群应该失败
        assert!(config.remove_cluster("a").is_err());
    }

    #[test]
    fn test_duplicate_cluster() {
        let mut config = CliConfig::default();
        config.add_cluster("a", cluster("192.168.1.10")).unwrap();

        let result = config.add_cluster("a", cluster("192.168.1.11"));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_config_file() {
        let content = r#"
            [clusters.src]
            api_host = "192.168.1.10"
            api_token_id = "root@pam!pmt"
            api_token_secret = "secret-a"
            ssh_password = "pass-a"

            [clusters.dst]
            name = "备用机房"
            api_host = "192.168.2.10:8006"
            api_token_id = "root@pam!pmt"
            api_token_secret = "secret-b"
            ssh_password = "pass-b"
            ssh_port = 2222
        "#;
        let config: CliConfig = toml::from_str(content).unwrap();
        assert_eq!(config.clusters.len(), 2);
        assert_eq!(config.clusters["src"].ssh_port, 22);
        assert_eq!(config.clusters["dst"].ssh_port, 2222);
        assert_eq!(config.clusters["dst"].name, "备用机房");
    }

    #[tokio::test]
    async fn test_to_registry() {
        use pmt_common::ClusterRegistry;

        let mut config = CliConfig::default();
        config.add_cluster("src", cluster("192.168.1.10")).unwrap();
        let registry = config.to_registry();

        let endpoint = registry.get("src").await.unwrap();
        assert_eq!(endpoint.api_host, "192.168.1.10");
        assert!(registry.get("missing").await.is_none());
    }
}
