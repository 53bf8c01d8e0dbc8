//! Proxmox VE API 客户端
//!
//! 通过 API Token 访问 `https://<host>/api2/json`。PVE 默认使用自签名证书，
//! 客户端跳过证书校验。具体资源的操作通过 [`PveClient::node`]、
//! [`PveClient::vm`]、[`PveClient::storage`]、[`PveClient::cluster`]
//! 返回的分组接口调用。

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use pmt_common::ClusterEndpoint;

use crate::api::{ClusterApi, NodeApi, StorageApi, VmApi};
use crate::error::{PveError, Result};
use crate::models::NodeInfo;

/// 单次 API 请求的超时
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// PVE 响应的统一外层结构 `{"data": ...}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

/// Proxmox VE API 客户端
#[derive(Clone)]
pub struct PveClient {
    http: reqwest::Client,
    base_url: String,
    auth_header: String,
    host: String,
}

impl PveClient {
    /// 创建客户端
    ///
    /// `api_host` 需要是 `IP:PORT` 形式，`token_id` 形如 `root@pam!pmt`。
    pub fn new(api_host: &str, token_id: &str, token_secret: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(API_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: format!("https://{}/api2/json", api_host),
            auth_header: format!("PVEAPIToken={}={}", token_id, token_secret),
            host: api_host.to_string(),
        })
    }

    /// 从集群端点配置创建客户端，自动补默认端口
    pub fn for_endpoint(endpoint: &ClusterEndpoint) -> Result<Self> {
        let host = format!("{}:{}", endpoint.api_host_without_port(), endpoint.api_port());
        Self::new(&host, &endpoint.api_token_id, &endpoint.api_token_secret)
    }

    /// 客户端指向的主机（`IP:PORT`）
    pub fn host(&self) -> &str {
        &self.host
    }

    /// 校验连通性与凭据，成功时返回节点列表
    ///
    /// 把底层网络错误翻译成带排查提示的错误信息。
    pub async fn validate(&self) -> Result<Vec<NodeInfo>> {
        match self.node().list().await {
            Ok(nodes) => {
                info!("✅ 集群 {} 连接成功，{} 个节点", self.host, nodes.len());
                Ok(nodes)
            }
            Err(PveError::Authentication(_)) => Err(PveError::Authentication(format!(
                "集群 {} 拒绝了 API Token，请检查 Token ID 与密钥",
                self.host
            ))),
            Err(PveError::Request(err)) => Err(self.translate_request_error(err)),
            Err(err) => Err(err),
        }
    }

    fn translate_request_error(&self, err: reqwest::Error) -> PveError {
        let text = err.to_string();
        let reason = if err.is_timeout() {
            "连接超时，请检查网络与防火墙设置".to_string()
        } else if text.contains("certificate") {
            format!("SSL 协商失败: {}", text)
        } else if err.is_connect() || err.is_builder() {
            format!("无法建立连接，请确认地址为 IP:PORT 格式（默认端口 8006）: {}", text)
        } else {
            text
        };
        PveError::Connection {
            host: self.host.clone(),
            reason,
        }
    }

    // =========================================================================
    // 分组接口
    // =========================================================================

    /// 节点相关接口
    pub fn node(&self) -> NodeApi<'_> {
        NodeApi::new(self)
    }

    /// 虚拟机相关接口
    pub fn vm(&self) -> VmApi<'_> {
        VmApi::new(self)
    }

    /// 存储相关接口
    pub fn storage(&self) -> StorageApi<'_> {
        StorageApi::new(self)
    }

    /// 集群级接口
    pub fn cluster(&self) -> ClusterApi<'_> {
        ClusterApi::new(self)
    }

    // =========================================================================
    // 底层请求
    // =========================================================================

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let req = self.http.get(format!("{}{}", self.base_url, path));
        self.execute(req, "GET", path).await
    }

    pub(crate) async fn get_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let req = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(query);
        self.execute(req, "GET", path).await
    }

    pub(crate) async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T> {
        let req = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .form(params);
        self.execute(req, "POST", path).await
    }

    /// PUT 但不关心返回值，`data` 为 null 也算成功，配置修改类接口走这里
    pub(crate) async fn put_form_unit(&self, path: &str, params: &[(String, String)]) -> Result<()> {
        let _: Option<Value> = self.execute_optional(
            self.http.put(format!("{}{}", self.base_url, path)).form(params),
            "PUT",
            path,
        )
        .await?;
        Ok(())
    }

    /// DELETE 但不关心返回值
    pub(crate) async fn delete_unit(&self, path: &str) -> Result<()> {
        let _: Option<Value> = self
            .execute_optional(
                self.http.delete(format!("{}{}", self.base_url, path)),
                "DELETE",
                path,
            )
            .await?;
        Ok(())
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        method: &str,
        path: &str,
    ) -> Result<T> {
        self.execute_optional(req, method, path)
            .await?
            .ok_or_else(|| PveError::Parse(format!("{} {} 响应缺少 data 字段", method, path)))
    }

    async fn execute_optional<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        method: &str,
        path: &str,
    ) -> Result<Option<T>> {
        debug!("PVE API {} {}", method, path);
        let resp = req
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!("PVE API {} {} 返回 {}: {}", method, path, status, message);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    PveError::Authentication(message)
                }
                StatusCode::NOT_FOUND => PveError::NotFound(format!("{} {}", method, path)),
                _ => PveError::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }
        let envelope: Envelope<T> = resp
            .json()
            .await
            .map_err(|err| PveError::Parse(format!("{} {}: {}", method, path, err)))?;
        Ok(envelope.data)
    }
}

// =============================================================================
// 测试
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds_base_url_and_auth() {
        let client = PveClient::new("192.168.1.10:8006", "root@pam!pmt", "secret-uuid").unwrap();
        assert_eq!(client.base_url, "https://192.168.1.10:8006/api2/json");
        assert_eq!(client.auth_header, "PVEAPIToken=root@pam!pmt=secret-uuid");
        assert_eq!(client.host(), "192.168.1.10:8006");
    }

    #[test]
    fn test_for_endpoint_appends_default_port() {
        let ep = ClusterEndpoint::new(
            "src",
            "https://192.168.1.10/",
            "root@pam!pmt",
            "secret",
            "pw",
        );
        let client = PveClient::for_endpoint(&ep).unwrap();
        assert_eq!(client.base_url, "https://192.168.1.10:8006/api2/json");
    }

    #[test]
    fn test_envelope_tolerates_null_data() {
        let e: Envelope<Vec<NodeInfo>> = serde_json::from_str(r#"{"data":null}"#).unwrap();
        assert!(e.data.is_none());
        let e: Envelope<Vec<NodeInfo>> =
            serde_json::from_str(r#"{"data":[{"node":"pve1","status":"online"}]}"#).unwrap();
        assert_eq!(e.data.unwrap()[0].node, "pve1");
    }
}
