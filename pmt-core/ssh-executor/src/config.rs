//! SSH 配置

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// SSH 认证方式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthMethod {
    /// 密码认证（通过 sshpass 传递）
    Password(String),
    /// 指定私钥文件认证（ssh -i）
    KeyFile(String),
    /// 使用默认密钥（~/.ssh/id_rsa, ~/.ssh/id_ed25519 等）
    DefaultKey,
}

/// SSH 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// 主机地址
    pub host: String,
    /// 端口（默认 22）
    pub port: u16,
    /// 用户名
    pub username: String,
    /// 认证方式
    pub auth: AuthMethod,
    /// 连接超时
    #[serde(with = "duration_secs", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// 命令执行超时
    #[serde(with = "duration_secs", default = "default_command_timeout")]
    pub command_timeout: Duration,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(60)
}

impl SshConfig {
    /// 使用密码认证创建配置
    pub fn with_password(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            auth: AuthMethod::Password(password.into()),
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
        }
    }

    /// 使用指定私钥文件认证创建配置
    pub fn with_key_file(
        host: impl Into<String>,
        username: impl Into<String>,
        key_path: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            auth: AuthMethod::KeyFile(key_path.into()),
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
        }
    }

    /// 使用默认密钥认证创建配置
    ///
    /// 密码留空时的回退方式，依赖 ~/.ssh 下已配置好的密钥
    pub fn with_default_key(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 22,
            username: username.into(),
            auth: AuthMethod::DefaultKey,
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
        }
    }

    /// 设置端口
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// 设置连接超时
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// 设置命令执行超时
    ///
    /// 大文件的 dd 落盘之类的长操作需要调大这个值
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// 获取 SSH 地址字符串（host:port 格式）
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Duration 按秒数序列化
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
