//! SSH 客户端实现
//!
//! 使用系统 ssh/sshpass 命令执行远程命令，兼容性更好

use std::process::Stdio;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::{AuthMethod, SshConfig};
use crate::error::{Result, SshError};

/// 命令执行输出
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// 标准输出
    pub stdout: String,
    /// 标准错误
    pub stderr: String,
    /// 退出码
    pub exit_code: Option<u32>,
}

impl CommandOutput {
    /// 检查命令是否成功执行
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// 获取合并的输出（stdout + stderr）
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// SSH 客户端（使用系统 ssh 命令）
pub struct SshClient {
    config: SshConfig,
}

impl SshClient {
    /// 连接到 SSH 服务器（验证连接）
    pub async fn connect(config: SshConfig) -> Result<Self> {
        info!("正在连接 SSH: {}@{}", config.username, config.address());

        let client = Self { config };

        // 验证连接（执行简单命令）
        debug!("验证 SSH 连接...");
        let output = client.execute("echo connected").await?;

        if output.stdout.trim() != "connected" {
            return Err(SshError::ConnectionError(format!(
                "SSH 连接验证失败: {}",
                output.stderr
            )));
        }

        info!("SSH 连接成功: {}@{}", client.config.username, client.config.address());
        Ok(client)
    }

    /// 执行命令
    pub async fn execute(&self, command: &str) -> Result<CommandOutput> {
        debug!("执行命令: {}", command);

        let result = timeout(self.config.command_timeout, self.execute_internal(command))
            .await
            .map_err(|_| SshError::TimeoutError(format!("命令执行超时: {}", command)))?;

        result
    }

    /// 执行命令内部实现
    async fn execute_internal(&self, command: &str) -> Result<CommandOutput> {
        let mut cmd = self.build_ssh_command(command);

        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| SshError::ExecutionError(format!("启动 SSH 进程失败: {}", e)))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SshError::ExecutionError(format!("等待 SSH 进程失败: {}", e)))?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            exit_code: output.status.code().map(|c| c as u32),
        };

        check_auth_failure(&result)?;

        debug!(
            "命令执行完成, 退出码: {:?}, stdout 长度: {}, stderr 长度: {}",
            result.exit_code,
            result.stdout.len(),
            result.stderr.len()
        );

        Ok(result)
    }

    /// 组装 ssh 进程（认证方式、通用参数、目标与远程命令）
    pub(crate) fn build_ssh_command(&self, command: &str) -> Command {
        let mut cmd = match &self.config.auth {
            AuthMethod::Password(password) => {
                // 使用 sshpass 进行密码认证
                let mut cmd = Command::new("sshpass");
                cmd.arg("-p").arg(password);
                cmd.arg("ssh");
                cmd
            }
            AuthMethod::KeyFile(key_path) => {
                let mut cmd = Command::new("ssh");
                cmd.arg("-i").arg(key_path);
                cmd
            }
            AuthMethod::DefaultKey => Command::new("ssh"),
        };

        // 通用 SSH 参数
        cmd.arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.config.connect_timeout.as_secs()))
            .arg("-o")
            .arg("NumberOfPasswordPrompts=1")
            .arg("-p")
            .arg(self.config.port.to_string())
            .arg(format!("{}@{}", self.config.username, self.config.host))
            .arg(command);
        cmd
    }

    /// 执行命令并检查是否成功
    pub async fn execute_checked(&self, command: &str) -> Result<CommandOutput> {
        let output = self.execute(command).await?;

        if !output.is_success() {
            return Err(SshError::ExecutionError(format!(
                "命令执行失败 (退出码 {:?}): {}",
                output.exit_code,
                if output.stderr.is_empty() {
                    &output.stdout
                } else {
                    &output.stderr
                }
            )));
        }

        Ok(output)
    }

    // =========================================================================
    // 文件与存储辅助操作
    // =========================================================================

    /// 检查普通文件是否存在
    pub async fn file_exists(&self, path: &str) -> Result<bool> {
        let output = self
            .execute(&format!("test -f {} && echo 1 || echo 0", sh_quote(path)))
            .await?;
        Ok(output.stdout.trim() == "1")
    }

    /// 检查块设备是否存在
    pub async fn block_device_exists(&self, path: &str) -> Result<bool> {
        let output = self
            .execute(&format!("test -b {} && echo 1 || echo 0", sh_quote(path)))
            .await?;
        Ok(output.stdout.trim() == "1")
    }

    /// 读取文件内容
    pub async fn read_file(&self, path: &str) -> Result<String> {
        let output = self.execute_checked(&format!("cat {}", sh_quote(path))).await?;
        Ok(output.stdout)
    }

    /// 递归创建目录
    pub async fn mkdir_p(&self, path: &str) -> Result<()> {
        self.execute_checked(&format!("mkdir -p {}", sh_quote(path))).await?;
        Ok(())
    }

    /// 删除文件，文件不存在不算失败
    pub async fn remove_file(&self, path: &str) -> Result<()> {
        self.execute_checked(&format!("rm -f {}", sh_quote(path))).await?;
        Ok(())
    }

    /// 移动/重命名文件
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.execute_checked(&format!("mv {} {}", sh_quote(from), sh_quote(to)))
            .await?;
        Ok(())
    }

    /// 文件大小（字节），stat 不可用时回退解析 ls 输出
    pub async fn file_size(&self, path: &str) -> Result<u64> {
        let quoted = sh_quote(path);
        let output = self.execute(&format!("stat -c %s {}", quoted)).await?;
        if output.is_success() {
            if let Ok(size) = output.stdout.trim().parse::<u64>() {
                return Ok(size);
            }
        }
        let output = self.execute_checked(&format!("ls -la {}", quoted)).await?;
        output
            .stdout
            .split_whitespace()
            .nth(4)
            .and_then(|f| f.parse::<u64>().ok())
            .ok_or_else(|| SshError::ExecutionError(format!("无法获取文件大小: {}", path)))
    }

    /// 路径所在文件系统的可用空间（GB）
    ///
    /// df 输出解析不出来时返回 None，由调用方决定是否继续。
    pub async fn available_space_gb(&self, path: &str) -> Result<Option<u64>> {
        let output = self
            .execute(&format!("df -BG {} | tail -1", sh_quote(path)))
            .await?;
        if !output.is_success() {
            return Ok(None);
        }
        Ok(parse_df_available_gb(&output.stdout))
    }

    /// 获取配置
    pub fn config(&self) -> &SshConfig {
        &self.config
    }
}

/// 识别认证失败（sshpass 退出码 5，ssh 退出码 255 配合错误信息）
fn check_auth_failure(result: &CommandOutput) -> Result<()> {
    if result.exit_code == Some(5) || result.exit_code == Some(255) {
        if result.stderr.contains("Permission denied")
            || result.stderr.contains("Authentication failed")
            || result.stderr.contains("password")
        {
            return Err(SshError::AuthenticationError(format!(
                "SSH 认证失败: {}",
                result.stderr
            )));
        }
    }
    Ok(())
}

/// 解析 `df -BG` 最后一行的可用空间列
pub(crate) fn parse_df_available_gb(line: &str) -> Option<u64> {
    let last_line = line.lines().last()?;
    let field = last_line.split_whitespace().nth(3)?;
    field.trim_end_matches('G').parse::<u64>().ok()
}

/// 为远程 shell 安全地引用一个参数
///
/// 纯路径字符原样返回，其余加单引号并转义内部的单引号。
pub fn sh_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-' | '_' | ':' | '+' | ',' | '='));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
