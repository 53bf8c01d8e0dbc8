//! PMT SSH 执行器
//!
//! 提供迁移流程需要的 SSH 能力：
//! - 密码认证（sshpass）与默认密钥认证
//! - 远程命令执行和输出捕获
//! - 文件与存储辅助操作（存在性、大小、可用空间、移动、删除）
//! - 大文件的管道式下载/上传，带进度回调
//!
//! # 示例
//!
//! ```ignore
//! use pmt_ssh_executor::{SshClient, SshConfig};
//!
//! let config = SshConfig::with_password("192.168.1.100", "root", "password");
//! let client = SshClient::connect(config).await?;
//! let output = client.execute("ls -la /var/lib/vz/images").await?;
//! println!("{}", output.stdout);
//! ```

mod client;
mod config;
mod error;
mod transfer;

pub use client::{sh_quote, CommandOutput, SshClient};
pub use config::{AuthMethod, SshConfig};
pub use error::{Result, SshError};
