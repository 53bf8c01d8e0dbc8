//! 磁盘数据流式传输
//!
//! 通过 `ssh "cat ..."` 管道在远端与本地之间搬运大文件，数据直接走
//! SSH 通道，远端不产生临时副本。按块读写并逐块上报进度。

use std::path::Path;
use std::process::Stdio;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::client::{sh_quote, SshClient};
use crate::error::{Result, SshError};

/// 流式读写的块大小
const CHUNK_SIZE: usize = 1024 * 1024;

impl SshClient {
    /// 把远端文件流式下载到本地
    ///
    /// `total_size` 只作为进度回调的分母，每写完一块回调一次
    /// `(已传字节, 总字节)`。返回实际传输的字节数。连接建立受
    /// ConnectTimeout 约束，数据阶段不限时。
    pub async fn download_file<F>(
        &self,
        remote_path: &str,
        local_path: &Path,
        total_size: u64,
        mut progress: F,
    ) -> Result<u64>
    where
        F: FnMut(u64, u64) + Send,
    {
        info!("开始下载: {} -> {}", remote_path, local_path.display());

        let mut cmd = self.build_ssh_command(&format!("cat {}", sh_quote(remote_path)));
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| SshError::TransferError(format!("启动 SSH 进程失败: {}", e)))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| SshError::TransferError("无法获取 SSH 输出流".to_string()))?;

        let mut file = File::create(local_path).await?;
        let transferred = copy_stream(&mut stdout, &mut file, total_size, &mut progress).await?;
        file.flush().await?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SshError::TransferError(format!("等待 SSH 进程失败: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SshError::TransferError(format!(
                "下载 {} 失败: {}",
                remote_path,
                stderr.trim()
            )));
        }

        info!("下载完成: {} ({} 字节)", remote_path, transferred);
        Ok(transferred)
    }

    /// 把本地文件流式上传到远端
    ///
    /// 目标目录需要调用方事先建好。返回实际传输的字节数。
    pub async fn upload_file<F>(
        &self,
        local_path: &Path,
        remote_path: &str,
        mut progress: F,
    ) -> Result<u64>
    where
        F: FnMut(u64, u64) + Send,
    {
        let total_size = tokio::fs::metadata(local_path).await?.len();
        info!(
            "开始上传: {} -> {} ({} 字节)",
            local_path.display(),
            remote_path,
            total_size
        );

        let mut cmd = self.build_ssh_command(&format!("cat > {}", sh_quote(remote_path)));
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| SshError::TransferError(format!("启动 SSH 进程失败: {}", e)))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SshError::TransferError("无法获取 SSH 输入流".to_string()))?;

        let mut file = File::open(local_path).await?;
        let transferred = copy_stream(&mut file, &mut stdin, total_size, &mut progress).await?;
        // 关闭输入流，远端 cat 才会落盘退出
        stdin.shutdown().await?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SshError::TransferError(format!("等待 SSH 进程失败: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SshError::TransferError(format!(
                "上传 {} 失败: {}",
                remote_path,
                stderr.trim()
            )));
        }

        info!("上传完成: {} ({} 字节)", remote_path, transferred);
        Ok(transferred)
    }
}

/// 按块从 reader 搬到 writer，逐块上报进度，返回总字节数
async fn copy_stream<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    total_size: u64,
    progress: &mut F,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(u64, u64) + Send,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut transferred = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        transferred += n as u64;
        progress(transferred, total_size);
    }
    Ok(transferred)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_stream_reports_progress() {
        let data = vec![7u8; 3 * CHUNK_SIZE + 100];
        let mut src: &[u8] = &data;
        let mut dst = Vec::new();
        let mut reports = Vec::new();
        let total = data.len() as u64;

        let copied = copy_stream(&mut src, &mut dst, total, &mut |t, ts| {
            reports.push((t, ts));
        })
        .await
        .unwrap();

        assert_eq!(copied, total);
        assert_eq!(dst.len(), data.len());
        assert_eq!(reports.last(), Some(&(total, total)));
        // 每块至少一次回调
        assert!(reports.len() >= 4);
    }

    #[tokio::test]
    async fn test_copy_stream_empty_input() {
        let mut src: &[u8] = &[];
        let mut dst = Vec::new();
        let mut called = false;
        let copied = copy_stream(&mut src, &mut dst, 0, &mut |_, _| called = true)
            .await
            .unwrap();
        assert_eq!(copied, 0);
        assert!(!called);
        assert!(dst.is_empty());
    }
}
