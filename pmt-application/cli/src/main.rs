//! PMT 命令行入口

use std::net::SocketAddr;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};

mod commands;
mod config;
mod server;

#[derive(Parser)]
#[command(name = "pmt")]
#[command(about = "PMT - Proxmox 跨集群虚拟机迁移工具", long_about = None)]
#[command(version)]
struct Cli {
    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动迁移服务
    Serve {
        /// HTTP 监听地址
        #[arg(long, default_value = "0.0.0.0:5000")]
        bind: SocketAddr,
    },

    /// 集群登记管理
    Cluster {
        #[command(subcommand)]
        action: ClusterAction,
    },
}

#[derive(Subcommand)]
enum ClusterAction {
    /// 登记集群
    Add {
        /// 集群标识
        id: String,
        /// API 地址（IP 或 IP:端口）
        api_host: String,
        /// API 令牌标识（user@realm!token_name）
        #[arg(long)]
        token_id: String,
        /// API 令牌密钥
        #[arg(long)]
        token_secret: String,
        /// 主机 root 用户的 SSH 密码
        #[arg(long)]
        ssh_password: String,
        /// SSH 端口
        #[arg(long, default_value = "22")]
        ssh_port: u16,
        /// 显示名称
        #[arg(long)]
        name: Option<String>,
    },
    /// 列出已登记的集群
    List,
    /// 移除集群
    Remove {
        /// 集群标识
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt().with_max_level(log_level).init();

    info!("PMT CLI 启动");

    match cli.command {
        Commands::Serve { bind } => server::run(bind).await?,
        Commands::Cluster { action } => commands::cluster::handle(action).await?,
    }

    Ok(())
}
