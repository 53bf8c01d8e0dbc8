//! 集群登记命令

use anyhow::Result;
use colored::Colorize;

use crate::config::{CliConfig, ClusterConfig};

pub async fn handle(action: crate::ClusterAction) -> Result<()> {
    match action {
        crate::ClusterAction::Add {
            id,
            api_host,
            token_id,
            token_secret,
            ssh_password,
            ssh_port,
            name,
        } => add_cluster(&id, &api_host, &token_id, &token_secret, &ssh_password, ssh_port, name),
        crate::ClusterAction::List => list_clusters(),
        crate::ClusterAction::Remove { id } => remove_cluster(&id),
    }
}

#[allow(clippy::too_many_arguments)]
fn add_cluster(
    id: &str,
    api_host: &str,
    token_id: &str,
    token_secret: &str,
    ssh_password: &str,
    ssh_port: u16,
    name: Option<String>,
) -> Result<()> {
    let mut config = CliConfig::load()?;

    let cluster = ClusterConfig {
        name: name.unwrap_or_default(),
        api_host: api_host.to_string(),
        api_token_id: token_id.to_string(),
        api_token_secret: token_secret.to_string(),
        ssh_password: ssh_password.to_string(),
        ssh_port,
    };

    config.add_cluster(id, cluster)?;
    config.save()?;

    println!("{} 集群 {} 登记成功", "✓".green().bold(), id.cyan().bold());
    println!("  API 地址: {}", api_host.yellow());
    println!("  令牌标识: {}", token_id.yellow());

    Ok(())
}

fn list_clusters() -> Result<()> {
    let config = CliConfig::load()?;

    if config.clusters.is_empty() {
        println!("{}", "没有登记任何集群".yellow());
        println!("\n使用以下命令登记集群:");
        println!(
            "  {} pmt cluster add <ID> <API_HOST> --token-id <TOKEN> --token-secret <SECRET> --ssh-password <PASSWORD>",
            "$".bright_black()
        );
        return Ok(());
    }

    println!("{}\n", "已登记的集群:".bold());

    let mut ids: Vec<&String> = config.clusters.keys().collect();
    ids.sort();
    for id in ids {
        let cluster = &config.clusters[id];
        println!("{} {}", "*".green().bold(), id.cyan().bold());
        if !cluster.name.is_empty() {
            println!("    名称:     {}", cluster.name.yellow());
        }
        println!("    API 地址: {}", cluster.api_host.yellow());
        println!("    令牌标识: {}", cluster.api_token_id.yellow());
        // 密钥和密码不回显
        println!("    SSH 端口: {}", cluster.ssh_port.to_string().yellow());
    }

    Ok(())
}

fn remove_cluster(id: &str) -> Result<()> {
    let mut config = CliConfig::load()?;
    config.remove_cluster(id)?;
    config.save()?;

    println!("{} 集群 {} 已移除", "✓".green().bold(), id.cyan().bold());

    Ok(())
}
