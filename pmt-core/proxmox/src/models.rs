//! Proxmox API 数据模型
//!
//! 只声明本工具用到的字段，其余字段由 serde 忽略。PVE 的接口对同一资源
//! 会按上下文省略不同的字段，可选字段一律用 `Option` 承接。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 虚拟机配置就是一张键值表（`scsi0`、`net0`、`memory` 等）
pub type VmConfig = serde_json::Map<String, Value>;

/// 集群节点信息（`GET /nodes`）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub node: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// 节点上的虚拟机条目（`GET /nodes/{node}/qemu`）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmEntry {
    pub vmid: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// 虚拟机运行状态（`GET /nodes/{node}/qemu/{vmid}/status/current`）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmStatus {
    /// `running` / `stopped` 等
    pub status: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub qmpstatus: Option<String>,
}

impl VmStatus {
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }

    pub fn is_stopped(&self) -> bool {
        self.status == "stopped"
    }
}

/// 存储定义（`GET /storage` 或 `GET /storage/{storage}`）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageInfo {
    pub storage: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub shared: Option<u8>,
    #[serde(default)]
    pub active: Option<u8>,
}

impl StorageInfo {
    /// 块设备类存储，卷没有文件路径，数据要走设备读取
    pub fn is_block(&self) -> bool {
        is_block_storage(&self.kind)
    }

    /// 网络挂载类存储，挂载点固定在 `/mnt/pve/<storage>`
    pub fn is_mounted_share(&self) -> bool {
        is_mounted_storage(&self.kind)
    }

    /// 目录类存储
    pub fn is_dir(&self) -> bool {
        self.kind == "dir"
    }
}

/// 块设备类存储类型
pub fn is_block_storage(kind: &str) -> bool {
    matches!(kind, "lvm" | "lvmthin" | "zfspool")
}

/// 网络挂载类存储类型
pub fn is_mounted_storage(kind: &str) -> bool {
    matches!(kind, "nfs" | "cifs" | "glusterfs")
}

/// 磁盘槽位键名（`scsi0`、`virtio1`、`ide2`、`sata0`、`efidisk0`、`tpmstate0`）
///
/// `scsihw` 这类非槽位键不会被匹配到。
pub fn is_disk_slot(key: &str) -> bool {
    if key == "efidisk0" || key == "tpmstate0" {
        return true;
    }
    ["scsi", "virtio", "ide", "sata"].iter().any(|prefix| {
        key.strip_prefix(prefix)
            .map_or(false, |rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
    })
}

/// 虚拟机概要，配置与运行状态合并成的一条摘要
#[derive(Debug, Clone, Serialize)]
pub struct VmSummary {
    pub vmid: u32,
    pub name: String,
    pub status: String,
    pub memory: String,
    pub cores: String,
    pub node: String,
    /// 携带卷的磁盘槽位键名
    pub disk_slots: Vec<String>,
}

/// 存储上的内容对象（`GET /nodes/{node}/storage/{storage}/content`）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageContent {
    /// 卷标识，形如 `local:100/vm-100-disk-0.qcow2`
    pub volid: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub vmid: Option<u32>,
}

/// 集群资源条目（`GET /cluster/resources`）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterResource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub vmid: Option<u32>,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// 把配置项的 JSON 值转成文本形式
///
/// PVE 的配置接口里数值字段有时是数字有时是字符串，统一转成字符串处理。
pub fn config_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// =============================================================================
// 卷描述符
// =============================================================================

/// 配置里磁盘槽位的值，形如 `local:100/vm-100-disk-0.qcow2,size=32G,ssd=1`
///
/// 首段是 `存储:卷名`，其后是逗号分隔的 `k=v` 选项。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeDescriptor {
    pub storage: String,
    pub volume: String,
    pub options: Vec<(String, String)>,
}

impl VolumeDescriptor {
    /// 解析槽位值，首段没有 `存储:卷名` 结构时返回 None
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split(',');
        let head = parts.next()?.trim();
        let (storage, volume) = head.split_once(':')?;
        if storage.is_empty() {
            return None;
        }
        let options = parts
            .filter_map(|part| {
                let part = part.trim();
                if part.is_empty() {
                    return None;
                }
                match part.split_once('=') {
                    Some((k, v)) => Some((k.to_string(), v.to_string())),
                    None => Some((part.to_string(), String::new())),
                }
            })
            .collect();
        Some(Self {
            storage: storage.to_string(),
            volume: volume.to_string(),
            options,
        })
    }

    /// 按键取选项值
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `size=` 选项
    pub fn size(&self) -> Option<&str> {
        self.option("size")
    }

    /// `format=` 选项
    pub fn format(&self) -> Option<&str> {
        self.option("format")
    }

    /// 光驱类槽位不携带磁盘数据，迁移时直接跳过
    pub fn is_cdrom(&self) -> bool {
        self.option("media") == Some("cdrom") || self.volume.ends_with(".iso")
    }

    /// 卷名的最后一个路径段，即磁盘文件名
    pub fn file_name(&self) -> &str {
        self.volume.rsplit('/').next().unwrap_or(&self.volume)
    }

    /// 重新拼出选项串，排除指定键；没有剩余选项时返回空串
    pub fn render_options(&self, exclude: &[&str]) -> String {
        self.options
            .iter()
            .filter(|(k, _)| !exclude.contains(&k.as_str()))
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{}={}", k, v)
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

// =============================================================================
// 测试
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_volume() {
        let d = VolumeDescriptor::parse("local:100/vm-100-disk-0.qcow2,size=32G,ssd=1").unwrap();
        assert_eq!(d.storage, "local");
        assert_eq!(d.volume, "100/vm-100-disk-0.qcow2");
        assert_eq!(d.size(), Some("32G"));
        assert_eq!(d.option("ssd"), Some("1"));
        assert_eq!(d.file_name(), "vm-100-disk-0.qcow2");
        assert!(!d.is_cdrom());
    }

    #[test]
    fn test_parse_block_volume() {
        let d = VolumeDescriptor::parse("local-lvm:vm-105-disk-1,size=20G").unwrap();
        assert_eq!(d.storage, "local-lvm");
        assert_eq!(d.volume, "vm-105-disk-1");
        assert_eq!(d.file_name(), "vm-105-disk-1");
    }

    #[test]
    fn test_parse_rejects_missing_colon() {
        assert!(VolumeDescriptor::parse("none").is_none());
        assert!(VolumeDescriptor::parse("media=cdrom").is_none());
    }

    #[test]
    fn test_cdrom_detection() {
        let d = VolumeDescriptor::parse("none:cdrom,media=cdrom").unwrap();
        assert!(d.is_cdrom());
        let d = VolumeDescriptor::parse("local:iso/debian-12.iso,media=cdrom,size=628M").unwrap();
        assert!(d.is_cdrom());
        let d = VolumeDescriptor::parse("local:iso/debian-12.iso").unwrap();
        assert!(d.is_cdrom());
    }

    #[test]
    fn test_render_options_excludes_keys() {
        let d = VolumeDescriptor::parse("local:100/vm-100-disk-0.qcow2,size=32G,ssd=1,iothread=1")
            .unwrap();
        assert_eq!(d.render_options(&["size"]), "ssd=1,iothread=1");
        assert_eq!(d.render_options(&["size", "ssd", "iothread"]), "");
    }

    #[test]
    fn test_storage_families() {
        assert!(is_block_storage("lvmthin"));
        assert!(is_block_storage("zfspool"));
        assert!(!is_block_storage("dir"));
        assert!(is_mounted_storage("nfs"));
        assert!(!is_mounted_storage("lvm"));
    }

    #[test]
    fn test_disk_slot_keys() {
        assert!(is_disk_slot("scsi0"));
        assert!(is_disk_slot("virtio12"));
        assert!(is_disk_slot("ide2"));
        assert!(is_disk_slot("sata1"));
        assert!(is_disk_slot("efidisk0"));
        assert!(is_disk_slot("tpmstate0"));
        assert!(!is_disk_slot("scsihw"));
        assert!(!is_disk_slot("scsi"));
        assert!(!is_disk_slot("net0"));
        assert!(!is_disk_slot("memory"));
    }

    #[test]
    fn test_config_text() {
        assert_eq!(config_text(&Value::String("abc".into())), Some("abc".into()));
        assert_eq!(config_text(&serde_json::json!(4096)), Some("4096".into()));
        assert_eq!(config_text(&Value::Null), None);
    }
}
