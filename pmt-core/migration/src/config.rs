//! 虚拟机配置的拆分与改写
//!
//! 迁移要把源配置拆成两部分：磁盘槽位单独走创建加搬运流程，
//! 其余参数直接用于目标端建机。这里集中了相关的纯函数：
//! 配置拆分、创建参数清理、磁盘尺寸归一、磁盘序号推导、
//! 网桥替换与挂载串拼装。

use regex::Regex;
use tracing::debug;

use pmt_proxmox::{config_text, is_disk_slot, VmConfig, VolumeDescriptor};

/// 尺寸缺失或无法解析时的默认磁盘大小
pub const DEFAULT_DISK_SIZE: &str = "20G";

/// 拆分结果，磁盘槽位与其余配置项分开
pub struct SplitConfig {
    /// 磁盘槽位及原始值，按键名排序
    pub disks: Vec<(String, String)>,
    /// 除磁盘槽位外的全部配置项
    pub params: Vec<(String, String)>,
}

/// 把虚拟机配置拆成磁盘槽位与普通参数两部分
///
/// 值里没有 `存储:卷名` 结构的槽位（例如 `ide2: none,media=cdrom`）
/// 不算磁盘，会随普通参数一起进入建机配置。
pub fn split_config(config: &VmConfig) -> SplitConfig {
    let mut disks = Vec::new();
    let mut params = Vec::new();
    for (key, value) in config {
        let Some(text) = config_text(value) else {
            debug!("跳过非标量配置项 {}", key);
            continue;
        };
        if is_disk_slot(key) && text.contains(':') {
            disks.push((key.clone(), text));
        } else {
            params.push((key.clone(), text));
        }
    }
    SplitConfig { disks, params }
}

/// 虚拟机创建前的参数整理
///
/// 去掉控制平面自己生成的身份字段，显示名称追加 `-migrated` 后缀
/// 与源虚拟机区分；没有 `name` 字段的容器型配置改后缀 `hostname`。
pub fn sanitize_create_params(params: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = params
        .into_iter()
        .filter(|(key, _)| {
            let generated = matches!(key.as_str(), "meta" | "digest" | "vmgenid");
            if generated {
                debug!("创建参数中去掉 {}", key);
            }
            !generated
        })
        .collect();
    if let Some(entry) = params.iter_mut().find(|(key, _)| key == "name") {
        entry.1 = format!("{}-migrated", entry.1);
    } else if let Some(entry) = params.iter_mut().find(|(key, _)| key == "hostname") {
        entry.1 = format!("{}-migrated", entry.1);
    }
    params
}

/// 推导目标磁盘的创建尺寸
///
/// `size=` 选项按单位归一：纯数字按字节数进一取整到 MiB，`K` 换算成
/// MiB，`M`/`G`/`T` 原样保留。没有尺寸的 EFI 盘按 `efitype=` 给固定值，
/// 其余情况回落默认值。
pub fn derive_disk_size(slot: &str, descriptor: &VolumeDescriptor) -> String {
    if let Some(raw) = descriptor.size() {
        return normalize_size(raw).unwrap_or_else(|| DEFAULT_DISK_SIZE.to_string());
    }
    if slot == "efidisk0" {
        return match descriptor.option("efitype") {
            Some("4m") => "4M".to_string(),
            _ => "1M".to_string(),
        };
    }
    DEFAULT_DISK_SIZE.to_string()
}

/// 单位归一，坏值返回 None
fn normalize_size(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.is_ascii() {
        return None;
    }
    if raw.bytes().all(|b| b.is_ascii_digit()) {
        let bytes: u64 = raw.parse().ok()?;
        let mib = div_ceil(bytes, 1024 * 1024).max(1);
        return Some(format!("{}M", mib));
    }
    let (number, unit) = raw.split_at(raw.len() - 1);
    match unit {
        "K" => {
            let kib: u64 = number.parse().ok()?;
            let mib = div_ceil(kib, 1024).max(1);
            Some(format!("{}M", mib))
        }
        "M" | "G" | "T" => {
            number.parse::<u64>().ok()?;
            Some(raw.to_string())
        }
        _ => None,
    }
}

fn div_ceil(value: u64, divisor: u64) -> u64 {
    (value + divisor - 1) / divisor
}

/// 推导目标磁盘的序号
///
/// 优先取源文件名里的 `disk-<n>` 段，保证重建的磁盘编号与数据文件
/// 对得上；文件名里没有时退回槽位名里的数字，再没有就用 0。
pub fn disk_number(slot: &str, source_file: &str) -> String {
    if let Some(idx) = source_file.find("disk-") {
        let digits: String = source_file[idx + 5..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if !digits.is_empty() {
            return digits;
        }
    }
    let digits: String = slot.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        "0".to_string()
    } else {
        digits
    }
}

/// 把网卡配置里的 bridge=xxx 换成目标网桥
pub fn remap_bridge(net_value: &str, bridge: &str) -> String {
    // 匹配 bridge=vmbr0 一段
    match Regex::new(r"bridge=[^,]+") {
        Ok(re) => re
            .replace_all(net_value, format!("bridge={}", bridge).as_str())
            .into_owned(),
        Err(_) => net_value.to_string(),
    }
}

/// 拼出磁盘挂载用的槽位值
///
/// 数据盘已经单独创建，`size=` 一律剥掉；普通磁盘还要剥掉指向源端
/// 文件的 `path=`/`file=`，EFI 与 TPM 槽位保留它们。
pub fn attach_value(
    storage: &str,
    disk_name: &str,
    descriptor: &VolumeDescriptor,
    slot: &str,
) -> String {
    let special = slot == "efidisk0" || slot == "tpmstate0";
    let exclude: &[&str] = if special {
        &["size"]
    } else {
        &["size", "path", "file"]
    };
    let options = descriptor.render_options(exclude);
    if options.is_empty() {
        format!("{}:{}", storage, disk_name)
    } else {
        format!("{}:{},{}", storage, disk_name, options)
    }
}

// =============================================================================
// 测试
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(entries: &[(&str, serde_json::Value)]) -> VmConfig {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_split_config_separates_disks() {
        let cfg = config(&[
            ("name", json!("web01")),
            ("memory", json!(4096)),
            ("scsi0", json!("local:100/vm-100-disk-0.qcow2,size=32G")),
            ("scsihw", json!("virtio-scsi-pci")),
            ("ide2", json!("none,media=cdrom")),
            ("net0", json!("virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0")),
        ]);
        let split = split_config(&cfg);
        assert_eq!(split.disks.len(), 1);
        assert_eq!(split.disks[0].0, "scsi0");
        // 没有卷结构的 ide2 和控制器类型留在普通参数里
        let keys: Vec<&str> = split.params.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"ide2"));
        assert!(keys.contains(&"scsihw"));
        assert!(keys.contains(&"memory"));
    }

    #[test]
    fn test_sanitize_drops_generated_fields() {
        let params = vec![
            ("name".to_string(), "web01".to_string()),
            ("meta".to_string(), "creation-qemu=8.0".to_string()),
            ("digest".to_string(), "abc123".to_string()),
            ("vmgenid".to_string(), "uuid-here".to_string()),
            ("cores".to_string(), "4".to_string()),
        ];
        let cleaned = sanitize_create_params(params);
        let keys: Vec<&str> = cleaned.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["name", "cores"]);
        assert_eq!(cleaned[0].1, "web01-migrated");
    }

    #[test]
    fn test_sanitize_suffixes_hostname_when_no_name() {
        let params = vec![("hostname".to_string(), "ct01".to_string())];
        let cleaned = sanitize_create_params(params);
        assert_eq!(cleaned[0].1, "ct01-migrated");
    }

    #[test]
    fn test_size_normalization_vectors() {
        let d = |value: &str| VolumeDescriptor::parse(value).unwrap();
        assert_eq!(derive_disk_size("scsi0", &d("local:vm-100-disk-0,size=10G")), "10G");
        assert_eq!(derive_disk_size("scsi0", &d("local:vm-100-disk-0,size=512M")), "512M");
        assert_eq!(derive_disk_size("scsi0", &d("local:vm-100-disk-0,size=2T")), "2T");
        // 纯数字按字节取整到 MiB
        assert_eq!(derive_disk_size("scsi0", &d("local:vm-100-disk-0,size=2097152")), "2M");
        assert_eq!(derive_disk_size("scsi0", &d("local:vm-100-disk-0,size=524288")), "1M");
        // K 换算成 MiB，最小 1M
        assert_eq!(derive_disk_size("scsi0", &d("local:vm-100-disk-0,size=50K")), "1M");
        // 坏值回落默认
        assert_eq!(derive_disk_size("scsi0", &d("local:vm-100-disk-0,size=abcG")), "20G");
        assert_eq!(derive_disk_size("scsi0", &d("local:vm-100-disk-0")), "20G");
    }

    #[test]
    fn test_efi_size_from_efitype() {
        let d = |value: &str| VolumeDescriptor::parse(value).unwrap();
        assert_eq!(derive_disk_size("efidisk0", &d("local:vm-100-disk-1,efitype=4m")), "4M");
        assert_eq!(derive_disk_size("efidisk0", &d("local:vm-100-disk-1,efitype=2m")), "1M");
        assert_eq!(derive_disk_size("efidisk0", &d("local:vm-100-disk-1")), "1M");
        // 显式尺寸优先于 efitype
        assert_eq!(derive_disk_size("efidisk0", &d("local:vm-100-disk-1,efitype=4m,size=528K")), "1M");
    }

    #[test]
    fn test_disk_number_prefers_source_filename() {
        assert_eq!(disk_number("scsi0", "vm-100-disk-3.qcow2"), "3");
        assert_eq!(disk_number("virtio2", "base-image.raw"), "2");
        assert_eq!(disk_number("scsi12", "vm-100-disk-12"), "12");
        assert_eq!(disk_number("efidisk0", "vm-100-disk-1"), "1");
        assert_eq!(disk_number("hdd", "image.raw"), "0");
    }

    #[test]
    fn test_remap_bridge() {
        assert_eq!(
            remap_bridge("virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0,firewall=1", "vmbr5"),
            "virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr5,firewall=1"
        );
        // 没有 bridge 段时保持原样
        assert_eq!(remap_bridge("virtio=AA:BB:CC:DD:EE:FF", "vmbr5"), "virtio=AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_attach_value_strips_options() {
        let d = VolumeDescriptor::parse("old:100/vm-100-disk-0.qcow2,size=32G,ssd=1,path=/var/x")
            .unwrap();
        assert_eq!(
            attach_value("local", "vm-105-disk-0.qcow2", &d, "scsi0"),
            "local:vm-105-disk-0.qcow2,ssd=1"
        );
    }

    #[test]
    fn test_attach_value_keeps_path_for_efi() {
        let d = VolumeDescriptor::parse("old:vm-100-disk-1,size=4M,efitype=4m,path=/var/x").unwrap();
        assert_eq!(
            attach_value("local", "vm-105-disk-1", &d, "efidisk0"),
            "local:vm-105-disk-1,efitype=4m,path=/var/x"
        );
    }

    #[test]
    fn test_attach_value_without_options() {
        let d = VolumeDescriptor::parse("old:vm-100-disk-0,size=8G").unwrap();
        assert_eq!(attach_value("lvm-pool", "vm-105-disk-0", &d, "scsi1"), "lvm-pool:vm-105-disk-0");
    }
}
