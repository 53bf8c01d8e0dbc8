//! 目标路径解析
//!
//! 上传落点由目标存储的类型决定，文件类与块设备类两条传输分支共用
//! 同一套解析规则。解析不到存储信息时回落到 `/var/lib/vz` 默认约定。

use pmt_proxmox::StorageInfo;

use crate::locate::base_name;

/// 目标端的落盘位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DestLocation {
    /// 目录，用于建目录和空间检查
    pub dir: String,
    /// 完整文件路径，上传的初始落点
    pub path: String,
}

/// 默认落点 `/var/lib/vz/images/<vmid>/<文件名>.raw`
pub(crate) fn default_location(vmid: u32, disk_filename: &str) -> DestLocation {
    let dir = format!("/var/lib/vz/images/{}", vmid);
    DestLocation {
        path: format!("{}/{}.raw", dir, disk_filename),
        dir,
    }
}

/// 根据目标存储信息解析落点
///
/// - `dir` 存储且路径是默认的 `/var/lib/vz`(或未配置)：按挂载点
///   `/mnt/pve/<存储名>` 处理
/// - `dir` 存储且配置了专有路径：用该路径
/// - 网络挂载类存储：固定 `/mnt/pve/<存储名>`
/// - 块设备类或其他：用默认落点，由 PVE 自行映射
pub(crate) fn resolve_location(
    storage: Option<&StorageInfo>,
    vmid: u32,
    disk_filename: &str,
) -> DestLocation {
    let Some(info) = storage else {
        return default_location(vmid, disk_filename);
    };

    if info.is_dir() {
        match info.path.as_deref() {
            None | Some("") | Some("/var/lib/vz") | Some("/var/lib/vz/") => {
                mount_location(&info.storage, vmid, disk_filename)
            }
            Some(path) => {
                let dir = format!("{}/images/{}", path, vmid);
                DestLocation {
                    path: format!("{}/{}.raw", dir, disk_filename),
                    dir,
                }
            }
        }
    } else if info.is_mounted_share() {
        mount_location(&info.storage, vmid, disk_filename)
    } else {
        default_location(vmid, disk_filename)
    }
}

fn mount_location(storage: &str, vmid: u32, disk_filename: &str) -> DestLocation {
    let dir = format!("/mnt/pve/{}/images/{}", storage, vmid);
    DestLocation {
        path: format!("{}/{}.raw", dir, disk_filename),
        dir,
    }
}

/// 从上传后的文件名推导规范命名 `vm-<vmid>-disk-<n>.<格式>` 的完整路径
///
/// 磁盘序号取文件名里 `disk-` 后面的一段（去掉扩展名）。推导不出来时
/// 返回 None，调用方保留上传时的文件名。
pub(crate) fn rename_target(dest_path: &str, vmid: u32, format: &str) -> Option<String> {
    let file = base_name(dest_path);
    if !file.contains("disk-") {
        return None;
    }
    let parts: Vec<&str> = file.split('-').collect();
    for (i, part) in parts.iter().enumerate() {
        if part.starts_with("disk") && i + 1 < parts.len() {
            let number = parts[i + 1]
                .trim_end_matches(".raw")
                .trim_end_matches(".qcow2");
            if number.is_empty() {
                return None;
            }
            let new_name = format!("vm-{}-{}-{}.{}", vmid, part, number, format);
            return Some(match dest_path.rsplit_once('/') {
                Some((dir, _)) => format!("{}/{}", dir, new_name),
                None => new_name,
            });
        }
    }
    None
}

// =============================================================================
// 测试
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(name: &str, kind: &str, path: Option<&str>) -> StorageInfo {
        StorageInfo {
            storage: name.to_string(),
            kind: kind.to_string(),
            path: path.map(|p| p.to_string()),
            content: None,
            shared: None,
            active: None,
        }
    }

    #[test]
    fn test_default_location() {
        let loc = default_location(104, "vm-100-disk-0.qcow2");
        assert_eq!(loc.dir, "/var/lib/vz/images/104");
        assert_eq!(loc.path, "/var/lib/vz/images/104/vm-100-disk-0.qcow2.raw");
    }

    #[test]
    fn test_resolve_without_storage_info() {
        let loc = resolve_location(None, 104, "vm-100-disk-0.qcow2");
        assert_eq!(loc, default_location(104, "vm-100-disk-0.qcow2"));
    }

    #[test]
    fn test_resolve_dir_storage_with_default_path() {
        let info = storage("local", "dir", Some("/var/lib/vz"));
        let loc = resolve_location(Some(&info), 104, "vm-100-disk-0.qcow2");
        assert_eq!(loc.dir, "/mnt/pve/local/images/104");
        assert_eq!(loc.path, "/mnt/pve/local/images/104/vm-100-disk-0.qcow2.raw");

        // 未配置路径时同样按挂载点处理
        let info = storage("local", "dir", None);
        assert_eq!(
            resolve_location(Some(&info), 104, "d.qcow2").dir,
            "/mnt/pve/local/images/104"
        );
    }

    #[test]
    fn test_resolve_dir_storage_with_explicit_path() {
        let info = storage("fast", "dir", Some("/data/fast"));
        let loc = resolve_location(Some(&info), 104, "vm-100-disk-0.qcow2");
        assert_eq!(loc.dir, "/data/fast/images/104");
        assert_eq!(loc.path, "/data/fast/images/104/vm-100-disk-0.qcow2.raw");
    }

    #[test]
    fn test_resolve_mounted_storage() {
        let info = storage("backup-nfs", "nfs", None);
        let loc = resolve_location(Some(&info), 104, "vm-100-disk-1.raw");
        assert_eq!(loc.dir, "/mnt/pve/backup-nfs/images/104");
        assert_eq!(loc.path, "/mnt/pve/backup-nfs/images/104/vm-100-disk-1.raw.raw");
    }

    #[test]
    fn test_resolve_block_storage_falls_back_to_default() {
        let info = storage("local-lvm", "lvmthin", None);
        let loc = resolve_location(Some(&info), 104, "vm-100-disk-1");
        assert_eq!(loc, default_location(104, "vm-100-disk-1"));
    }

    #[test]
    fn test_rename_target_strips_extensions() {
        // 上传文件名带 .qcow2.raw 双重扩展，重命名成创建时的真实格式
        assert_eq!(
            rename_target("/var/lib/vz/images/104/vm-100-disk-0.qcow2.raw", 104, "qcow2"),
            Some("/var/lib/vz/images/104/vm-104-disk-0.qcow2".to_string())
        );
        assert_eq!(
            rename_target("/mnt/pve/gv0/images/104/vm-100-disk-1.raw", 104, "raw"),
            Some("/mnt/pve/gv0/images/104/vm-104-disk-1.raw".to_string())
        );
    }

    #[test]
    fn test_rename_target_unparseable() {
        assert_eq!(rename_target("/var/lib/vz/images/104/base.raw", 104, "qcow2"), None);
        assert_eq!(rename_target("/var/lib/vz/images/104/vm-100-disk-", 104, "qcow2"), None);
    }
}
