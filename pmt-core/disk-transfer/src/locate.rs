//! 源磁盘定位
//!
//! 文件类存储按固定候选路径表逐个探测，探测不中再用 find 命令做
//! 精确名和通配名两轮兜底搜索。块设备类存储直接 find 后确认设备类型。
//! 这里只负责生成候选路径和挑选搜索输出，远程探测在服务层执行。

/// 文件类存储的候选基准目录
///
/// `dir` 类存储的数据通常在 `/var/lib/vz` 下，网络挂载类固定挂在
/// `/mnt/pve/<存储名>`。未知类型按 `dir` 的约定尝试。
pub(crate) fn search_bases(storage_type: &str, storage_name: &str) -> Vec<String> {
    match storage_type {
        "glusterfs" | "nfs" | "cifs" => {
            vec![format!("/mnt/pve/{}", storage_name), "/var/lib/vz".to_string()]
        }
        _ => vec!["/var/lib/vz/images".to_string(), "/var/lib/vz".to_string()],
    }
}

/// 单个基准目录下的候选路径，按命中概率排序
///
/// `disk_path` 是配置里的原始卷路径（可能带目录），`file_name` 是纯文件名，
/// `vmid` 用源端的编号。磁盘文件可能不带扩展名，追加 `.qcow2`/`.raw` 再试。
pub(crate) fn candidate_paths(
    base: &str,
    vmid: u32,
    disk_path: &str,
    file_name: &str,
) -> Vec<String> {
    vec![
        format!("{}/images/{}", base, disk_path),
        format!("{}/{}", base, disk_path),
        format!("{}/images/{}/{}", base, vmid, file_name),
        format!("{}/{}/{}", base, vmid, file_name),
        format!("{}/{}", base, file_name),
        format!("{}/images/{}.qcow2", base, disk_path),
        format!("{}/images/{}.raw", base, disk_path),
        format!("{}/images/{}/{}.qcow2", base, vmid, file_name),
        format!("{}/images/{}/{}.raw", base, vmid, file_name),
        format!("{}/{}/{}.qcow2", base, vmid, file_name),
        format!("{}/{}/{}.raw", base, vmid, file_name),
    ]
}

/// find 精确名搜索的输出里取第一个非空行
pub(crate) fn first_find_match(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|line| !line.is_empty())
}

/// find 通配搜索的输出里取第一个包含目标文件名的行
pub(crate) fn first_substring_match<'a>(output: &'a str, file_name: &str) -> Option<&'a str> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && line.contains(file_name))
}

/// 块设备搜索输出里取第一个像磁盘卷的条目
pub(crate) fn first_block_candidate(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && (line.contains("disk") || line.contains("vm-")))
}

/// 路径的最后一段
pub(crate) fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// 把卷名清洗成可用作临时文件名的形式
pub(crate) fn sanitize_temp_component(name: &str) -> String {
    name.replace(['/', '\\', ':'], "-")
}

// =============================================================================
// 测试
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_bases_by_storage_type() {
        assert_eq!(search_bases("dir", "local"), vec!["/var/lib/vz/images", "/var/lib/vz"]);
        assert_eq!(
            search_bases("nfs", "backup-nfs"),
            vec!["/mnt/pve/backup-nfs", "/var/lib/vz"]
        );
        assert_eq!(
            search_bases("glusterfs", "gv0"),
            vec!["/mnt/pve/gv0", "/var/lib/vz"]
        );
        // 未知类型按 dir 处理
        assert_eq!(search_bases("weird", "x"), vec!["/var/lib/vz/images", "/var/lib/vz"]);
    }

    #[test]
    fn test_candidate_paths_order() {
        let paths = candidate_paths("/var/lib/vz", 100, "100/vm-100-disk-0.qcow2", "vm-100-disk-0.qcow2");
        assert_eq!(paths.len(), 11);
        assert_eq!(paths[0], "/var/lib/vz/images/100/vm-100-disk-0.qcow2");
        assert_eq!(paths[1], "/var/lib/vz/100/vm-100-disk-0.qcow2");
        assert_eq!(paths[2], "/var/lib/vz/images/100/vm-100-disk-0.qcow2");
        assert_eq!(paths[4], "/var/lib/vz/vm-100-disk-0.qcow2");
        // 无扩展名的兜底变体排在后面
        assert_eq!(paths[5], "/var/lib/vz/images/100/vm-100-disk-0.qcow2.qcow2");
        assert_eq!(paths[10], "/var/lib/vz/100/vm-100-disk-0.qcow2.raw");
    }

    #[test]
    fn test_candidate_paths_use_source_vmid() {
        // 改号迁移时候选路径必须用源端编号，目标编号在源端不存在
        let paths = candidate_paths("/mnt/pve/gv0", 100, "100/vm-100-disk-1.raw", "vm-100-disk-1.raw");
        assert!(paths.iter().all(|p| !p.contains("/104/")));
        assert_eq!(paths[3], "/mnt/pve/gv0/100/vm-100-disk-1.raw");
    }

    #[test]
    fn test_first_find_match() {
        let output = "\n/var/lib/vz/images/100/vm-100-disk-0.qcow2\n/mnt/pve/gv0/other.qcow2\n";
        assert_eq!(
            first_find_match(output),
            Some("/var/lib/vz/images/100/vm-100-disk-0.qcow2")
        );
        assert_eq!(first_find_match("  \n "), None);
        assert_eq!(first_find_match(""), None);
    }

    #[test]
    fn test_first_substring_match_filters_by_name() {
        let output = "/var/lib/vz/backup/vzdump-qemu.vma\n/var/lib/vz/images/100/vm-100-disk-0.qcow2";
        assert_eq!(
            first_substring_match(output, "vm-100-disk-0.qcow2"),
            Some("/var/lib/vz/images/100/vm-100-disk-0.qcow2")
        );
        assert_eq!(first_substring_match(output, "vm-200-disk-0"), None);
    }

    #[test]
    fn test_first_block_candidate() {
        let output = "/dev/pve/root\n/dev/pve/vm-100-disk-1\n";
        assert_eq!(first_block_candidate(output), Some("/dev/pve/vm-100-disk-1"));
        // 既不含 disk 也不含 vm- 的行全部跳过
        assert_eq!(first_block_candidate("/dev/pve/root\n/dev/pve/swap"), None);
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("/var/lib/vz/images/100/vm-100-disk-0.qcow2"), "vm-100-disk-0.qcow2");
        assert_eq!(base_name("vm-100-disk-1"), "vm-100-disk-1");
    }

    #[test]
    fn test_sanitize_temp_component() {
        assert_eq!(sanitize_temp_component("vm-100-disk-1"), "vm-100-disk-1");
        assert_eq!(sanitize_temp_component("pve/vm-100-disk-1"), "pve-vm-100-disk-1");
        assert_eq!(sanitize_temp_component(r"a\b:c"), "a-b-c");
    }
}
