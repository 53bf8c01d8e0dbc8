//! 传输速度、剩余时间与容量的展示格式化

/// 把 MB/s 速度格式化为带单位的字符串
///
/// 1000 MB/s 以上按 GB/s 展示，1 MB/s 以下换算为 KB/s。
pub fn format_speed(speed_mbps: f64) -> String {
    if speed_mbps >= 1000.0 {
        format!("{:.1} GB/s", speed_mbps / 1000.0)
    } else if speed_mbps >= 1.0 {
        format!("{:.1} MB/s", speed_mbps)
    } else {
        format!("{:.0} KB/s", speed_mbps * 1024.0)
    }
}

/// 估算剩余传输时间
///
/// 速度为零或已传完时返回空串，调用方据此隐藏 ETA 显示。
pub fn format_eta(transferred: u64, total_size: u64, speed_mbps: f64) -> String {
    if speed_mbps <= 0.0 || transferred >= total_size {
        return String::new();
    }
    let remaining_mb = (total_size - transferred) as f64 / (1024.0 * 1024.0);
    let eta_seconds = remaining_mb / speed_mbps;
    if eta_seconds > 3600.0 {
        let secs = eta_seconds as u64;
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if eta_seconds > 60.0 {
        let secs = eta_seconds as u64;
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", eta_seconds as u64)
    }
}

/// 把字节数格式化为人类可读的容量
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} PB", size)
}

// =============================================================================
// 测试
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(0.5), "512 KB/s");
        assert_eq!(format_speed(2.0), "2.0 MB/s");
        assert_eq!(format_speed(125.3), "125.3 MB/s");
        assert_eq!(format_speed(1500.0), "1.5 GB/s");
    }

    #[test]
    fn test_format_eta_seconds() {
        // 剩余 300 MB，速度 10 MB/s => 30 秒
        assert_eq!(format_eta(0, 300 * MB, 10.0), "30s");
    }

    #[test]
    fn test_format_eta_minutes() {
        // 剩余 1250 MB，速度 10 MB/s => 125 秒
        assert_eq!(format_eta(0, 1250 * MB, 10.0), "2m 5s");
    }

    #[test]
    fn test_format_eta_hours() {
        // 剩余 4000 MB，速度 1 MB/s => 4000 秒
        assert_eq!(format_eta(0, 4000 * MB, 1.0), "1h 6m");
    }

    #[test]
    fn test_format_eta_hidden() {
        assert_eq!(format_eta(0, 100 * MB, 0.0), "");
        assert_eq!(format_eta(100 * MB, 100 * MB, 5.0), "");
        assert_eq!(format_eta(200 * MB, 100 * MB, 5.0), "");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512.0 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * MB), "5.0 MB");
        assert_eq!(format_size(32 * 1024 * MB), "32.0 GB");
        assert_eq!(format_size(2 * 1024 * 1024 * MB), "2.0 TB");
    }
}
