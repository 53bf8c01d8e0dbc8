//! 传输进度采样节流
//!
//! 传输回调每写完一块就触发一次，直接上报会刷爆状态锁和活动日志。
//! 采样器把回调压到固定间隔，速度按开始以来的平均值折算成 MB/s。

use std::time::{Duration, Instant};

/// 一次节流后的进度采样
#[derive(Debug, Clone, Copy)]
pub(crate) struct TransferSample {
    pub progress: f64,
    pub transferred: u64,
    pub total: u64,
    pub speed_mbps: f64,
}

/// 按最小间隔放行的采样器
pub(crate) struct ThrottledReporter {
    started: Instant,
    last_emit: Option<Instant>,
    interval: Duration,
}

impl ThrottledReporter {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            started: Instant::now(),
            last_emit: None,
            interval,
        }
    }

    /// 距上次放行不足间隔时返回 None，否则计算速度与百分比
    pub(crate) fn sample(&mut self, transferred: u64, total: u64) -> Option<TransferSample> {
        let now = Instant::now();
        if let Some(last) = self.last_emit {
            if now.duration_since(last) < self.interval {
                return None;
            }
        }
        let elapsed = now.duration_since(self.started).as_secs_f64();
        let speed_mbps = if elapsed > 0.0 {
            transferred as f64 / elapsed / (1024.0 * 1024.0)
        } else {
            0.0
        };
        let progress = if total > 0 {
            transferred as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        self.last_emit = Some(now);
        Some(TransferSample {
            progress,
            transferred,
            total,
            speed_mbps,
        })
    }
}

// =============================================================================
// 测试
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_passes_immediately() {
        let mut reporter = ThrottledReporter::new(Duration::from_millis(500));
        let sample = reporter.sample(1024, 4096).unwrap();
        assert_eq!(sample.transferred, 1024);
        assert_eq!(sample.progress, 25.0);
    }

    #[test]
    fn test_back_to_back_samples_throttled() {
        let mut reporter = ThrottledReporter::new(Duration::from_secs(3600));
        assert!(reporter.sample(1, 10).is_some());
        assert!(reporter.sample(2, 10).is_none());
        assert!(reporter.sample(3, 10).is_none());
    }

    #[test]
    fn test_zero_interval_always_emits() {
        let mut reporter = ThrottledReporter::new(Duration::ZERO);
        assert!(reporter.sample(1, 10).is_some());
        assert!(reporter.sample(2, 10).is_some());
    }

    #[test]
    fn test_zero_total_gives_zero_progress() {
        let mut reporter = ThrottledReporter::new(Duration::ZERO);
        let sample = reporter.sample(100, 0);
        assert_eq!(sample.map(|s| s.progress), Some(0.0));
    }

    #[test]
    fn test_speed_is_average_since_start() {
        let mut reporter = ThrottledReporter::new(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(20));
        let sample = reporter.sample(10 * 1024 * 1024, 100 * 1024 * 1024);
        // 20ms 传了 10MB，平均速度必然为正且远超 10MB/s
        assert!(sample.map(|s| s.speed_mbps).unwrap_or(0.0) > 10.0);
    }
}
