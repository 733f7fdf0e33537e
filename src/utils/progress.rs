use std::time::{Duration, Instant};

/// 样本：某时刻的累计字节数
#[derive(Clone, Copy, Debug)]
struct SpeedSample {
    bytes_total: u64,
    timestamp: Instant,
}

/// 速度计算器（环形缓冲区，持有者单线程使用）
pub struct SpeedCalculator {
    samples: Vec<SpeedSample>,
    write_index: usize,
    sample_count: usize,
    max_samples: usize,
    start_time: Instant,
}

impl SpeedCalculator {
    pub fn new() -> Self {
        let max_samples = 20;
        Self {
            samples: Vec::with_capacity(max_samples),
            write_index: 0,
            sample_count: 0,
            max_samples,
            start_time: Instant::now(),
        }
    }

    /// 记录当前累计字节数
    pub fn add_sample(&mut self, bytes_total: u64) {
        let sample = SpeedSample {
            bytes_total,
            timestamp: Instant::now(),
        };

        if self.samples.len() < self.max_samples {
            self.samples.push(sample);
        } else {
            // 缓冲区满后覆盖最老的样本
            self.samples[self.write_index] = sample;
        }

        self.write_index = (self.write_index + 1) % self.max_samples;
        self.sample_count = self.sample_count.saturating_add(1).min(self.max_samples);
    }

    /// 滑动窗口瞬时速度（字节/秒）
    pub fn instant_speed(&self) -> f64 {
        if self.sample_count < 2 {
            return 0.0;
        }

        let window_size = (self.sample_count / 3).max(2).min(8);
        let len = self.samples.len();

        let newest_idx = (self.write_index + len - 1) % len;
        let oldest_idx = (self.write_index + len - window_size.min(len)) % len;

        let newest = &self.samples[newest_idx];
        let oldest = &self.samples[oldest_idx];

        if newest.timestamp <= oldest.timestamp || newest.bytes_total < oldest.bytes_total {
            return 0.0;
        }

        let bytes_diff = newest.bytes_total - oldest.bytes_total;
        let time_diff = newest.timestamp.duration_since(oldest.timestamp).as_secs_f64();

        if time_diff > 0.0 {
            bytes_diff as f64 / time_diff
        } else {
            0.0
        }
    }

    /// 全程平均速度
    pub fn average_speed(&self, bytes_total: u64) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            bytes_total as f64 / elapsed
        } else {
            0.0
        }
    }

    /// 估算剩余时间 = remaining / speed
    pub fn estimate_eta(&self, remaining_bytes: u64) -> Option<Duration> {
        if remaining_bytes == 0 {
            return Some(Duration::from_secs(0));
        }

        let speed = self.instant_speed();
        if speed > 0.0 {
            Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
        } else {
            None
        }
    }
}

/// 格式化字节数
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const UNIT_SIZE: f64 = 1024.0;

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= UNIT_SIZE && unit_index < UNITS.len() - 1 {
        size /= UNIT_SIZE;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// 格式化速度
pub fn format_speed(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_second as u64))
}

/// 格式化持续时间
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
