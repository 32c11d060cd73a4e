use parking_lot::Mutex;
use std::sync::Arc;

/// 音频时钟 - 音画同步的主时钟
///
/// 由音频泵在入队时推进"已写入末尾"，由设备回调在消费时减少排队采样数。
/// 当前播放位置 = 已写入末尾时间戳 - 仍在排队的采样时长。
#[derive(Clone)]
pub struct AudioClock {
    inner: Arc<Mutex<ClockInner>>,
}

struct ClockInner {
    queued_end_us: Option<i64>, // 最近入队数据块的结束时间戳（微秒）
    queued_samples: u64,        // 尚未被设备消费的交错采样数
    samples_per_second: u64,    // 采样率 × 声道数
}

impl AudioClock {
    pub fn new(samples_per_second: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                queued_end_us: None,
                queued_samples: 0,
                samples_per_second: samples_per_second.max(1),
            })),
        }
    }

    /// 一个 PCM 数据块入队
    pub fn on_queued(&self, timestamp_us: i64, samples: usize) {
        let mut inner = self.inner.lock();
        let duration = inner.duration_us(samples as u64);
        inner.queued_end_us = Some(timestamp_us + duration);
        inner.queued_samples += samples as u64;
    }

    /// 设备消费（或丢弃）了若干采样
    pub fn on_consumed(&self, samples: usize) {
        let mut inner = self.inner.lock();
        inner.queued_samples = inner.queued_samples.saturating_sub(samples as u64);
    }

    /// 当前播放位置（微秒），尚未收到音频时为 `None`
    pub fn position_us(&self) -> Option<i64> {
        let inner = self.inner.lock();
        inner
            .queued_end_us
            .map(|end| end - inner.duration_us(inner.queued_samples))
    }

    /// 仍在排队的采样数
    pub fn queued_samples(&self) -> u64 {
        self.inner.lock().queued_samples
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.queued_end_us = None;
        inner.queued_samples = 0;
    }
}

impl ClockInner {
    fn duration_us(&self, samples: u64) -> i64 {
        (samples * 1_000_000 / self.samples_per_second) as i64
    }
}
