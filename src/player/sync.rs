use crate::core::{AudioClock, SyncOptions};
use log::{debug, warn};
use parking_lot::Mutex;

/// 同步统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub presented: u64,
    pub skipped: u64,
    pub consecutive_skips: u32,
    pub last_presented_us: Option<i64>,
}

/// 音视频同步器 - 以音频时钟为准，只在视频侧跳帧
pub struct StreamSynchronizer {
    clock: AudioClock,
    options: SyncOptions,
    state: Mutex<SyncStats>,
}

impl StreamSynchronizer {
    pub fn new(clock: AudioClock, options: SyncOptions) -> Self {
        Self {
            clock,
            options,
            state: Mutex::new(SyncStats::default()),
        }
    }

    /// 视频时间戳相对音频位置的偏差（微秒），正值表示视频超前
    pub fn drift_us(&self, pts: Option<i64>) -> Option<i64> {
        Some(pts? - self.clock.position_us()?)
    }

    /// 决定一帧是否显示
    ///
    /// 没有时间戳、尚未收到音频或同步关闭时总是显示。
    pub fn should_present(&self, pts: Option<i64>) -> bool {
        let mut state = self.state.lock();

        let out_of_window = self.options.enabled
            && self
                .drift_us(pts)
                .is_some_and(|drift| drift.unsigned_abs() > self.options.tolerance_ms * 1000);

        if out_of_window && state.consecutive_skips < self.options.max_consecutive_skips {
            state.consecutive_skips += 1;
            state.skipped += 1;
            debug!(
                "⏭ 跳过视频帧 (pts: {:?}, 偏差: {:?}us)",
                pts,
                self.drift_us(pts)
            );
            return false;
        }

        if out_of_window {
            warn!(
                "⚠️ 连续跳过 {} 帧后仍未同步，强制显示 (pts: {:?})",
                state.consecutive_skips, pts
            );
        }

        state.consecutive_skips = 0;
        state.presented += 1;
        if pts.is_some() {
            state.last_presented_us = pts;
        }
        true
    }

    pub fn stats(&self) -> SyncStats {
        *self.state.lock()
    }

    pub fn clock(&self) -> &AudioClock {
        &self.clock
    }
}
