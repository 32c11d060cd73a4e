use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::error::{PlayerError, Result};
use super::types::{PixelFormat, SampleFormat};

/// 流参数（由外部应用提供的常量，会话内固定不变）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub video_width: u32,
    pub video_height: u32,
    /// 渲染端期望的解码输出格式
    pub target_format: PixelFormat,
    pub audio_channels: u16,
    pub audio_sample_rate: u32,
    pub audio_format: SampleFormat,
    /// 每个音频负载的最小采样数（向音频设备请求的基准缓冲大小）
    pub min_audio_samples_per_payload: u32,
}

impl StreamInfo {
    /// 色度平面行数（YUV420：高度减半向上取整）
    pub fn chroma_height(&self) -> u32 {
        self.video_height.div_ceil(2)
    }

    /// 每秒的交错采样数（所有声道）
    pub fn audio_samples_per_second(&self) -> u64 {
        self.audio_sample_rate as u64 * self.audio_channels as u64
    }

    /// 会话开始前检查参数
    ///
    /// 纹理只接受 YUV420P 三平面，其它目标格式在这里直接拒绝。
    pub fn validate(&self) -> Result<()> {
        if self.video_width == 0 || self.video_height == 0 {
            return Err(config_error(format!(
                "无效的视频分辨率: {}x{}",
                self.video_width, self.video_height
            )));
        }
        if self.target_format != PixelFormat::YUV420P {
            return Err(config_error(format!(
                "不支持的目标像素格式 {:?}，渲染端只接受 YUV420P",
                self.target_format
            )));
        }
        if self.audio_channels == 0 || self.audio_sample_rate == 0 {
            return Err(config_error(format!(
                "无效的音频参数: {} 声道, {} Hz",
                self.audio_channels, self.audio_sample_rate
            )));
        }
        Ok(())
    }
}

fn config_error(message: String) -> PlayerError {
    PlayerError::Config(anyhow::anyhow!(message))
}

impl Default for StreamInfo {
    fn default() -> Self {
        Self {
            video_width: 1280,
            video_height: 720,
            target_format: PixelFormat::YUV420P,
            audio_channels: 2,
            audio_sample_rate: 48000,
            audio_format: SampleFormat::I16,
            min_audio_samples_per_payload: 1024,
        }
    }
}

/// 音视频同步参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    pub enabled: bool,
    /// 视频相对音频时钟允许的偏差（毫秒）
    pub tolerance_ms: u64,
    /// 连续跳帧上限，超过后强制显示下一帧，避免画面冻结
    pub max_consecutive_skips: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            tolerance_ms: 100,
            max_consecutive_skips: 30,
        }
    }
}

/// 播放器选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerOptions {
    /// 指定的解码器名称（如 "h264_cuvid"），找不到时按优先级回退
    pub decoder_name: Option<String>,
    pub hardware_acceleration: bool,
    pub sync: SyncOptions,
    /// 音频缓冲允许的最大延迟（毫秒），超出时丢弃最旧的采样
    pub max_audio_latency_ms: u64,
    /// 泵线程等待数据的轮询间隔（毫秒），决定取消信号的响应速度
    pub pump_poll_interval_ms: u64,
    /// H.264 带外 SPS/PPS（Annex B），中途加入直播流时解码器需要它
    pub h264_extradata: Option<Vec<u8>>,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            decoder_name: None,
            hardware_acceleration: cfg!(feature = "hwaccel"),
            sync: SyncOptions::default(),
            max_audio_latency_ms: 1000,
            pump_poll_interval_ms: 20,
            h264_extradata: None,
        }
    }
}

impl PlayerOptions {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("解析播放器选项失败")
    }

    /// 从 JSON 文件加载选项
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.pump_poll_interval_ms.max(1))
    }
}
