use crate::core::{AudioClock, PlayerError, Result, SampleFormat, StreamInfo, StreamPacket};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, Stream, StreamConfig};
use crossbeam::queue::SegQueue;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 平台音频设备句柄
pub trait OutputDevice {
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
}

/// 基于 cpal 的输出设备
pub struct CpalDevice {
    stream: Stream,
}

impl CpalDevice {
    /// 打开默认输出设备
    ///
    /// 优先请求 `min_audio_samples_per_payload` 大小的缓冲，设备不接受时使用默认缓冲，
    /// 再不行退回 f32 采样格式。打开后处于暂停状态。
    pub fn open(info: &StreamInfo, buffer: Arc<SegQueue<i16>>, clock: AudioClock) -> Result<Self> {
        info!(
            "初始化音频输出: {} Hz, {} 声道, 请求缓冲 {} 采样",
            info.audio_sample_rate, info.audio_channels, info.min_audio_samples_per_payload
        );

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioDeviceError("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        let fixed = StreamConfig {
            channels: info.audio_channels,
            sample_rate: cpal::SampleRate(info.audio_sample_rate),
            buffer_size: cpal::BufferSize::Fixed(info.min_audio_samples_per_payload),
        };
        let flexible = StreamConfig {
            buffer_size: cpal::BufferSize::Default,
            ..fixed.clone()
        };

        let stream = build_stream::<i16>(&device, &fixed, &buffer, &clock)
            .or_else(|e| {
                warn!("⚠️ 设备不接受固定缓冲大小 ({}), 改用默认缓冲", e);
                build_stream::<i16>(&device, &flexible, &buffer, &clock)
            })
            .or_else(|e| {
                warn!("⚠️ 设备不支持 i16 输出 ({}), 改用 f32", e);
                build_stream::<f32>(&device, &flexible, &buffer, &clock)
            })
            .map_err(|e| PlayerError::AudioDeviceError(format!("创建音频流失败: {}", e)))?;

        if let Err(e) = stream.pause() {
            warn!("⚠️ 新建音频流无法暂停: {}", e);
        }

        info!("✓ 音频设备已打开");
        Ok(Self { stream })
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    buffer: &Arc<SegQueue<i16>>,
    clock: &AudioClock,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<i16> + Send + 'static,
{
    let buffer = buffer.clone();
    let clock = clock.clone();
    let logged = AtomicBool::new(false);

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if !logged.swap(true, Ordering::Relaxed) {
                info!("🔊 音频设备实际回调缓冲: {} 采样", data.len());
            }
            fill_output(&buffer, &clock, data);
        },
        move |err| {
            warn!("音频流错误: {}", err);
        },
        None,
    )
}

/// 设备回调：从队列取采样写入输出，不足部分填静音
///
/// 返回欠载（填静音）的采样数。
pub(crate) fn fill_output<T>(buffer: &SegQueue<i16>, clock: &AudioClock, out: &mut [T]) -> usize
where
    T: Sample + FromSample<i16>,
{
    let mut consumed = 0;
    for sample in out.iter_mut() {
        *sample = match buffer.pop() {
            Some(value) => {
                consumed += 1;
                T::from_sample(value)
            }
            None => T::EQUILIBRIUM,
        };
    }
    clock.on_consumed(consumed);
    out.len() - consumed
}

impl OutputDevice for CpalDevice {
    fn play(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| PlayerError::AudioDeviceError(format!("启动音频流失败: {}", e)))
    }

    fn pause(&mut self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| PlayerError::AudioDeviceError(format!("暂停音频流失败: {}", e)))
    }
}

/// 音频输出 - 每个会话一个设备，暂停/恢复不重建设备
pub struct AudioSink {
    device: Option<Box<dyn OutputDevice>>,
    buffer: Arc<SegQueue<i16>>,
    clock: AudioClock,
    samples_per_second: u64,
    format: SampleFormat,
    paused: bool,
}

impl AudioSink {
    pub fn open(info: &StreamInfo, clock: AudioClock) -> Result<Self> {
        let buffer = Arc::new(SegQueue::new());
        let device = CpalDevice::open(info, buffer.clone(), clock.clone())?;
        Ok(Self::with_parts(Box::new(device), buffer, clock, info))
    }

    /// 使用已打开的设备（设备需要自己从 `buffer` 取数据）
    pub fn with_parts(
        device: Box<dyn OutputDevice>,
        buffer: Arc<SegQueue<i16>>,
        clock: AudioClock,
        info: &StreamInfo,
    ) -> Self {
        Self {
            device: Some(device),
            buffer,
            clock,
            samples_per_second: info.audio_samples_per_second(),
            format: info.audio_format,
            paused: true,
        }
    }

    /// 音频泵使用的写端
    pub fn feeder(&self, max_latency_ms: u64) -> AudioFeeder {
        let max_samples = (self.samples_per_second * max_latency_ms / 1000).max(1) as usize;
        AudioFeeder {
            buffer: self.buffer.clone(),
            clock: self.clock.clone(),
            format: self.format,
            max_samples,
            pending: Vec::new(),
        }
    }

    /// 暂停输出，重复调用无副作用
    pub fn pause(&mut self) -> Result<()> {
        if self.paused {
            return Ok(());
        }
        if let Some(device) = self.device.as_mut() {
            device.pause()?;
            info!("⏸ 音频已暂停");
        }
        self.paused = true;
        Ok(())
    }

    /// 恢复输出，重复调用无副作用
    pub fn resume(&mut self) -> Result<()> {
        if !self.paused {
            return Ok(());
        }
        if let Some(device) = self.device.as_mut() {
            device.play()?;
            info!("▶ 音频已恢复");
        }
        self.paused = false;
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }

    /// 先暂停再关闭设备
    pub fn close(&mut self) {
        let Some(mut device) = self.device.take() else {
            return;
        };

        if !self.paused {
            if let Err(e) = device.pause() {
                warn!("关闭前暂停音频失败: {}", e);
            }
            self.paused = true;
        }
        drop(device);

        while self.buffer.pop().is_some() {}
        self.clock.reset();
        info!("🧹 音频设备已关闭");
    }
}

impl Drop for AudioSink {
    fn drop(&mut self) {
        self.close();
    }
}

/// 音频泵写入端
#[derive(Clone)]
pub struct AudioFeeder {
    buffer: Arc<SegQueue<i16>>,
    clock: AudioClock,
    format: SampleFormat,
    max_samples: usize,
    /// 上一个数据块末尾不足一个采样的字节
    pending: Vec<u8>,
}

impl AudioFeeder {
    /// 写入一个小端交错 PCM 数据块，按流参数里的采样格式解码
    ///
    /// 不足一个采样的尾部字节留到下一块拼接。队列超过最大延迟时丢弃最旧的采样。
    pub fn push_chunk(&mut self, chunk: &StreamPacket) {
        let width = self.format.bytes_per_sample();
        self.pending.extend_from_slice(&chunk.data);
        let whole = self.pending.len() - self.pending.len() % width;

        let mut samples = 0;
        for bytes in self.pending[..whole].chunks_exact(width) {
            self.buffer.push(decode_sample(self.format, bytes));
            samples += 1;
        }
        self.pending.drain(..whole);
        if !self.pending.is_empty() {
            debug!("PCM 数据块未按采样对齐，{} 字节并入下一块", self.pending.len());
        }
        self.clock.on_queued(chunk.timestamp_us, samples);

        let mut dropped = 0;
        while self.buffer.len() > self.max_samples {
            if self.buffer.pop().is_none() {
                break;
            }
            dropped += 1;
        }
        if dropped > 0 {
            self.clock.on_consumed(dropped);
            warn!("⚠️ 音频缓冲超过最大延迟，丢弃 {} 个最旧采样", dropped);
        }
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }
}

/// 把一个小端采样转成输出队列使用的 i16
fn decode_sample(format: SampleFormat, bytes: &[u8]) -> i16 {
    match format {
        SampleFormat::I16 => i16::from_le_bytes([bytes[0], bytes[1]]),
        SampleFormat::F32 => {
            let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            i16::from_sample(value.clamp(-1.0, 1.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::testing::*;

    fn sink(handles: &Handles) -> (AudioSink, AudioClock) {
        let info = stream_info();
        let clock = AudioClock::new(info.audio_samples_per_second());
        let sink = AudioSink::with_parts(
            Box::new(MockDevice::new(handles)),
            Arc::new(SegQueue::new()),
            clock.clone(),
            &info,
        );
        (sink, clock)
    }

    fn pcm(timestamp_us: i64, samples: &[i16]) -> StreamPacket {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        StreamPacket::new(timestamp_us, data)
    }

    #[test]
    fn test_pause_is_idempotent() {
        let handles = Handles::default();
        let (mut sink, _) = sink(&handles);

        sink.resume().unwrap();
        sink.pause().unwrap();
        sink.pause().unwrap();
        assert!(sink.is_paused());
        assert_eq!(handles.count("audio_pause"), 1);
    }

    #[test]
    fn test_resume_reuses_device() {
        let handles = Handles::default();
        let (mut sink, _) = sink(&handles);

        sink.resume().unwrap();
        sink.pause().unwrap();
        sink.resume().unwrap();
        sink.resume().unwrap();

        assert!(!sink.is_paused());
        assert!(sink.is_open());
        assert_eq!(handles.count("audio_open"), 1);
        assert_eq!(handles.count("audio_play"), 2);
    }

    #[test]
    fn test_close_pauses_before_release() {
        let handles = Handles::default();
        let (mut sink, _) = sink(&handles);
        sink.resume().unwrap();

        sink.close();
        sink.close();
        assert!(!sink.is_open());
        assert_eq!(handles.events(), vec!["audio_pause", "audio"]);
        assert_eq!(handles.live(), 0);

        // 关闭后的暂停/恢复不再触碰设备
        sink.resume().unwrap();
        assert_eq!(handles.count("audio_play"), 1);
    }

    #[test]
    fn test_feeder_decodes_le_samples_and_advances_clock() {
        let handles = Handles::default();
        let (sink, clock) = sink(&handles);
        let mut feeder = sink.feeder(1000);

        feeder.push_chunk(&pcm(0, &[1, -2, 300, -400]));
        assert_eq!(sink.buffered_samples(), 4);
        assert_eq!(clock.queued_samples(), 4);

        let mut out = [0i16; 6];
        let underrun = fill_output(&sink.buffer, &clock, &mut out);
        assert_eq!(out, [1, -2, 300, -400, 0, 0]);
        assert_eq!(underrun, 2);
        assert_eq!(clock.queued_samples(), 0);
    }

    #[test]
    fn test_feeder_trims_oldest_beyond_latency() {
        let handles = Handles::default();
        let (sink, clock) = sink(&handles);
        // stream_info: 1000 Hz × 2 声道 → 10ms = 20 个采样
        let mut feeder = sink.feeder(10);

        let samples: Vec<i16> = (0..30).collect();
        feeder.push_chunk(&pcm(0, &samples));

        assert_eq!(sink.buffered_samples(), 20);
        assert_eq!(clock.queued_samples(), 20);
        assert_eq!(sink.buffer.pop(), Some(10));
    }

    #[test]
    fn test_odd_chunk_carries_trailing_byte() {
        let handles = Handles::default();
        let (sink, clock) = sink(&handles);
        let mut feeder = sink.feeder(1000);

        // 1000 = 0x03E8, -2 = 0xFFFE，第一个采样跨两个数据块
        feeder.push_chunk(&StreamPacket::new(0, vec![0xE8]));
        assert_eq!(sink.buffered_samples(), 0);
        assert_eq!(feeder.pending_bytes(), 1);

        feeder.push_chunk(&StreamPacket::new(0, vec![0x03, 0xFE, 0xFF]));
        assert_eq!(feeder.pending_bytes(), 0);
        assert_eq!(clock.queued_samples(), 2);
        assert_eq!(sink.buffer.pop(), Some(1000));
        assert_eq!(sink.buffer.pop(), Some(-2));
    }

    #[test]
    fn test_float_input_follows_stream_format() {
        let handles = Handles::default();
        let info = StreamInfo {
            audio_format: SampleFormat::F32,
            ..stream_info()
        };
        let sink = AudioSink::with_parts(
            Box::new(MockDevice::new(&handles)),
            Arc::new(SegQueue::new()),
            AudioClock::new(info.audio_samples_per_second()),
            &info,
        );
        let mut feeder = sink.feeder(1000);

        let data = [0.5f32, -1.0, 0.0]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        feeder.push_chunk(&StreamPacket::new(0, data));

        assert_eq!(sink.buffered_samples(), 3);
        assert_eq!(sink.buffer.pop(), Some(16384));
        assert_eq!(sink.buffer.pop(), Some(i16::MIN));
        assert_eq!(sink.buffer.pop(), Some(0));
    }

    #[test]
    fn test_float_output_conversion() {
        let buffer = SegQueue::new();
        buffer.push(i16::MIN);
        let clock = AudioClock::new(1000);
        let mut out = [1.0f32; 2];
        fill_output(&buffer, &clock, &mut out);
        assert_eq!(out, [-1.0, 0.0]);
    }
}
