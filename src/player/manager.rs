use crate::core::{AudioClock, PlayerError, PlayerOptions, Result, StreamInfo, StreamKind};
use crate::player::audio_output::AudioSink;
use crate::player::decoder::{FfmpegDecoder, NativeDecoder};
use crate::player::pump::{log_ctx, spawn_pump, CancelSignal, PumpReport};
use crate::player::source::StreamSource;
use crate::player::sync::StreamSynchronizer;
use crate::player::video_player::VideoPlayer;
use crate::renderer::{TextureTarget, YuvTexture};
use eframe::egui_wgpu;
use log::{error, info, warn};
use std::sync::Arc;
use std::thread::JoinHandle;

/// 播放管理器
///
/// 一个实例在整个生命周期内只绑定一个数据源，最多一条视频管线和一条音频管线。
/// 所有方法都应在渲染线程调用；泵线程只碰解码器和音频队列。
pub struct PlayerManager<D: NativeDecoder = FfmpegDecoder, T: TextureTarget = YuvTexture> {
    video: Option<VideoPlayer<D, T>>,
    audio: Option<AudioSink>,
    clock: AudioClock,
    options: PlayerOptions,
    cancel: CancelSignal,
    source: Option<Box<dyn StreamSource>>,
    pumps: Vec<(&'static str, JoinHandle<PumpReport>)>,
    attached: bool,
    paused: bool,
    closed: bool,
}

impl PlayerManager<FfmpegDecoder, YuvTexture> {
    /// 按 `kind` 创建视频和/或音频管线
    ///
    /// 任何一步失败都只影响这次会话：已经创建的部分随返回的错误一起释放。
    pub fn open(
        render_state: &egui_wgpu::RenderState,
        info: &StreamInfo,
        options: &PlayerOptions,
        kind: StreamKind,
    ) -> Result<Self> {
        info!("{} 🎮 创建播放管理器 ({:?})...", log_ctx(), kind);
        info.validate()?;

        let clock = AudioClock::new(info.audio_samples_per_second());

        let audio = if kind.has_audio() {
            Some(AudioSink::open(info, clock.clone())?)
        } else {
            None
        };

        let video = if kind.has_video() {
            let sync = (audio.is_some() && options.sync.enabled)
                .then(|| Arc::new(StreamSynchronizer::new(clock.clone(), options.sync.clone())));
            Some(VideoPlayer::open(render_state, info, options, sync)?)
        } else {
            None
        };

        info!("{} ✅ 播放管理器创建完成", log_ctx());
        Ok(Self::new(video, audio, clock, options.clone()))
    }
}

impl<D: NativeDecoder, T: TextureTarget> PlayerManager<D, T> {
    pub fn new(
        video: Option<VideoPlayer<D, T>>,
        audio: Option<AudioSink>,
        clock: AudioClock,
        options: PlayerOptions,
    ) -> Self {
        Self {
            video,
            audio,
            clock,
            options,
            cancel: CancelSignal::new(),
            source: None,
            pumps: Vec::new(),
            attached: false,
            paused: false,
            closed: false,
        }
    }

    fn stream_kind(&self) -> Option<StreamKind> {
        match (self.video.is_some(), self.audio.is_some()) {
            (true, true) => Some(StreamKind::Both),
            (true, false) => Some(StreamKind::Video),
            (false, true) => Some(StreamKind::Audio),
            (false, false) => None,
        }
    }

    /// 绑定数据源并启动泵线程，每个实例只能调用一次
    pub fn attach_source(&mut self, mut source: Box<dyn StreamSource>) -> Result<()> {
        if self.attached {
            return Err(PlayerError::SourceAlreadyAttached);
        }
        self.attached = true;

        if self.closed {
            source.stop();
            return Err(PlayerError::SourceError("播放管理器已关闭".to_string()));
        }

        let Some(kind) = self.stream_kind() else {
            source.stop();
            return Err(PlayerError::SourceError("没有可用的音视频管线".to_string()));
        };

        info!("{} 📎 绑定数据源: {}", log_ctx(), source.description());
        let channels = match source.start(kind) {
            Ok(channels) => channels,
            Err(e) => {
                source.stop();
                return Err(e);
            }
        };
        self.source = Some(source);

        let poll = self.options.poll_interval();

        if let Some(video) = &self.video {
            match channels.video {
                Some(rx) => {
                    let decoder = video.decoder();
                    let cancel = self.cancel.clone();
                    // 解码器满时阻塞在这里，压力经通道传回数据源，不丢 access unit
                    let handle = spawn_pump("video", rx, self.cancel.clone(), poll, move |packet| {
                        decoder.feed(&packet, &cancel, poll);
                    })?;
                    self.pumps.push(("video", handle));
                }
                None => warn!("{} ⚠️ 数据源没有提供视频通道", log_ctx()),
            }
        }

        if let Some(audio) = &self.audio {
            match channels.audio {
                Some(rx) => {
                    let mut feeder = audio.feeder(self.options.max_audio_latency_ms);
                    let handle = spawn_pump("audio", rx, self.cancel.clone(), poll, move |packet| {
                        feeder.push_chunk(&packet)
                    })?;
                    self.pumps.push(("audio", handle));
                }
                None => warn!("{} ⚠️ 数据源没有提供音频通道", log_ctx()),
            }
        }

        if !self.paused {
            if let Some(audio) = self.audio.as_mut() {
                audio.resume()?;
            }
        }

        info!("{} 🚀 已启动 {} 个泵线程", log_ctx(), self.pumps.len());
        Ok(())
    }

    /// 渲染线程每帧调用：解码一步并上传，返回画面是否更新
    ///
    /// 暂停期间画面冻结，始终返回 `false`。
    pub fn render_frame(&self) -> Result<bool> {
        if self.paused || self.closed {
            return Ok(false);
        }
        match &self.video {
            Some(video) => video.decode_frame(),
            None => Ok(false),
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        if let Some(audio) = self.audio.as_mut() {
            audio.pause()?;
        }
        if !self.paused {
            info!("{} 🎬 暂停", log_ctx());
        }
        self.paused = true;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.attached {
            if let Some(audio) = self.audio.as_mut() {
                audio.resume()?;
            }
        }
        if self.paused {
            info!("{} 🎬 恢复播放", log_ctx());
        }
        self.paused = false;
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// 通知泵线程退出（不等待）
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// 当前音频播放位置（微秒）
    pub fn position_us(&self) -> Option<i64> {
        self.clock.position_us()
    }

    pub fn video(&self) -> Option<&VideoPlayer<D, T>> {
        self.video.as_ref()
    }

    /// 解码出的实际尺寸与声明分辨率不一致时返回实际尺寸（配置错误）
    pub fn geometry_mismatch(&self) -> Option<(u32, u32)> {
        self.video
            .as_ref()
            .and_then(|video| video.decoder_stats().geometry_mismatch)
    }

    /// 关闭会话：取消 → 等待泵线程 → 解码器 → 纹理/音频设备 → 数据源
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        info!("{} ⏹️ 关闭播放管理器", log_ctx());

        self.cancel.cancel();
        for (name, handle) in self.pumps.drain(..) {
            match handle.join() {
                Ok(report) => info!(
                    "{} ✅ {} 泵线程已结束（{} 个数据块）",
                    log_ctx(),
                    name,
                    report.packets
                ),
                Err(_) => error!("{} ❌ {} 泵线程异常退出", log_ctx(), name),
            }
        }

        if let Some(video) = self.video.take() {
            video.dispose();
        }
        if let Some(mut audio) = self.audio.take() {
            audio.close();
        }
        if let Some(mut source) = self.source.take() {
            source.stop();
        }

        info!("{} ✅ 播放管理器已关闭，所有线程已清理", log_ctx());
    }
}

impl<D: NativeDecoder, T: TextureTarget> Drop for PlayerManager<D, T> {
    fn drop(&mut self) {
        self.close();
    }
}
