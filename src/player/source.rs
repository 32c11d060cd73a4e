use crate::core::{PlayerError, Result, StreamKind, StreamPacket};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 数据源启动后交给播放管理器的两个通道
///
/// 只打开视频或音频时，另一个通道为 `None`。
pub struct StreamChannels {
    pub video: Option<Receiver<StreamPacket>>,
    pub audio: Option<Receiver<StreamPacket>>,
}

/// 数据源抽象接口
///
/// 传输层（USB、网络）负责拆包，核心只接收已经分离好的视频 access unit 和 PCM 数据块。
pub trait StreamSource: Send {
    /// 获取描述信息（用于日志）
    fn description(&self) -> String;

    /// 打开请求的通道，每个数据源只能启动一次
    fn start(&mut self, kind: StreamKind) -> Result<StreamChannels>;

    /// 停止产出数据并释放传输资源，可重复调用
    fn stop(&mut self);
}

/// 有界通道容量：满了以后传输线程阻塞，形成背压
const VIDEO_CAPACITY: usize = 200;
const AUDIO_CAPACITY: usize = 150;

/// 进程内数据源：传输线程通过 `SourceFeed` 推数据，播放管理器从通道读
pub struct ChannelSource {
    description: String,
    video_rx: Option<Receiver<StreamPacket>>,
    audio_rx: Option<Receiver<StreamPacket>>,
    started: bool,
    stopped: Arc<AtomicBool>,
}

/// `ChannelSource` 的写端
#[derive(Clone)]
pub struct SourceFeed {
    video_tx: Sender<StreamPacket>,
    audio_tx: Sender<StreamPacket>,
    stopped: Arc<AtomicBool>,
}

impl ChannelSource {
    pub fn new(description: impl Into<String>) -> (Self, SourceFeed) {
        let (video_tx, video_rx) = bounded(VIDEO_CAPACITY);
        let (audio_tx, audio_rx) = bounded(AUDIO_CAPACITY);
        let stopped = Arc::new(AtomicBool::new(false));

        let source = Self {
            description: description.into(),
            video_rx: Some(video_rx),
            audio_rx: Some(audio_rx),
            started: false,
            stopped: stopped.clone(),
        };
        let feed = SourceFeed {
            video_tx,
            audio_tx,
            stopped,
        };
        (source, feed)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl StreamSource for ChannelSource {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn start(&mut self, kind: StreamKind) -> Result<StreamChannels> {
        if self.started || self.is_stopped() {
            return Err(PlayerError::SourceError(format!(
                "{} 已启动或已停止",
                self.description
            )));
        }
        self.started = true;

        // 未请求的通道直接关闭，写端会立即得到失败
        let video = self.video_rx.take().filter(|_| kind.has_video());
        let audio = self.audio_rx.take().filter(|_| kind.has_audio());

        info!("📡 数据源启动: {} ({:?})", self.description, kind);
        Ok(StreamChannels { video, audio })
    }

    fn stop(&mut self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.video_rx.take();
        self.audio_rx.take();
        info!("⏹ 数据源已停止: {}", self.description);
    }
}

impl Drop for ChannelSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl SourceFeed {
    /// 推送一个视频 access unit，通道满时阻塞
    ///
    /// 数据源停止或读端全部关闭后返回 `false`。
    pub fn push_video(&self, packet: StreamPacket) -> bool {
        Self::push(&self.video_tx, &self.stopped, packet)
    }

    /// 推送一个 PCM 数据块
    pub fn push_audio(&self, packet: StreamPacket) -> bool {
        Self::push(&self.audio_tx, &self.stopped, packet)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn push(tx: &Sender<StreamPacket>, stopped: &AtomicBool, packet: StreamPacket) -> bool {
        if stopped.load(Ordering::Acquire) {
            return false;
        }
        match tx.send(packet) {
            Ok(()) => true,
            Err(_) => {
                debug!("读端已关闭，丢弃数据");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packets_arrive_in_order() {
        let (mut source, feed) = ChannelSource::new("test");
        let channels = source.start(StreamKind::Both).unwrap();

        for ts in 0..5 {
            assert!(feed.push_video(StreamPacket::new(ts, vec![ts as u8])));
        }
        let video = channels.video.unwrap();
        let received: Vec<i64> = video.try_iter().map(|p| p.timestamp_us).collect();
        assert_eq!(received, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_unrequested_channel_is_closed() {
        let (mut source, feed) = ChannelSource::new("video only");
        let channels = source.start(StreamKind::Video).unwrap();
        assert!(channels.audio.is_none());
        assert!(!feed.push_audio(StreamPacket::new(0, vec![0, 0])));
        assert!(feed.push_video(StreamPacket::new(0, vec![1])));
    }

    #[test]
    fn test_start_twice_fails() {
        let (mut source, _feed) = ChannelSource::new("twice");
        assert!(source.start(StreamKind::Both).is_ok());
        assert!(matches!(
            source.start(StreamKind::Both),
            Err(PlayerError::SourceError(_))
        ));
    }

    #[test]
    fn test_stop_rejects_further_pushes() {
        let (mut source, feed) = ChannelSource::new("stop");
        let _channels = source.start(StreamKind::Both).unwrap();
        source.stop();
        source.stop();
        assert!(feed.is_stopped());
        assert!(!feed.push_video(StreamPacket::new(0, vec![1])));
    }
}
