// 播放器核心模块

pub mod audio_output;
pub mod converter;
pub mod decoder;
pub mod hw_decoder;
pub mod manager;
pub mod pump;
pub mod source;
pub mod sync;
pub mod video_player;

#[cfg(test)]
pub(crate) mod testing;

pub use audio_output::{AudioFeeder, AudioSink, CpalDevice, OutputDevice};
pub use decoder::{DecodeStatus, FfmpegDecoder, FramePair, NativeDecoder, VideoDecoder};
pub use hw_decoder::{CodecDescriptor, HWAccelType};
pub use manager::PlayerManager;
pub use pump::CancelSignal;
pub use source::{ChannelSource, SourceFeed, StreamChannels, StreamSource};
pub use sync::StreamSynchronizer;
pub use video_player::VideoPlayer;
