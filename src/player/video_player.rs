use crate::core::{PlayerOptions, Result, StreamInfo};
use crate::player::decoder::{DecoderStats, FfmpegDecoder, NativeDecoder, VideoDecoder};
use crate::player::sync::StreamSynchronizer;
use crate::renderer::{RenderSink, RenderStats, TextureTarget, YuvTexture};
use eframe::egui_wgpu;
use log::debug;
use std::sync::Arc;

/// 视频管线：解码器 + 渲染端
pub struct VideoPlayer<D: NativeDecoder, T: TextureTarget> {
    decoder: Arc<VideoDecoder<D>>,
    sink: RenderSink<T>,
}

impl VideoPlayer<FfmpegDecoder, YuvTexture> {
    /// 创建 FFmpeg 解码器和 YUV 纹理，必须在渲染线程调用
    pub fn open(
        render_state: &egui_wgpu::RenderState,
        info: &StreamInfo,
        options: &PlayerOptions,
        sync: Option<Arc<StreamSynchronizer>>,
    ) -> Result<Self> {
        info.validate()?;
        let mut decoder = VideoDecoder::open(info, options)?;
        if let Some(sync) = sync {
            decoder = decoder.with_sync(sync);
        }
        let texture = YuvTexture::new(render_state, info.video_width, info.video_height)?;
        Ok(Self::new(decoder, RenderSink::new(texture)))
    }
}

impl<D: NativeDecoder, T: TextureTarget> VideoPlayer<D, T> {
    pub fn new(decoder: VideoDecoder<D>, sink: RenderSink<T>) -> Self {
        Self {
            decoder: Arc::new(decoder),
            sink,
        }
    }

    /// 泵线程持有的解码器引用
    pub fn decoder(&self) -> Arc<VideoDecoder<D>> {
        self.decoder.clone()
    }

    /// 解码一步并上传，返回纹理是否更新
    ///
    /// 单帧级错误（不支持的布局）只丢掉这一帧。
    pub fn decode_frame(&self) -> Result<bool> {
        let Some(frame) = self.decoder.decode_step()? else {
            return Ok(false);
        };

        match self.sink.upload(&*frame) {
            Ok(_) => Ok(true),
            Err(e) if e.is_recoverable() => {
                debug!("丢弃一帧: {}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn decoder_stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    pub fn render_stats(&self) -> RenderStats {
        self.sink.stats()
    }

    /// 先释放解码器，再释放纹理
    pub fn dispose(&self) {
        self.decoder.dispose();
        self.sink.dispose();
    }
}

impl<D: NativeDecoder, T: TextureTarget> Drop for VideoPlayer<D, T> {
    fn drop(&mut self) {
        self.dispose();
    }
}
