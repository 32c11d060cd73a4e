use crate::core::{PixelFormat, PlayerError, Result, StreamInfo};
use ffmpeg_next::{format::Pixel, frame, software};
use log::info;

/// 像素格式转换器
///
/// 只在解码器输出格式和目标格式不一致时创建，持有一个固定尺寸的目标帧。
pub trait FormatConverter<F>: Send {
    /// 把源图像转换到目标帧，失败对会话是致命的
    fn convert(&mut self, source: &F) -> Result<()>;

    fn output(&self) -> &F;

    fn output_mut(&mut self) -> &mut F;
}

pub(crate) fn to_ffmpeg_pixel(format: PixelFormat) -> Pixel {
    match format {
        PixelFormat::RGBA => Pixel::RGBA,
        PixelFormat::RGB => Pixel::RGB24,
        PixelFormat::YUV420P => Pixel::YUV420P,
        PixelFormat::NV12 => Pixel::NV12,
        PixelFormat::Other => Pixel::None,
    }
}

pub(crate) fn from_ffmpeg_pixel(format: Pixel) -> Option<PixelFormat> {
    match format {
        Pixel::None => None,
        Pixel::RGBA => Some(PixelFormat::RGBA),
        Pixel::RGB24 => Some(PixelFormat::RGB),
        Pixel::YUV420P => Some(PixelFormat::YUV420P),
        Pixel::NV12 => Some(PixelFormat::NV12),
        _ => Some(PixelFormat::Other),
    }
}

/// 基于 swscale 的转换器
pub struct FfmpegConverter {
    scaler: software::scaling::Context,
    frame: frame::Video,
}

// SwsContext 本身不是 Send，但转换器只在持有解码器锁时使用
unsafe impl Send for FfmpegConverter {}

impl FfmpegConverter {
    /// 目标尺寸始终是流声明的分辨率，而不是源图像自己报告的尺寸
    pub fn new(source: Pixel, source_width: u32, source_height: u32, info: &StreamInfo) -> Result<Self> {
        let target = to_ffmpeg_pixel(info.target_format);
        info!(
            "🔧 初始化像素格式转换器: {:?} {}x{} → {:?} {}x{}",
            source, source_width, source_height, target, info.video_width, info.video_height
        );

        let frame = frame::Video::new(target, info.video_width, info.video_height);
        if frame.data(0).is_empty() {
            return Err(PlayerError::ConvertError("无法分配转换目标帧".to_string()));
        }

        let scaler = software::scaling::Context::get(
            source,
            source_width,
            source_height,
            target,
            info.video_width,
            info.video_height,
            software::scaling::Flags::FAST_BILINEAR,
        )
        .map_err(|e| PlayerError::ConvertError(format!("无法初始化转换器: {}", e)))?;

        Ok(Self { scaler, frame })
    }
}

impl FormatConverter<frame::Video> for FfmpegConverter {
    fn convert(&mut self, source: &frame::Video) -> Result<()> {
        self.scaler
            .run(source, &mut self.frame)
            .map_err(|e| PlayerError::ConvertError(e.to_string()))
    }

    fn output(&self) -> &frame::Video {
        &self.frame
    }

    fn output_mut(&mut self) -> &mut frame::Video {
        &mut self.frame
    }
}
