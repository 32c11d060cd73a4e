use crate::core::{PlayerError, Result};
use ffmpeg_next as ffmpeg;
use log::{debug, info, warn};
use std::ffi::CStr;

/// 视频编码类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
}

impl VideoCodec {
    /// 纯软件实现的解码器名称
    pub fn software_name(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "h264",
        }
    }

    pub fn to_ffmpeg_id(&self) -> ffmpeg::codec::Id {
        match self {
            VideoCodec::H264 => ffmpeg::codec::Id::H264,
        }
    }
}

/// 硬件解码器类型（根据解码器名称后缀推断，仅用于日志/展示）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HWAccelType {
    None,         // CPU 软解
    CUDA,         // NVIDIA CUVID
    QSV,          // Intel Quick Sync
    V4L2M2M,      // Linux V4L2 mem2mem
    MediaCodec,   // Android MediaCodec
    Other,
}

impl HWAccelType {
    pub fn from_decoder_name(name: &str) -> Self {
        if name.ends_with("_cuvid") {
            HWAccelType::CUDA
        } else if name.ends_with("_qsv") {
            HWAccelType::QSV
        } else if name.ends_with("_v4l2m2m") {
            HWAccelType::V4L2M2M
        } else if name.ends_with("_mediacodec") {
            HWAccelType::MediaCodec
        } else {
            HWAccelType::Other
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HWAccelType::None => "CPU软解",
            HWAccelType::CUDA => "CUDA",
            HWAccelType::QSV => "QSV",
            HWAccelType::V4L2M2M => "V4L2M2M",
            HWAccelType::MediaCodec => "MediaCodec",
            HWAccelType::Other => "其它硬件",
        }
    }
}

/// 选定的解码器实现（构造时确定一次，之后不再做运行时类型判断）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecDescriptor {
    pub name: String,
    pub accelerated: bool,
}

impl CodecDescriptor {
    pub fn hw_type(&self) -> HWAccelType {
        if self.accelerated {
            HWAccelType::from_decoder_name(&self.name)
        } else {
            HWAccelType::None
        }
    }

    /// 获取解码器信息
    pub fn info(&self) -> String {
        format!("{} ({})", self.name, self.hw_type().name())
    }
}

/// 解码器实现的查询接口
pub trait CodecRegistry {
    /// 按名称查找视频解码器
    fn has_decoder(&self, name: &str) -> bool;

    /// 能解码该编码的全部实现名称（按注册顺序）
    fn decoders_for(&self, codec: VideoCodec) -> Vec<String>;

    /// 该编码的默认实现名称
    fn default_decoder(&self, codec: VideoCodec) -> Option<String>;
}

/// 按优先级选择解码器：指定名称 → 首个硬件实现 → 默认软件实现
pub fn select_decoder(
    registry: &dyn CodecRegistry,
    codec: VideoCodec,
    requested: Option<&str>,
    hw_accel: bool,
) -> Result<CodecDescriptor> {
    if let Some(name) = requested {
        if registry.has_decoder(name) {
            info!("使用指定的解码器: {}", name);
            return Ok(CodecDescriptor {
                name: name.to_string(),
                accelerated: false,
            });
        }
        warn!("找不到指定的解码器 {}，按默认优先级选择", name);
    }

    if hw_accel {
        let software = codec.software_name();
        let hardware = registry
            .decoders_for(codec)
            .into_iter()
            .find(|name| name != software);

        match hardware {
            Some(name) if registry.has_decoder(&name) => {
                info!("✓ 检测到硬件解码器: {}", name);
                return Ok(CodecDescriptor {
                    name,
                    accelerated: true,
                });
            }
            _ => debug!("没有可用的硬件解码器，回退到软件解码"),
        }
    }

    registry
        .default_decoder(codec)
        .map(|name| CodecDescriptor {
            name,
            accelerated: false,
        })
        .ok_or_else(|| {
            PlayerError::DecoderInitError(format!(
                "找不到任何兼容的 {} 解码器",
                codec.software_name()
            ))
        })
}

/// 基于 FFmpeg 已注册解码器的实现
pub struct FfmpegCodecs;

impl CodecRegistry for FfmpegCodecs {
    fn has_decoder(&self, name: &str) -> bool {
        ffmpeg::codec::decoder::find_by_name(name)
            .map(|codec| codec.medium() == ffmpeg::media::Type::Video)
            .unwrap_or(false)
    }

    fn decoders_for(&self, codec: VideoCodec) -> Vec<String> {
        let id: ffmpeg::ffi::AVCodecID = codec.to_ffmpeg_id().into();
        let mut names = Vec::new();
        let mut opaque = std::ptr::null_mut();

        unsafe {
            loop {
                let raw = ffmpeg::ffi::av_codec_iterate(&mut opaque);
                if raw.is_null() {
                    break;
                }
                if ffmpeg::ffi::av_codec_is_decoder(raw) != 0 && (*raw).id == id {
                    names.push(CStr::from_ptr((*raw).name).to_string_lossy().into_owned());
                }
            }
        }

        debug!("{:?} 可用解码器: {:?}", codec, names);
        names
    }

    fn default_decoder(&self, codec: VideoCodec) -> Option<String> {
        ffmpeg::codec::decoder::find(codec.to_ffmpeg_id()).map(|c| c.name().to_string())
    }
}
