//! 设备串流客户端的实时媒体管线：解码 → 像素格式转换 → 纹理上传，音频输出，
//! 以及保证同一时间只有一个活动连接的设备管理。

pub mod core;
pub mod device;
pub mod player;
pub mod renderer;
pub mod ui;

pub use crate::core::{PlayerError, PlayerOptions, Result, StreamInfo, StreamKind, StreamPacket};
pub use device::{ActiveConnection, ConnectionManager, SessionSlot};
pub use player::PlayerManager;

/// 初始化日志：默认 Info，`RUST_LOG` 可覆盖，屏蔽 wgpu 的噪音
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        // 过滤掉 wgpu_hal 和 wgpu_core 的警告日志，减少日志噪音
        .filter_module("wgpu_hal", log::LevelFilter::Error)
        .filter_module("wgpu_core", log::LevelFilter::Error)
        .try_init();
}

/// 初始化 FFmpeg，创建解码器前调用一次
pub fn init_ffmpeg() -> Result<()> {
    ffmpeg_next::init()?;
    log::info!("✅ FFmpeg 初始化成功");
    Ok(())
}
