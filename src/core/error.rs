use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("设备枚举失败: {0}")]
    DiscoveryError(String),

    #[error("连接设备失败: {0}")]
    ConnectError(String),

    #[error("无法初始化视频解码器: {0}")]
    DecoderInitError(String),

    #[error("像素格式转换失败: {0}")]
    ConvertError(String),

    #[error("不支持的帧布局 (linesize: {0} {1} {2})")]
    UnsupportedFrameLayout(i32, i32, i32),

    #[error("音频设备错误: {0}")]
    AudioDeviceError(String),

    #[error("渲染错误: {0}")]
    RenderError(String),

    #[error("数据源错误: {0}")]
    SourceError(String),

    #[error("播放管理器已绑定数据源")]
    SourceAlreadyAttached,

    #[error("配置错误: {0}")]
    Config(#[from] anyhow::Error),
}

impl PlayerError {
    /// 单帧级错误：记录后丢帧即可，不终止会话
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlayerError::DiscoveryError(_)
                | PlayerError::ConnectError(_)
                | PlayerError::UnsupportedFrameLayout(..)
        )
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
