use serde::{Deserialize, Serialize};

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    RGBA,
    RGB,
    YUV420P,
    NV12,
    /// 其它解码器原生格式（需要转换器）
    Other,
}

/// 音频采样格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    F32,
    /// 有符号 16 位小端
    I16,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::F32 => 4,
            SampleFormat::I16 => 2,
        }
    }
}

/// 连接需要打开的通道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    Video,
    Audio,
    Both,
}

impl StreamKind {
    pub fn has_video(&self) -> bool {
        matches!(self, StreamKind::Video | StreamKind::Both)
    }

    pub fn has_audio(&self) -> bool {
        matches!(self, StreamKind::Audio | StreamKind::Both)
    }
}

/// 数据源送来的一个数据块：视频通道上是一个完整的 access unit，
/// 音频通道上是一段交错的 PCM 采样。内容对核心是不透明的。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPacket {
    /// 时间戳（微秒）
    pub timestamp_us: i64,
    pub data: Vec<u8>,
}

impl StreamPacket {
    pub fn new(timestamp_us: i64, data: Vec<u8>) -> Self {
        Self { timestamp_us, data }
    }
}

/// 单个颜色平面的只读视图
///
/// `data` 从平面内存的最低地址开始。stride 为负时图像在内存中是倒置的，
/// 第 0 行（显示顶部）位于 `origin`，越往下的行地址越低。
#[derive(Debug, Clone, Copy)]
pub struct PlaneRef<'a> {
    pub data: &'a [u8],
    /// 显示第 0 行在 `data` 中的偏移
    pub origin: usize,
    pub stride: i32,
    pub rows: usize,
}

impl<'a> PlaneRef<'a> {
    /// 按正 stride 排布的平面
    pub fn packed(data: &'a [u8], stride: i32, rows: usize) -> Self {
        Self { data, origin: 0, stride, rows }
    }

    /// 按负 stride 排布的平面：第 0 行在内存末尾
    pub fn inverted(data: &'a [u8], stride: i32, rows: usize) -> Self {
        let pitch = stride.unsigned_abs() as usize;
        Self {
            data,
            origin: pitch * rows.saturating_sub(1),
            stride,
            rows,
        }
    }

    pub fn empty() -> Self {
        Self { data: &[], origin: 0, stride: 0, rows: 0 }
    }
}

/// 解码后图像的访问接口
///
/// 渲染端只通过这个接口读取平面，和具体的解码器实现无关。
pub trait PictureView {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// 时间戳（微秒）
    fn pts(&self) -> Option<i64>;
    fn plane(&self, index: usize) -> PlaneRef<'_>;

    fn strides(&self) -> [i32; 3] {
        [self.plane(0).stride, self.plane(1).stride, self.plane(2).stride]
    }
}

/// 根据 stride 的正负/零模式得到的帧布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLayout {
    /// 三个平面 stride 均为正
    Planar,
    /// 三个平面 stride 均为负（垂直翻转）
    FlippedPlanar,
    /// 亮度 stride 为正、色度为 0：非平面的连续缓冲
    Packed,
}

impl FrameLayout {
    /// 不支持的组合返回 `None`
    pub fn classify(strides: [i32; 3]) -> Option<Self> {
        let [y, u, v] = strides;
        if y > 0 && u > 0 && v > 0 {
            Some(FrameLayout::Planar)
        } else if y < 0 && u < 0 && v < 0 {
            Some(FrameLayout::FlippedPlanar)
        } else if y > 0 && u == 0 && v == 0 {
            Some(FrameLayout::Packed)
        } else {
            None
        }
    }
}
