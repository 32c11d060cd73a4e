//! 测试用的确定性替身：原生解码器、转换器、纹理、音频设备和数据源

use crate::core::{
    PictureView, PixelFormat, PlaneRef, PlayerError, Result, SampleFormat, StreamInfo, StreamKind,
    StreamPacket,
};
use crate::device::{CandidateConnection, DeviceContext};
use crate::player::audio_output::OutputDevice;
use crate::player::converter::FormatConverter;
use crate::player::decoder::{DecodeStatus, NativeDecoder};
use crate::player::hw_decoder::CodecDescriptor;
use crate::player::source::{ChannelSource, SourceFeed, StreamChannels, StreamSource};
use crate::renderer::{PlaneUpload, TextureTarget};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

pub const MOCK_QUEUE_CAPACITY: usize = 8;

pub fn stream_info() -> StreamInfo {
    StreamInfo {
        video_width: 8,
        video_height: 6,
        target_format: PixelFormat::YUV420P,
        audio_channels: 2,
        audio_sample_rate: 1000,
        audio_format: SampleFormat::I16,
        min_audio_samples_per_payload: 4,
    }
}

pub fn mock_codec() -> CodecDescriptor {
    CodecDescriptor {
        name: "mock".to_string(),
        accelerated: false,
    }
}

// ============= 共享记录 =============

#[derive(Default)]
struct Record {
    events: Vec<String>,
    counts: HashMap<String, usize>,
    live: i64,
}

/// 替身对象共享的事件记录：释放顺序、调用次数和存活句柄数
#[derive(Clone, Default)]
pub struct Handles(Arc<Mutex<Record>>);

impl Handles {
    pub fn record(&self, event: &str) {
        self.0.lock().events.push(event.to_string());
    }

    pub fn bump(&self, name: &str) {
        *self.0.lock().counts.entry(name.to_string()).or_default() += 1;
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().events.clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.0.lock().counts.get(name).copied().unwrap_or(0)
    }

    pub fn converters_created(&self) -> usize {
        self.count("converter_created")
    }

    /// 仍未释放的原生句柄数
    pub fn live(&self) -> i64 {
        self.0.lock().live
    }

    fn acquire(&self) {
        self.0.lock().live += 1;
    }

    fn release(&self, event: &str) {
        let mut record = self.0.lock();
        record.live -= 1;
        record.events.push(event.to_string());
    }
}

// ============= 图像 =============

/// 测试图像：第 `row` 行（显示顺序）的每个字节都是 `row_value(id, row)`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MockFrame {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub pts: Option<i64>,
    pub strides: [i32; 3],
    pub planes: [Vec<u8>; 3],
    pub unconvertible: bool,
}

pub fn row_value(id: u64, row: usize) -> u8 {
    (id as u8).wrapping_mul(16).wrapping_add(row as u8)
}

fn plane_rows(index: usize, height: u32) -> usize {
    if index == 0 {
        height as usize
    } else {
        height.div_ceil(2) as usize
    }
}

fn fill_plane(id: u64, stride: i32, rows: usize) -> Vec<u8> {
    let pitch = stride.unsigned_abs() as usize;
    let mut data = Vec::with_capacity(pitch * rows);
    for memory_row in 0..rows {
        // 负 stride 的平面在内存中倒置
        let row = if stride < 0 { rows - 1 - memory_row } else { memory_row };
        data.extend(std::iter::repeat(row_value(id, row)).take(pitch));
    }
    data
}

impl MockFrame {
    pub fn planar(id: u64, width: u32, height: u32, pts: Option<i64>) -> Self {
        let chroma = width.div_ceil(2) as i32;
        Self::with_strides(id, width, height, pts, [width as i32, chroma, chroma])
    }

    pub fn flipped(id: u64, width: u32, height: u32) -> Self {
        let chroma = width.div_ceil(2) as i32;
        Self::with_strides(id, width, height, None, [-(width as i32), -chroma, -chroma])
    }

    /// 非平面的连续 I420 缓冲，整块挂在第 0 个平面上
    pub fn packed(id: u64, width: u32, height: u32) -> Self {
        let mut frame = Self::with_strides(id, width, height, None, [width as i32, 0, 0]);
        let chroma = (width.div_ceil(2) * height.div_ceil(2)) as usize;
        let mut data = frame.planes[0].clone();
        data.extend(std::iter::repeat(0x80).take(chroma * 2));
        frame.planes = [data, Vec::new(), Vec::new()];
        frame
    }

    pub fn with_strides(id: u64, width: u32, height: u32, pts: Option<i64>, strides: [i32; 3]) -> Self {
        let planes = [0, 1, 2].map(|i| fill_plane(id, strides[i], plane_rows(i, height)));
        Self {
            id,
            width,
            height,
            pts,
            strides,
            planes,
            unconvertible: false,
        }
    }
}

impl PictureView for MockFrame {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn pts(&self) -> Option<i64> {
        self.pts
    }

    fn plane(&self, index: usize) -> PlaneRef<'_> {
        if index >= 3 {
            return PlaneRef::empty();
        }
        let stride = self.strides[index];
        let rows = plane_rows(index, self.height);
        let data = self.planes[index].as_slice();
        if stride < 0 {
            PlaneRef::inverted(data, stride, rows)
        } else {
            PlaneRef::packed(data, stride, rows)
        }
    }
}

// ============= 数据包 =============

fn packet(kind: &str, id: u64, timestamp_us: i64, width: u32, height: u32) -> StreamPacket {
    StreamPacket::new(
        timestamp_us,
        format!("{} {} {} {}", kind, id, width, height).into_bytes(),
    )
}

pub fn video_packet(id: u64) -> StreamPacket {
    let info = stream_info();
    packet("frame", id, id as i64, info.video_width, info.video_height)
}

pub fn video_packet_at(id: u64, timestamp_us: i64) -> StreamPacket {
    let info = stream_info();
    packet("frame", id, timestamp_us, info.video_width, info.video_height)
}

pub fn video_packet_sized(id: u64, width: u32, height: u32) -> StreamPacket {
    packet("frame", id, id as i64, width, height)
}

pub fn flipped_packet(id: u64) -> StreamPacket {
    let info = stream_info();
    packet("flipped", id, id as i64, info.video_width, info.video_height)
}

pub fn packed_packet(id: u64) -> StreamPacket {
    let info = stream_info();
    packet("packed", id, id as i64, info.video_width, info.video_height)
}

/// 解码后 stride 为 (10, -10, 0) 的图像
pub fn odd_packet(id: u64) -> StreamPacket {
    let info = stream_info();
    packet("odd", id, id as i64, info.video_width, info.video_height)
}

pub fn corrupt_packet() -> StreamPacket {
    packet("corrupt", 0, 0, 0, 0)
}

pub fn unconvertible_packet() -> StreamPacket {
    let info = stream_info();
    packet("unconvertible", 0, 0, info.video_width, info.video_height)
}

fn frame_from_packet(packet: &StreamPacket) -> Option<MockFrame> {
    let text = String::from_utf8_lossy(&packet.data).into_owned();
    let fields: Vec<&str> = text.split_whitespace().collect();
    let number = |i: usize| fields.get(i).and_then(|f| f.parse::<u64>().ok()).unwrap_or(0);
    let (id, width, height) = (number(1), number(2) as u32, number(3) as u32);
    let pts = Some(packet.timestamp_us);

    match fields.first().copied() {
        Some("corrupt") => None,
        Some("flipped") => Some(MockFrame::flipped(id, width, height)),
        Some("packed") => Some(MockFrame::packed(id, width, height)),
        Some("odd") => Some(MockFrame::with_strides(id, width, height, pts, [10, -10, 0])),
        Some("unconvertible") => Some(MockFrame {
            unconvertible: true,
            ..MockFrame::planar(id, width, height, pts)
        }),
        _ => Some(MockFrame::planar(id, width, height, pts)),
    }
}

// ============= 解码器/转换器 =============

/// 按送包顺序依次产出图像的解码器，队列满时返回 WouldBlock
pub struct MockDecoder {
    pending: VecDeque<Option<MockFrame>>,
    format: Option<PixelFormat>,
    handles: Handles,
}

impl MockDecoder {
    pub fn new(handles: &Handles, format: Option<PixelFormat>) -> Self {
        handles.acquire();
        Self {
            pending: VecDeque::new(),
            format,
            handles: handles.clone(),
        }
    }
}

impl NativeDecoder for MockDecoder {
    type Frame = MockFrame;

    fn alloc_frame(&self) -> MockFrame {
        MockFrame::default()
    }

    fn send_packet(&mut self, packet: &StreamPacket) -> DecodeStatus {
        if self.pending.len() >= MOCK_QUEUE_CAPACITY {
            return DecodeStatus::WouldBlock;
        }
        self.pending.push_back(frame_from_packet(packet));
        DecodeStatus::Ready
    }

    fn receive_frame(&mut self, frame: &mut MockFrame) -> DecodeStatus {
        match self.pending.pop_front() {
            None => DecodeStatus::WouldBlock,
            Some(None) => DecodeStatus::Failed("invalid data".to_string()),
            Some(Some(decoded)) => {
                *frame = decoded;
                DecodeStatus::Ready
            }
        }
    }

    fn output_format(&self) -> Option<PixelFormat> {
        self.format
    }

    fn create_converter(&self, info: &StreamInfo) -> Result<Box<dyn FormatConverter<MockFrame>>> {
        self.handles.bump("converter_created");
        Ok(Box::new(MockConverter::new(&self.handles, info)))
    }
}

impl Drop for MockDecoder {
    fn drop(&mut self) {
        self.handles.release("native");
    }
}

/// 输出固定为声明分辨率的转换器
pub struct MockConverter {
    output: MockFrame,
    width: u32,
    height: u32,
    handles: Handles,
}

impl MockConverter {
    pub fn new(handles: &Handles, info: &StreamInfo) -> Self {
        handles.acquire();
        Self {
            output: MockFrame::planar(0, info.video_width, info.video_height, None),
            width: info.video_width,
            height: info.video_height,
            handles: handles.clone(),
        }
    }
}

impl FormatConverter<MockFrame> for MockConverter {
    fn convert(&mut self, source: &MockFrame) -> Result<()> {
        if source.unconvertible {
            return Err(PlayerError::ConvertError("mock conversion failure".to_string()));
        }
        self.output = MockFrame::planar(source.id, self.width, self.height, source.pts);
        Ok(())
    }

    fn output(&self) -> &MockFrame {
        &self.output
    }

    fn output_mut(&mut self) -> &mut MockFrame {
        &mut self.output
    }
}

impl Drop for MockConverter {
    fn drop(&mut self) {
        self.handles.release("converter");
    }
}

// ============= 纹理 =============

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upload {
    Planes([(Vec<u8>, usize); 3]),
    Packed(Vec<u8>, usize),
}

impl Upload {
    /// 上传数据的第一个字节（用来识别是哪一帧）
    pub fn first_byte(&self) -> Option<u8> {
        match self {
            Upload::Planes(planes) => planes[0].0.first().copied(),
            Upload::Packed(data, _) => data.first().copied(),
        }
    }
}

/// 记录所有上传调用的纹理
pub struct RecordingTexture {
    width: u32,
    height: u32,
    uploads: Arc<Mutex<Vec<Upload>>>,
    handles: Handles,
}

impl RecordingTexture {
    pub fn new(handles: &Handles, info: &StreamInfo) -> (Self, Arc<Mutex<Vec<Upload>>>) {
        handles.acquire();
        let uploads = Arc::new(Mutex::new(Vec::new()));
        let texture = Self {
            width: info.video_width,
            height: info.video_height,
            uploads: uploads.clone(),
            handles: handles.clone(),
        };
        (texture, uploads)
    }
}

impl TextureTarget for RecordingTexture {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn update_planes(&mut self, planes: [PlaneUpload<'_>; 3]) -> Result<()> {
        let copied = planes.map(|p| (p.data.to_vec(), p.pitch));
        self.uploads.lock().push(Upload::Planes(copied));
        Ok(())
    }

    fn update_packed(&mut self, data: &[u8], pitch: usize) -> Result<()> {
        self.uploads.lock().push(Upload::Packed(data.to_vec(), pitch));
        Ok(())
    }
}

impl Drop for RecordingTexture {
    fn drop(&mut self) {
        self.handles.release("texture");
    }
}

// ============= 音频设备 =============

pub struct MockDevice {
    handles: Handles,
}

impl MockDevice {
    pub fn new(handles: &Handles) -> Self {
        handles.acquire();
        handles.bump("audio_open");
        Self {
            handles: handles.clone(),
        }
    }
}

impl OutputDevice for MockDevice {
    fn play(&mut self) -> Result<()> {
        self.handles.bump("audio_play");
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.handles.bump("audio_pause");
        self.handles.record("audio_pause");
        Ok(())
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.handles.release("audio");
    }
}

// ============= 数据源/设备 =============

/// 包装 `ChannelSource`，记录停止事件
pub struct MockSource {
    inner: ChannelSource,
    handles: Handles,
    stopped: bool,
}

impl MockSource {
    pub fn new(handles: &Handles, description: &str) -> (Self, SourceFeed) {
        handles.acquire();
        let (inner, feed) = ChannelSource::new(description);
        let source = Self {
            inner,
            handles: handles.clone(),
            stopped: false,
        };
        (source, feed)
    }
}

impl StreamSource for MockSource {
    fn description(&self) -> String {
        self.inner.description()
    }

    fn start(&mut self, kind: StreamKind) -> Result<StreamChannels> {
        self.inner.start(kind)
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.inner.stop();
            self.handles.release("source");
        }
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 候选设备：成功打开前被丢弃时记录 `dispose:<label>`
pub struct MockCandidate {
    label: String,
    fail_open: bool,
    opened: bool,
    handles: Handles,
}

impl MockCandidate {
    pub fn new(handles: &Handles, label: &str, fail_open: bool) -> Self {
        Self {
            label: label.to_string(),
            fail_open,
            opened: false,
            handles: handles.clone(),
        }
    }
}

impl CandidateConnection for MockCandidate {
    fn label(&self) -> &str {
        &self.label
    }

    fn open(&mut self, _kind: StreamKind) -> Result<Box<dyn StreamSource>> {
        self.handles.bump(&format!("open:{}", self.label));
        if self.fail_open {
            return Err(PlayerError::ConnectError(format!("{} 无法初始化", self.label)));
        }
        self.opened = true;
        let (source, _feed) = MockSource::new(&self.handles, &self.label);
        Ok(Box::new(source))
    }
}

impl Drop for MockCandidate {
    fn drop(&mut self) {
        if !self.opened {
            self.handles.record(&format!("dispose:{}", self.label));
        }
    }
}

/// 每次枚举返回同一组设备（`None` 表示枚举失败）
pub struct MockContext {
    pub devices: Arc<Mutex<Option<Vec<(String, bool)>>>>,
    handles: Handles,
}

impl MockContext {
    pub fn new(handles: &Handles, devices: &[(&str, bool)]) -> Self {
        let list = devices.iter().map(|(l, f)| (l.to_string(), *f)).collect();
        Self {
            devices: Arc::new(Mutex::new(Some(list))),
            handles: handles.clone(),
        }
    }
}

impl DeviceContext for MockContext {
    fn find_devices(&mut self) -> Result<Vec<Box<dyn CandidateConnection>>> {
        self.handles.bump("discover");
        match self.devices.lock().as_ref() {
            Some(list) => Ok(list
                .iter()
                .map(|(label, fail)| {
                    Box::new(MockCandidate::new(&self.handles, label, *fail))
                        as Box<dyn CandidateConnection>
                })
                .collect()),
            None => Err(PlayerError::DiscoveryError("usb backend unavailable".to_string())),
        }
    }
}
