use crate::core::{
    PictureView, PixelFormat, PlaneRef, PlayerError, PlayerOptions, Result, StreamInfo, StreamPacket,
};
use crate::player::converter::{from_ffmpeg_pixel, FfmpegConverter, FormatConverter};
use crate::player::hw_decoder::{select_decoder, CodecDescriptor, FfmpegCodecs, VideoCodec};
use crate::player::pump::CancelSignal;
use crate::player::sync::StreamSynchronizer;
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, frame};
use log::{debug, error, info, warn};
use parking_lot::{Condvar, MappedMutexGuard, Mutex, MutexGuard};
use std::sync::Arc;
use std::time::Duration;

/// 原生解码调用的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStatus {
    Ready,
    /// 暂时无法完成（EAGAIN），稍后重试
    WouldBlock,
    Failed(String),
}

/// 原生视频解码器接口
///
/// `VideoDecoder` 负责加锁、双缓冲和格式探测，实现只需要包装原生调用。
pub trait NativeDecoder: Send + 'static {
    type Frame: PictureView + Send + 'static;

    fn alloc_frame(&self) -> Self::Frame;

    fn send_packet(&mut self, packet: &StreamPacket) -> DecodeStatus;

    fn receive_frame(&mut self, frame: &mut Self::Frame) -> DecodeStatus;

    /// 解码器当前输出格式，尚未确定时为 `None`
    fn output_format(&self) -> Option<PixelFormat>;

    fn create_converter(&self, info: &StreamInfo) -> Result<Box<dyn FormatConverter<Self::Frame>>>;
}

/// 两个预分配的图像缓冲：receive 是下一次解码的目标，render 是最近完成、渲染端可见的图像。
/// 成功解码后只交换下标，不复制数据。
pub struct FramePair<F> {
    slots: [F; 2],
    render: usize,
}

impl<F> FramePair<F> {
    pub fn new(first: F, second: F) -> Self {
        Self {
            slots: [first, second],
            render: 1,
        }
    }

    pub fn receive(&self) -> &F {
        &self.slots[1 - self.render]
    }

    pub fn receive_mut(&mut self) -> &mut F {
        &mut self.slots[1 - self.render]
    }

    pub fn render(&self) -> &F {
        &self.slots[self.render]
    }

    pub fn render_mut(&mut self) -> &mut F {
        &mut self.slots[self.render]
    }

    pub fn swap(&mut self) {
        self.render = 1 - self.render;
    }
}

struct DecoderState<D: NativeDecoder> {
    native: Option<D>,
    frames: Option<FramePair<D::Frame>>,
    converter: Option<Box<dyn FormatConverter<D::Frame>>>,
    format_probed: bool,
    stats: DecoderStats,
}

impl<D: NativeDecoder> DecoderState<D> {
    /// 渲染端可见的图像：有转换器时是转换结果，否则是 render 缓冲
    fn visible_mut(&mut self) -> Option<&mut D::Frame> {
        match self.converter.as_mut() {
            Some(converter) => Some(converter.output_mut()),
            None => self.frames.as_mut().map(|frames| frames.render_mut()),
        }
    }
}

/// 解码统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub units_fed: u64,
    pub units_dropped: u64,
    /// 解码器已满、送包线程等待取帧的次数
    pub feed_waits: u64,
    pub frames_decoded: u64,
    pub frames_skipped: u64,
    pub decode_errors: u64,
    /// 首帧实际尺寸与声明分辨率不一致时记录实际尺寸
    pub geometry_mismatch: Option<(u32, u32)>,
}

/// 视频解码器
///
/// 送包（泵线程）、解码（渲染线程）和释放通过同一把锁互斥，
/// 原生解码和原生上下文销毁永远不会交错执行。
/// 解码器已满时送包线程在 `drained` 上等待，`decode_step` 取帧后唤醒它。
pub struct VideoDecoder<D: NativeDecoder> {
    state: Mutex<DecoderState<D>>,
    drained: Condvar,
    codec: CodecDescriptor,
    info: StreamInfo,
    sync: Option<Arc<StreamSynchronizer>>,
}

impl VideoDecoder<FfmpegDecoder> {
    /// 按选项选择解码器实现并打开
    pub fn open(info: &StreamInfo, options: &PlayerOptions) -> Result<Self> {
        info!("创建视频解码器（硬件加速: {}）...", options.hardware_acceleration);
        let codec = select_decoder(
            &FfmpegCodecs,
            VideoCodec::H264,
            options.decoder_name.as_deref(),
            options.hardware_acceleration,
        )?;
        let native = FfmpegDecoder::open(&codec, info, options.h264_extradata.as_deref())?;
        Ok(Self::new(native, codec, *info))
    }
}

impl<D: NativeDecoder> VideoDecoder<D> {
    pub fn new(native: D, codec: CodecDescriptor, info: StreamInfo) -> Self {
        let frames = FramePair::new(native.alloc_frame(), native.alloc_frame());
        info!("✓ 视频解码器就绪: {}", codec.info());
        Self {
            state: Mutex::new(DecoderState {
                native: Some(native),
                frames: Some(frames),
                converter: None,
                format_probed: false,
                stats: DecoderStats::default(),
            }),
            drained: Condvar::new(),
            codec,
            info,
            sync: None,
        }
    }

    /// 由同步器决定完成的图像是否显示
    pub fn with_sync(mut self, sync: Arc<StreamSynchronizer>) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn codec(&self) -> &CodecDescriptor {
        &self.codec
    }

    pub fn is_hardware_accelerated(&self) -> bool {
        self.codec.accelerated
    }

    /// 送入一个 access unit，返回是否被解码器接收
    ///
    /// 解码器已满时不丢包：等待渲染线程取走图像后重试同一个单元，
    /// 每次最多等 `poll`，期间检查取消信号。只有取消、释放或送包失败时放弃。
    pub fn feed(&self, packet: &StreamPacket, cancel: &CancelSignal, poll: Duration) -> bool {
        let mut state = self.state.lock();
        let mut waiting = false;

        loop {
            let status = match state.native.as_mut() {
                Some(native) => native.send_packet(packet),
                None => return false,
            };

            match status {
                DecodeStatus::Ready => {
                    state.stats.units_fed += 1;
                    return true;
                }
                DecodeStatus::WouldBlock if cancel.is_cancelled() => {
                    state.stats.units_dropped += 1;
                    debug!("已取消，放弃 access unit (ts: {})", packet.timestamp_us);
                    return false;
                }
                DecodeStatus::WouldBlock => {
                    if !waiting {
                        waiting = true;
                        state.stats.feed_waits += 1;
                        debug!("解码器已满，等待取帧 (ts: {})", packet.timestamp_us);
                    }
                    self.drained.wait_for(&mut state, poll);
                }
                DecodeStatus::Failed(e) => {
                    state.stats.units_dropped += 1;
                    warn!("送包失败（已跳过）: {}", e);
                    return false;
                }
            }
        }
    }

    /// 尝试从原生解码器取出一帧
    ///
    /// 取到新图像时返回渲染端可见的帧；没有新帧时返回 `None`，且可见缓冲不被修改。
    /// 只有转换失败会返回错误。
    pub fn decode_step(&self) -> Result<Option<MappedMutexGuard<'_, D::Frame>>> {
        let mut guard = self.state.lock();
        let decoded = self.decode_locked(&mut guard);
        // 无论是否取到帧，解码器都可能腾出了输入空间
        self.drained.notify_all();
        if !decoded? {
            return Ok(None);
        }
        Ok(MutexGuard::try_map(guard, |state| state.visible_mut()).ok())
    }

    fn decode_locked(&self, state: &mut DecoderState<D>) -> Result<bool> {
        let (Some(native), Some(frames)) = (state.native.as_mut(), state.frames.as_mut()) else {
            return Ok(false);
        };

        match native.receive_frame(frames.receive_mut()) {
            DecodeStatus::Ready => {}
            DecodeStatus::WouldBlock => return Ok(false),
            DecodeStatus::Failed(e) => {
                state.stats.decode_errors += 1;
                error!("receive_frame 失败: {}", e);
                return Ok(false);
            }
        }

        // 第一次拿到有效格式时决定是否需要转换器，只探测一次
        if !state.format_probed {
            if let Some(format) = native.output_format() {
                state.format_probed = true;
                debug!("解码器输出像素格式: {:?}", format);

                let picture = frames.receive();
                if picture.width() != self.info.video_width || picture.height() != self.info.video_height {
                    state.stats.geometry_mismatch = Some((picture.width(), picture.height()));
                    warn!(
                        "解码尺寸 {}x{} 与声明分辨率 {}x{} 不一致，按声明分辨率输出",
                        picture.width(),
                        picture.height(),
                        self.info.video_width,
                        self.info.video_height
                    );
                }

                if format != self.info.target_format {
                    state.converter = Some(native.create_converter(&self.info)?);
                }
            }
        }

        if let Some(sync) = &self.sync {
            if !sync.should_present(frames.receive().pts()) {
                state.stats.frames_skipped += 1;
                return Ok(false);
            }
        }

        match state.converter.as_mut() {
            Some(converter) => converter.convert(frames.receive())?,
            None => frames.swap(),
        }

        state.stats.frames_decoded += 1;
        Ok(true)
    }

    /// 当前渲染端可见的帧（不解码）
    pub fn render_frame(&self) -> Option<MappedMutexGuard<'_, D::Frame>> {
        MutexGuard::try_map(self.state.lock(), |state| state.visible_mut()).ok()
    }

    pub fn has_converter(&self) -> bool {
        self.state.lock().converter.is_some()
    }

    pub fn stats(&self) -> DecoderStats {
        self.state.lock().stats
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().native.is_none()
    }

    /// 按顺序释放：两个轮换帧 → 原生解码器 → 转换器（目标帧和转换状态）
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        if state.native.is_none() {
            return;
        }

        drop(state.frames.take());
        drop(state.native.take());
        drop(state.converter.take());
        self.drained.notify_all();

        info!("🧹 视频解码器已释放 ({}), 统计: {:?}", self.codec.name, state.stats);
    }
}

impl<D: NativeDecoder> Drop for VideoDecoder<D> {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ============= FFmpeg 实现 =============

/// FFmpeg 原生解码器
pub struct FfmpegDecoder {
    decoder: codec::decoder::Video,
}

// AVCodecContext 只在持有 VideoDecoder 的锁时访问
unsafe impl Send for FfmpegDecoder {}

impl FfmpegDecoder {
    /// `extradata` 是带外的 SPS/PPS，中途加入的流没有带内参数集时需要它
    pub fn open(
        descriptor: &CodecDescriptor,
        info: &StreamInfo,
        extradata: Option<&[u8]>,
    ) -> Result<Self> {
        let av_codec = codec::decoder::find_by_name(&descriptor.name).ok_or_else(|| {
            PlayerError::DecoderInitError(format!("找不到解码器: {}", descriptor.name))
        })?;

        info!("使用 {} 初始化视频解码器", descriptor.name);

        let mut context = codec::context::Context::new();
        unsafe {
            use ffmpeg::ffi;
            let ctx = context.as_mut_ptr();
            (*ctx).codec_id = (*av_codec.as_ptr()).id;
            (*ctx).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
            (*ctx).bit_rate = 0;
            // 部分解码器不预设尺寸会出错
            (*ctx).width = info.video_width as i32;
            (*ctx).height = info.video_height as i32;
            (*ctx).flags |= ffi::AV_CODEC_FLAG_LOW_DELAY as i32;
        }
        if let Some(extradata) = extradata {
            install_extradata(&mut context, extradata)?;
            debug!("已设置 H.264 extradata ({} 字节)", extradata.len());
        }

        let decoder = context
            .decoder()
            .open_as(av_codec)
            .and_then(|opened| opened.video())
            .map_err(|e| {
                PlayerError::DecoderInitError(format!("无法打开解码器 {}: {}", descriptor.name, e))
            })?;

        Ok(Self { decoder })
    }

    fn status(result: std::result::Result<(), ffmpeg::Error>) -> DecodeStatus {
        match result {
            Ok(()) => DecodeStatus::Ready,
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                DecodeStatus::WouldBlock
            }
            Err(e) => DecodeStatus::Failed(e.to_string()),
        }
    }
}

impl NativeDecoder for FfmpegDecoder {
    type Frame = frame::Video;

    fn alloc_frame(&self) -> frame::Video {
        frame::Video::empty()
    }

    fn send_packet(&mut self, packet: &StreamPacket) -> DecodeStatus {
        let mut av_packet = ffmpeg::Packet::copy(&packet.data);
        av_packet.set_pts(Some(packet.timestamp_us));
        Self::status(self.decoder.send_packet(&av_packet))
    }

    fn receive_frame(&mut self, frame: &mut frame::Video) -> DecodeStatus {
        Self::status(self.decoder.receive_frame(frame))
    }

    fn output_format(&self) -> Option<PixelFormat> {
        from_ffmpeg_pixel(self.decoder.format())
    }

    fn create_converter(&self, info: &StreamInfo) -> Result<Box<dyn FormatConverter<frame::Video>>> {
        let converter = FfmpegConverter::new(
            self.decoder.format(),
            self.decoder.width(),
            self.decoder.height(),
            info,
        )?;
        Ok(Box::new(converter))
    }
}

/// 把 extradata 复制进编解码上下文
///
/// 缓冲用 `av_mallocz` 分配并带零填充，由上下文释放时一并回收。
fn install_extradata(context: &mut codec::context::Context, data: &[u8]) -> Result<()> {
    use ffmpeg::ffi;

    let size = i32::try_from(data.len())
        .map_err(|_| PlayerError::DecoderInitError(format!("extradata 过长: {} 字节", data.len())))?;
    let padded = data.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;

    unsafe {
        let buffer = ffi::av_mallocz(padded) as *mut u8;
        if buffer.is_null() {
            return Err(PlayerError::DecoderInitError("无法分配 extradata".to_string()));
        }
        std::ptr::copy_nonoverlapping(data.as_ptr(), buffer, data.len());

        let ctx = context.as_mut_ptr();
        if !(*ctx).extradata.is_null() {
            ffi::av_freep(&mut (*ctx).extradata as *mut *mut u8 as *mut std::ffi::c_void);
        }
        (*ctx).extradata = buffer;
        (*ctx).extradata_size = size;
    }
    Ok(())
}

/// YUV420 第 `index` 个平面的行数
fn plane_rows(index: usize, height: i32) -> usize {
    let height = height.max(0) as usize;
    if index == 0 {
        height
    } else {
        height.div_ceil(2)
    }
}

impl PictureView for frame::Video {
    fn width(&self) -> u32 {
        frame::Video::width(self)
    }

    fn height(&self) -> u32 {
        frame::Video::height(self)
    }

    fn pts(&self) -> Option<i64> {
        let pts = unsafe { (*self.as_ptr()).pts };
        (pts != ffmpeg::ffi::AV_NOPTS_VALUE).then_some(pts)
    }

    fn plane(&self, index: usize) -> PlaneRef<'_> {
        if index >= 3 {
            return PlaneRef::empty();
        }

        unsafe {
            let raw = self.as_ptr();
            let data = (*raw).data[index] as *const u8;
            let stride = (*raw).linesize[index];
            let rows = plane_rows(index, (*raw).height);
            if data.is_null() || rows == 0 {
                return PlaneRef::empty();
            }

            let pitch = stride.unsigned_abs() as usize;
            if stride > 0 {
                // 非平面帧：整块连续缓冲都挂在第 0 个平面上
                let len = if index == 0 && (*raw).linesize[1] == 0 {
                    packed_len(raw, data).unwrap_or(pitch * rows)
                } else {
                    pitch * rows
                };
                PlaneRef::packed(std::slice::from_raw_parts(data, len), stride, rows)
            } else if stride < 0 {
                let lowest = data.offset(stride as isize * (rows as isize - 1));
                PlaneRef::inverted(std::slice::from_raw_parts(lowest, pitch * rows), stride, rows)
            } else {
                PlaneRef {
                    data: &[],
                    origin: 0,
                    stride,
                    rows,
                }
            }
        }
    }
}

/// 从 `data` 到所属 AVBuffer 末尾的字节数
unsafe fn packed_len(raw: *const ffmpeg::ffi::AVFrame, data: *const u8) -> Option<usize> {
    let buf = (*raw).buf[0];
    if buf.is_null() || (*buf).data.is_null() {
        return None;
    }
    let end = (*buf).data.add((*buf).size as usize) as *const u8;
    let len = end.offset_from(data);
    (len > 0).then_some(len as usize)
}
