// 渲染模块

pub mod shader;
pub mod texture;

pub use texture::{YuvPaintCallback, YuvTexture};

use crate::core::{FrameLayout, PictureView, PlaneRef, PlayerError, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::thread::{self, ThreadId};

/// 单个平面的上传数据：从第一行开始，每行间隔 `pitch` 字节
#[derive(Debug, Clone, Copy)]
pub struct PlaneUpload<'a> {
    pub data: &'a [u8],
    pub pitch: usize,
}

/// 显示端纹理
pub trait TextureTarget {
    fn size(&self) -> (u32, u32);

    /// 三个平面分别上传（Y、U、V）
    fn update_planes(&mut self, planes: [PlaneUpload<'_>; 3]) -> Result<()>;

    /// 一次上传整块非平面缓冲
    fn update_packed(&mut self, data: &[u8], pitch: usize) -> Result<()>;
}

/// 渲染统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub frames_uploaded: u64,
    pub frames_dropped: u64,
}

struct SinkState<T> {
    texture: Option<T>,
    stats: RenderStats,
}

/// 渲染端：按 stride 布局把图像上传到纹理
///
/// 只能在创建它的线程（持有渲染上下文的线程）上传；
/// 上传和释放通过同一把锁互斥，不会用到已销毁的纹理。
pub struct RenderSink<T: TextureTarget> {
    state: Mutex<SinkState<T>>,
    owner: ThreadId,
}

impl<T: TextureTarget> RenderSink<T> {
    pub fn new(texture: T) -> Self {
        let (width, height) = texture.size();
        info!("🎨 渲染端就绪: {}x{}", width, height);
        Self {
            state: Mutex::new(SinkState {
                texture: Some(texture),
                stats: RenderStats::default(),
            }),
            owner: thread::current().id(),
        }
    }

    /// 上传一帧，返回走的是哪种布局
    ///
    /// 不支持的布局或数据不足时返回 `UnsupportedFrameLayout`，纹理保持不变。
    pub fn upload(&self, picture: &impl PictureView) -> Result<FrameLayout> {
        if thread::current().id() != self.owner {
            return Err(PlayerError::RenderError(
                "纹理只能在渲染线程上更新".to_string(),
            ));
        }

        let mut state = self.state.lock();
        let state = &mut *state;
        let Some(texture) = state.texture.as_mut() else {
            return Err(PlayerError::RenderError("纹理已释放".to_string()));
        };

        let strides = picture.strides();
        let uploaded = match FrameLayout::classify(strides) {
            Some(FrameLayout::Planar) => planar(picture, forward)
                .map(|planes| texture.update_planes(planes))
                .map(|r| r.map(|_| FrameLayout::Planar)),
            Some(FrameLayout::FlippedPlanar) => planar(picture, from_last_row)
                .map(|planes| texture.update_planes(planes))
                .map(|r| r.map(|_| FrameLayout::FlippedPlanar)),
            Some(FrameLayout::Packed) => forward(picture.plane(0))
                .map(|plane| texture.update_packed(plane.data, plane.pitch))
                .map(|r| r.map(|_| FrameLayout::Packed)),
            None => None,
        };

        match uploaded {
            Some(result) => {
                let layout = result?;
                state.stats.frames_uploaded += 1;
                debug!("📺 纹理已更新 ({:?})", layout);
                Ok(layout)
            }
            None => {
                state.stats.frames_dropped += 1;
                warn!(
                    "⚠️ 不支持的帧布局，丢弃该帧 (linesize: {} {} {})",
                    strides[0], strides[1], strides[2]
                );
                Err(PlayerError::UnsupportedFrameLayout(
                    strides[0], strides[1], strides[2],
                ))
            }
        }
    }

    pub fn stats(&self) -> RenderStats {
        self.state.lock().stats
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().texture.is_none()
    }

    /// 释放纹理，可重复调用
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        if let Some(texture) = state.texture.take() {
            drop(texture);
            info!("🧹 纹理已释放, 统计: {:?}", state.stats);
        }
    }
}

impl<T: TextureTarget> Drop for RenderSink<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn planar<'a>(
    picture: &'a impl PictureView,
    read: fn(PlaneRef<'a>) -> Option<PlaneUpload<'a>>,
) -> Option<[PlaneUpload<'a>; 3]> {
    Some([
        read(picture.plane(0))?,
        read(picture.plane(1))?,
        read(picture.plane(2))?,
    ])
}

/// 正 stride：从第 0 行开始
fn forward(plane: PlaneRef<'_>) -> Option<PlaneUpload<'_>> {
    let pitch = usize::try_from(plane.stride).ok().filter(|p| *p > 0)?;
    let data = plane.data.get(plane.origin..)?;
    (data.len() >= pitch * plane.rows).then_some(PlaneUpload { data, pitch })
}

/// 负 stride：从最后一行（内存最低处）开始，按 |stride| 递增读取
fn from_last_row(plane: PlaneRef<'_>) -> Option<PlaneUpload<'_>> {
    let pitch = plane.stride.unsigned_abs() as usize;
    if plane.stride >= 0 || plane.rows == 0 {
        return None;
    }
    let start = plane.origin.checked_sub(pitch * (plane.rows - 1))?;
    let data = plane.data.get(start..start + pitch * plane.rows)?;
    Some(PlaneUpload { data, pitch })
}
