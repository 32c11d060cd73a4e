use crate::player::decoder::NativeDecoder;
use crate::player::PlayerManager;
use crate::renderer::{TextureTarget, YuvPaintCallback};
use egui::{Rect, Ui, Vec2};
use log::error;

/// 用户在播放视图里的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    None,
    Stop,
}

/// 播放视图：每帧驱动一次解码/上传并绘制纹理
pub struct PlayerView<D: NativeDecoder, T: TextureTarget> {
    manager: PlayerManager<D, T>,
    video_size: (u32, u32),
    error: Option<String>,
}

impl<D: NativeDecoder, T: TextureTarget> PlayerView<D, T> {
    pub fn new(manager: PlayerManager<D, T>, video_size: (u32, u32)) -> Self {
        Self {
            manager,
            video_size,
            error: None,
        }
    }

    pub fn manager(&mut self) -> &mut PlayerManager<D, T> {
        &mut self.manager
    }

    pub fn show(&mut self, ui: &mut Ui) -> PlayerAction {
        let mut action = PlayerAction::None;

        ui.horizontal(|ui| {
            let label = if self.manager.is_paused() { "▶ 继续" } else { "⏸ 暂停" };
            if ui.button(label).clicked() {
                let result = if self.manager.is_paused() {
                    self.manager.resume()
                } else {
                    self.manager.pause()
                };
                if let Err(e) = result {
                    self.error = Some(e.to_string());
                }
            }
            if ui.button("⏹ 停止").clicked() {
                self.manager.close();
                action = PlayerAction::Stop;
            }
        });

        if self.error.is_none() && !self.manager.is_closed() {
            if let Err(e) = self.manager.render_frame() {
                error!("❌ 渲染失败，结束会话: {}", e);
                self.error = Some(e.to_string());
                self.manager.close();
            }
        }

        if let Some((width, height)) = self.manager.geometry_mismatch() {
            ui.colored_label(
                egui::Color32::YELLOW,
                format!(
                    "⚠️ 视频实际尺寸 {}x{} 与配置的 {}x{} 不一致",
                    width, height, self.video_size.0, self.video_size.1
                ),
            );
        }

        let available = ui.available_rect_before_wrap();
        if let Some(message) = &self.error {
            ui.colored_label(egui::Color32::LIGHT_RED, format!("❌ {}", message));
        } else if self.manager.video().is_some() {
            let rect = fit_rect(available, self.video_size);
            ui.painter().add(YuvPaintCallback::shape(rect));
        }

        if !self.manager.is_closed() {
            ui.ctx().request_repaint();
        }
        action
    }
}

/// 保持宽高比，居中放进 `available`
pub fn fit_rect(available: Rect, (width, height): (u32, u32)) -> Rect {
    if width == 0 || height == 0 || available.height() <= 0.0 {
        return available;
    }

    let video_aspect = width as f32 / height as f32;
    let rect_aspect = available.width() / available.height();

    let display_size = if video_aspect > rect_aspect {
        // 视频更宽，以宽度为准
        Vec2::new(available.width(), available.width() / video_aspect)
    } else {
        // 视频更高，以高度为准
        Vec2::new(available.height() * video_aspect, available.height())
    };

    Rect::from_center_size(available.center(), display_size)
}
