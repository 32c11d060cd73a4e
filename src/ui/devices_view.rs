use crate::device::{ActiveConnection, ConnectionManager, DeviceContext};
use egui::Ui;

/// 设备列表视图
pub struct DevicesView<C: DeviceContext> {
    manager: ConnectionManager<C>,
}

impl<C: DeviceContext> DevicesView<C> {
    /// 创建时立即扫描一次（可能直接触发自动连接）
    pub fn new(manager: ConnectionManager<C>) -> (Self, Option<ActiveConnection>) {
        let mut view = Self { manager };
        let connection = view.manager.refresh();
        (view, connection)
    }

    pub fn manager(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    /// 绘制列表，用户选中的设备连接成功后返回
    pub fn show(&mut self, ui: &mut Ui) -> Option<ActiveConnection> {
        let mut connection = None;

        ui.vertical_centered(|ui| {
            ui.heading("通过 USB 连接");

            match self.manager.auto_connect() {
                Some("") => {
                    ui.label("将自动连接第一个出现的设备");
                }
                Some(filter) => {
                    ui.label(format!("将自动连接序列号以 {} 结尾的设备", filter));
                }
                None => {}
            }
            if self.manager.auto_connect().is_some() && ui.button("取消自动连接").clicked() {
                self.manager.cancel_auto_connect();
            }

            ui.add_space(10.0);

            let mut chosen = None;
            if self.manager.candidates().is_empty() {
                ui.label(egui::RichText::new("没有找到 USB 设备").color(egui::Color32::GRAY));
            } else {
                egui::ScrollArea::vertical()
                    .max_height(ui.available_height() * 0.5)
                    .show(ui, |ui| {
                        for (index, candidate) in self.manager.candidates().iter().enumerate() {
                            if ui.button(candidate.label()).clicked() {
                                chosen = Some(index);
                            }
                        }
                    });
            }
            if let Some(index) = chosen {
                connection = self.manager.connect(index);
            }

            ui.add_space(10.0);
            if ui.button("刷新设备列表").clicked() && connection.is_none() {
                connection = self.manager.refresh();
            }

            if let Some(error) = self.manager.last_error() {
                ui.colored_label(egui::Color32::RED, format!("❌ 出现错误: {}", error));
            }
        });

        connection
    }
}
