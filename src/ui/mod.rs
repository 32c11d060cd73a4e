// GUI 边界：驱动核心的 egui 视图

pub mod devices_view;
pub mod player_view;

pub use devices_view::DevicesView;
pub use player_view::{PlayerAction, PlayerView};
