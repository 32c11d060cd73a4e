// 设备连接模块

pub mod manager;

pub use manager::ConnectionManager;

use crate::core::{Result, StreamKind};
use crate::player::source::{StreamChannels, StreamSource};
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 平台设备枚举接口（USB 上下文等）
pub trait DeviceContext: Send {
    /// 扫描一次，返回按发现顺序排列的候选设备
    fn find_devices(&mut self) -> Result<Vec<Box<dyn CandidateConnection>>>;
}

/// 已发现、尚未绑定的设备
///
/// 未打开就被丢弃（`Drop`）时释放底层传输句柄。`open` 成功后候选对象本身
/// 也会被丢弃，因此实现必须把传输句柄移交给返回的数据源，
/// 而不能在 `Drop` 里关闭已经交出去的连接。
pub trait CandidateConnection: Send {
    /// 设备标识（如序列号）
    fn label(&self) -> &str;

    fn is_alive(&self) -> bool {
        true
    }

    /// 初始化传输并打开数据源，传输句柄的所有权随之转入数据源；
    /// 失败时候选设备保持可用
    fn open(&mut self, kind: StreamKind) -> Result<Box<dyn StreamSource>>;
}

/// 会话槽：同一时间最多一个活动连接
#[derive(Clone, Default)]
pub struct SessionSlot(Arc<AtomicBool>);

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 占用槽位，已被占用时返回 `None`
    pub fn try_acquire(&self) -> Option<SessionGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SessionGuard(self.0.clone()))
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// 释放时归还会话槽
pub struct SessionGuard(Arc<AtomicBool>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 活动连接：独占底层传输，提供两个数据通道
///
/// 整个连接被释放后会话槽才空出来。
pub struct ActiveConnection {
    label: String,
    source: Box<dyn StreamSource>,
    _guard: SessionGuard,
}

impl ActiveConnection {
    pub(crate) fn new(label: String, source: Box<dyn StreamSource>, guard: SessionGuard) -> Self {
        info!("🔌 已连接设备: {}", label);
        Self {
            label,
            source,
            _guard: guard,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl StreamSource for ActiveConnection {
    fn description(&self) -> String {
        format!("{} ({})", self.label, self.source.description())
    }

    fn start(&mut self, kind: StreamKind) -> Result<StreamChannels> {
        self.source.start(kind)
    }

    fn stop(&mut self) {
        self.source.stop();
    }
}
