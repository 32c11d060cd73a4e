use crate::core::{PlayerError, Result, StreamPacket};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{error, info};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 共享的取消信号，泵线程每次循环都会检查
#[derive(Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// 泵线程退出时的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub packets: u64,
    /// 因取消信号退出（否则是通道断开）
    pub cancelled: bool,
}

/// 启动一个泵线程：按到达顺序把通道里的数据交给 `handler`
///
/// 每次等待最多 `poll` 时长，空闲时也能及时看到取消信号；通道断开时退出。
pub fn spawn_pump<F>(
    name: &str,
    rx: Receiver<StreamPacket>,
    cancel: CancelSignal,
    poll: Duration,
    mut handler: F,
) -> Result<JoinHandle<PumpReport>>
where
    F: FnMut(StreamPacket) + Send + 'static,
{
    let label = name.to_string();
    thread::Builder::new()
        .name(format!("{}-pump", name))
        .spawn(move || {
            info!("{} ▶ {} 泵线程启动", log_ctx(), label);
            let mut report = PumpReport::default();

            while !cancel.is_cancelled() {
                match rx.recv_timeout(poll) {
                    Ok(packet) => {
                        report.packets += 1;
                        handler(packet);
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => {
                        info!("{} 📄 {} 通道已断开", log_ctx(), label);
                        break;
                    }
                }
            }

            report.cancelled = cancel.is_cancelled();
            info!(
                "{} 🛑 {} 泵线程退出（共处理 {} 个数据块）",
                log_ctx(),
                label,
                report.packets
            );
            report
        })
        .map_err(|e| {
            error!("{} ❌ 无法启动 {} 泵线程: {}", log_ctx(), name, e);
            PlayerError::SourceError(format!("无法启动 {} 泵线程: {}", name, e))
        })
}
