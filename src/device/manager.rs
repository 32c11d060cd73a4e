use super::{ActiveConnection, CandidateConnection, DeviceContext, SessionSlot};
use crate::core::{PlayerError, Result, StreamKind};
use log::{debug, error, info, warn};

/// 设备连接管理器
///
/// 发现候选设备、保证同一时间只有一个活动连接，并把错误保存为可查询的 `last_error`，
/// 不向 GUI 抛出。
pub struct ConnectionManager<C: DeviceContext> {
    context: Option<C>,
    candidates: Vec<Box<dyn CandidateConnection>>,
    /// `Some("")` 连接第一个设备，`Some(s)` 连接标识以 `s` 结尾的设备
    auto_connect: Option<String>,
    last_error: Option<String>,
    session: SessionSlot,
    kind: StreamKind,
}

impl<C: DeviceContext> ConnectionManager<C> {
    /// 设备上下文创建失败时，错误保存到 `last_error`，之后的刷新都不会有结果
    pub fn new(context: Result<C>, kind: StreamKind, auto_connect: Option<String>) -> Self {
        let (context, last_error) = match context {
            Ok(context) => (Some(context), None),
            Err(e) => {
                error!("❌ 无法创建设备上下文: {}", e);
                (None, Some(e.to_string()))
            }
        };

        Self {
            context,
            candidates: Vec::new(),
            auto_connect,
            last_error,
            session: SessionSlot::new(),
            kind,
        }
    }

    /// 与其它管理器共用同一个会话槽
    pub fn with_session_slot(mut self, session: SessionSlot) -> Self {
        self.session = session;
        self
    }

    pub fn candidates(&self) -> &[Box<dyn CandidateConnection>] {
        &self.candidates
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn auto_connect(&self) -> Option<&str> {
        self.auto_connect.as_deref()
    }

    pub fn cancel_auto_connect(&mut self) {
        if self.auto_connect.take().is_some() {
            info!("已取消自动连接");
        }
    }

    pub fn has_active_session(&self) -> bool {
        self.session.is_active()
    }

    /// 重新扫描设备
    ///
    /// 新列表替换旧列表（旧的候选设备被释放）。扫描失败时保留旧列表。
    pub fn discover(&mut self) -> Result<()> {
        let context = self.context.as_mut().ok_or_else(|| {
            PlayerError::DiscoveryError("设备上下文不可用".to_string())
        })?;

        let found = context.find_devices()?;
        debug!("发现 {} 个设备", found.len());
        self.candidates = found;
        Ok(())
    }

    /// 刷新设备列表，满足自动连接条件时连接并返回
    pub fn refresh(&mut self) -> Option<ActiveConnection> {
        self.last_error = None;

        if let Err(e) = self.discover() {
            warn!("⚠️ 设备枚举失败: {}", e);
            self.last_error = Some(e.to_string());
            return None;
        }

        let filter = self.auto_connect.as_deref()?;
        let index = self
            .candidates
            .iter()
            .position(|c| filter.is_empty() || c.label().ends_with(filter))?;

        self.auto_connect = None;
        match self.try_connect(index) {
            Ok(connection) => Some(connection),
            Err(e) => {
                // 自动连接失败后回到手动选择，不显示错误
                warn!("⚠️ 自动连接失败: {}", e);
                None
            }
        }
    }

    /// GUI 入口：连接第 `index` 个设备，失败时设置 `last_error`
    pub fn connect(&mut self, index: usize) -> Option<ActiveConnection> {
        self.auto_connect = None;
        self.last_error = None;

        match self.try_connect(index) {
            Ok(connection) => Some(connection),
            Err(e) => {
                error!("❌ 连接设备失败: {}", e);
                self.last_error = Some(e.to_string());
                None
            }
        }
    }

    /// 连接第 `index` 个设备
    ///
    /// 成功后其它候选设备全部释放；失败时列表保持原样。
    pub fn try_connect(&mut self, index: usize) -> Result<ActiveConnection> {
        if index >= self.candidates.len() {
            return Err(PlayerError::ConnectError(format!("无效的设备序号: {}", index)));
        }

        let guard = self
            .session
            .try_acquire()
            .ok_or_else(|| PlayerError::ConnectError("已有活动连接".to_string()))?;

        let mut chosen = self.candidates.remove(index);
        if !chosen.is_alive() {
            warn!("设备 {} 可能已断开", chosen.label());
        }
        info!("🔌 连接设备: {}", chosen.label());

        match chosen.open(self.kind) {
            Ok(source) => {
                let label = chosen.label().to_string();
                let others = std::mem::take(&mut self.candidates);
                if !others.is_empty() {
                    debug!("释放其它 {} 个候选设备", others.len());
                }
                drop(others);
                drop(chosen);
                Ok(ActiveConnection::new(label, source, guard))
            }
            Err(e) => {
                self.candidates.insert(index, chosen);
                drop(guard);
                Err(match e {
                    PlayerError::ConnectError(_) => e,
                    other => PlayerError::ConnectError(other.to_string()),
                })
            }
        }
    }
}
