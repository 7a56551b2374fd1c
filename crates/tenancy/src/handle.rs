//! 租户连接池句柄

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use retail_common::TenantId;
use retail_errors::{AppError, AppResult};
use retail_ports::{StoreStatus, TenantStore};
use tracing::warn;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// 句柄生命周期状态，只能向前迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandleState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    Closed = 3,
}

impl HandleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Initializing,
            2 => Self::Ready,
            _ => Self::Closed,
        }
    }
}

/// 单个租户的连接池句柄
///
/// 由注册表中该租户的条目持有，永远不会服务其他租户。
pub struct ConnectionHandle {
    id: u64,
    tenant: TenantId,
    state: AtomicU8,
    store: OnceLock<Arc<dyn TenantStore>>,
    created_at: DateTime<Utc>,
    last_used: Mutex<Instant>,
}

impl ConnectionHandle {
    pub(crate) fn new(tenant: TenantId) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            tenant,
            state: AtomicU8::new(HandleState::Uninitialized as u8),
            store: OnceLock::new(),
            created_at: Utc::now(),
            last_used: Mutex::new(Instant::now()),
        }
    }

    /// 进程内唯一的句柄 ID
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn state(&self) -> HandleState {
        HandleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == HandleState::Ready
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// 距上次使用的时长
    pub fn idle_for(&self) -> Duration {
        self.last_used.lock().elapsed()
    }

    pub(crate) fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    /// 连接池状态，未就绪时为空
    pub fn status(&self) -> StoreStatus {
        self.store().map(|s| s.status()).unwrap_or_default()
    }

    /// 连通性检查，失败时不携带驱动信息
    pub async fn ping(&self) -> AppResult<()> {
        let store = self
            .store()
            .ok_or_else(|| AppError::unavailable(self.tenant.as_str()))?;

        store.ping().await.map_err(|e| {
            warn!(tenant_id = %self.tenant, error = %e, "Tenant pool ping failed");
            AppError::unavailable(self.tenant.as_str())
        })
    }

    /// 就绪状态下的连接池
    pub(crate) fn store(&self) -> Option<Arc<dyn TenantStore>> {
        if self.is_ready() {
            self.store.get().cloned()
        } else {
            None
        }
    }

    pub(crate) fn begin_init(&self) {
        let _ = self.state.compare_exchange(
            HandleState::Uninitialized as u8,
            HandleState::Initializing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// 挂上新建的连接池并进入 `Ready`
    ///
    /// 句柄在初始化期间被关闭时返回 `Err`，连接池交还给调用方关闭。
    pub(crate) fn attach(&self, store: Arc<dyn TenantStore>) -> Result<(), Arc<dyn TenantStore>> {
        if self.store.set(store.clone()).is_err() {
            return Err(store);
        }

        self.state
            .compare_exchange(
                HandleState::Initializing as u8,
                HandleState::Ready as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|_| store)
    }

    /// 进入 `Closed` 并关闭连接池，重复调用无效果
    ///
    /// 返回本次调用是否执行了关闭。
    pub(crate) async fn close(&self) -> bool {
        let previous = self
            .state
            .swap(HandleState::Closed as u8, Ordering::AcqRel);
        if previous == HandleState::Closed as u8 {
            return false;
        }

        if let Some(store) = self.store.get() {
            store.close().await;
        }
        true
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("tenant", &self.tenant)
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .finish()
    }
}
