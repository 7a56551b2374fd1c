//! 租户连接池注册表
//!
//! 注册表条目要么已就绪，要么正在初始化。同一租户的并发请求共享同一次创建：
//! 第一个请求安装占位条目并在受跟踪的后台任务中完成解析和连接，其余请求通过
//! `watch` 通道等待结果。调用方被取消不会中断创建。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use retail_common::TenantId;
use retail_errors::{AppError, AppResult};
use retail_ports::TenantConnector;
use retail_telemetry::{
    TENANT_POOL_EVICTIONS_TOTAL, TENANT_POOL_OPEN_FAILURES_TOTAL, TENANT_POOL_OPEN_TOTAL,
    TENANT_POOL_READY,
};
use tokio::sync::watch;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::{ConnectionHandle, HandleState, SchemaResolver, parse_tenant};

type Registry = Arc<Mutex<HashMap<TenantId, Arc<RegistryEntry>>>>;

struct RegistryEntry {
    handle: Arc<ConnectionHandle>,
    ready: watch::Receiver<Option<AppResult<()>>>,
}

/// 注册表快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// 已就绪的租户数
    pub ready: usize,
    /// 正在初始化的租户数
    pub initializing: usize,
    /// 累计成功建立的连接池数
    pub opened_total: u64,
}

/// 多租户连接池管理器
pub struct ConnectionPoolManager {
    resolver: Arc<SchemaResolver>,
    connector: Arc<dyn TenantConnector>,
    registry: Registry,
    tracker: TaskTracker,
    opened: Arc<AtomicU64>,
}

impl ConnectionPoolManager {
    pub fn new(resolver: Arc<SchemaResolver>, connector: Arc<dyn TenantConnector>) -> Self {
        Self {
            resolver,
            connector,
            registry: Arc::new(Mutex::new(HashMap::new())),
            tracker: TaskTracker::new(),
            opened: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn resolver(&self) -> &Arc<SchemaResolver> {
        &self.resolver
    }

    /// 获取租户连接池句柄，必要时创建
    pub async fn get_connection(&self, tenant_id: &str) -> AppResult<Arc<ConnectionHandle>> {
        let tenant = parse_tenant(tenant_id)?;
        self.connection(&tenant).await
    }

    pub async fn connection(&self, tenant: &TenantId) -> AppResult<Arc<ConnectionHandle>> {
        let entry = {
            let mut registry = self.registry.lock();
            match registry.get(tenant) {
                Some(entry) => entry.clone(),
                None => {
                    let entry = self.start_creation(tenant);
                    registry.insert(tenant.clone(), entry.clone());
                    entry
                }
            }
        };

        if entry.handle.is_ready() {
            entry.handle.touch();
            return Ok(entry.handle.clone());
        }

        let mut ready = entry.ready.clone();
        let outcome = match ready.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };

        match outcome {
            // 创建成功后仍可能被 evict 或 shutdown_all 关闭
            Some(Ok(())) if !entry.handle.is_ready() => {
                warn!(
                    tenant_id = %tenant,
                    handle_id = entry.handle.id(),
                    "Tenant pool closed before it was handed out"
                );
                Err(AppError::connection_init(tenant.as_str()))
            }
            Some(Ok(())) => {
                entry.handle.touch();
                Ok(entry.handle.clone())
            }
            Some(Err(e)) => Err(e),
            None => {
                // 创建任务未发布结果就结束了
                remove_if_current(&self.registry, tenant, &entry.handle);
                error!(tenant_id = %tenant, "Tenant pool creation ended without a result");
                Err(AppError::connection_init(tenant.as_str()))
            }
        }
    }

    /// 安装占位句柄并在后台完成创建
    fn start_creation(&self, tenant: &TenantId) -> Arc<RegistryEntry> {
        let handle = Arc::new(ConnectionHandle::new(tenant.clone()));
        handle.begin_init();

        let (tx, rx) = watch::channel(None);
        let entry = Arc::new(RegistryEntry {
            handle: handle.clone(),
            ready: rx,
        });

        let resolver = self.resolver.clone();
        let connector = self.connector.clone();
        let registry = self.registry.clone();
        let opened = self.opened.clone();
        let tenant = tenant.clone();

        debug!(tenant_id = %tenant, handle_id = handle.id(), "Creating tenant pool");

        self.tracker.spawn(async move {
            let result = open(&resolver, connector.as_ref(), &tenant, &handle).await;

            match &result {
                Ok(()) => {
                    opened.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(TENANT_POOL_OPEN_TOTAL).increment(1);
                    info!(tenant_id = %tenant, handle_id = handle.id(), "Tenant pool ready");
                }
                Err(e) => {
                    metrics::counter!(TENANT_POOL_OPEN_FAILURES_TOTAL).increment(1);
                    remove_if_current(&registry, &tenant, &handle);
                    handle.close().await;
                    warn!(tenant_id = %tenant, error = %e, "Tenant pool creation failed");
                }
            }

            publish_ready_gauge(&registry);
            tx.send_replace(Some(result));
        });

        entry
    }

    /// 关闭并移除单个租户的连接池，不影响其他租户
    ///
    /// 同时丢弃该租户的目录缓存。正在初始化的句柄被关闭后，
    /// 新建的连接池会被丢弃而不是发布。
    pub async fn evict(&self, tenant: &TenantId) -> bool {
        // 下次创建重新查询目录，以便拿到轮换后的连接参数
        self.resolver.invalidate(tenant);

        let entry = self.registry.lock().remove(tenant);
        let Some(entry) = entry else {
            return false;
        };

        let state = entry.handle.state();
        entry.handle.close().await;
        metrics::counter!(TENANT_POOL_EVICTIONS_TOTAL).increment(1);
        publish_ready_gauge(&self.registry);
        info!(tenant_id = %tenant, previous_state = ?state, "Tenant pool evicted");
        true
    }

    /// 回收空闲超过 `max_idle` 的就绪连接池，返回被回收的租户
    pub async fn evict_idle(&self, max_idle: Duration) -> Vec<TenantId> {
        let idle: Vec<(TenantId, Arc<ConnectionHandle>)> = {
            let mut registry = self.registry.lock();
            let tenants: Vec<TenantId> = registry
                .iter()
                .filter(|(_, e)| e.handle.is_ready() && e.handle.idle_for() >= max_idle)
                .map(|(t, _)| t.clone())
                .collect();
            tenants
                .into_iter()
                .filter_map(|t| registry.remove(&t).map(|e| (t, e.handle.clone())))
                .collect()
        };

        for (tenant, handle) in &idle {
            handle.close().await;
            metrics::counter!(TENANT_POOL_EVICTIONS_TOTAL).increment(1);
            debug!(tenant_id = %tenant, "Idle tenant pool evicted");
        }

        if !idle.is_empty() {
            publish_ready_gauge(&self.registry);
            info!(count = idle.len(), "Idle tenant pools evicted");
        }

        idle.into_iter().map(|(t, _)| t).collect()
    }

    /// 等待进行中的创建结束，然后关闭全部连接池
    ///
    /// 之后管理器仍可使用，新的请求会重新创建句柄。
    pub async fn shutdown_all(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();

        let drained: Vec<(TenantId, Arc<RegistryEntry>)> =
            self.registry.lock().drain().collect();

        let mut closed = 0;
        for (tenant, entry) in drained {
            if entry.handle.close().await {
                closed += 1;
                debug!(tenant_id = %tenant, "Tenant pool closed");
            }
        }

        metrics::gauge!(TENANT_POOL_READY).set(0.0);
        info!(closed, "All tenant pools closed");
    }

    pub fn stats(&self) -> PoolStats {
        let registry = self.registry.lock();
        let mut stats = PoolStats {
            opened_total: self.opened.load(Ordering::Relaxed),
            ..PoolStats::default()
        };

        for entry in registry.values() {
            match entry.handle.state() {
                HandleState::Ready => stats.ready += 1,
                HandleState::Uninitialized | HandleState::Initializing => stats.initializing += 1,
                HandleState::Closed => {}
            }
        }
        stats
    }

    /// 已就绪的租户，按 ID 排序
    pub fn tenants(&self) -> Vec<TenantId> {
        let mut tenants: Vec<TenantId> = self
            .registry
            .lock()
            .iter()
            .filter(|(_, e)| e.handle.is_ready())
            .map(|(t, _)| t.clone())
            .collect();
        tenants.sort();
        tenants
    }

    /// 已就绪租户的句柄
    pub fn handles(&self) -> Vec<Arc<ConnectionHandle>> {
        self.registry
            .lock()
            .values()
            .filter(|e| e.handle.is_ready())
            .map(|e| e.handle.clone())
            .collect()
    }
}

async fn open(
    resolver: &SchemaResolver,
    connector: &dyn TenantConnector,
    tenant: &TenantId,
    handle: &ConnectionHandle,
) -> AppResult<()> {
    let params = resolver.resolve_tenant(tenant).await?;

    let store = connector.connect(tenant, &params).await.map_err(|e| {
        error!(tenant_id = %tenant, error = %e, "Failed to connect to tenant database");
        AppError::connection_init(tenant.as_str())
    })?;

    if let Err(store) = handle.attach(store) {
        store.close().await;
        info!(tenant_id = %tenant, "Tenant evicted during initialisation, new pool discarded");
        return Err(AppError::connection_init(tenant.as_str()));
    }

    Ok(())
}

fn remove_if_current(registry: &Registry, tenant: &TenantId, handle: &Arc<ConnectionHandle>) {
    let mut registry = registry.lock();
    if registry
        .get(tenant)
        .is_some_and(|e| Arc::ptr_eq(&e.handle, handle))
    {
        registry.remove(tenant);
    }
}

fn publish_ready_gauge(registry: &Registry) {
    let ready = registry
        .lock()
        .values()
        .filter(|e| e.handle.is_ready())
        .count();
    metrics::gauge!(TENANT_POOL_READY).set(ready as f64);
}
