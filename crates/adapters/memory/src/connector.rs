//! 内存连接器

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use retail_common::TenantId;
use retail_ports::{ConnectionParams, StoreError, TenantConnector, TenantStore};
use tracing::debug;

use crate::{MemoryDatabase, MemoryStore};

/// 内存连接器
///
/// 以 `host:port/database/schema` 为键保存数据库，同一物理位置的多次连接共享数据。
/// 可以注入连接延迟和连接失败，便于验证连接池管理的并发行为。
#[derive(Debug, Default)]
pub struct MemoryConnector {
    databases: Mutex<HashMap<String, Arc<MemoryDatabase>>>,
    failing: Mutex<HashSet<TenantId>>,
    latency: Duration,
    connects: AtomicUsize,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次连接前等待的时间
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 让该租户后续的连接失败
    pub fn fail_tenant(&self, tenant: &TenantId) {
        self.failing.lock().insert(tenant.clone());
    }

    /// 恢复该租户的连接
    pub fn heal_tenant(&self, tenant: &TenantId) {
        self.failing.lock().remove(tenant);
    }

    /// 累计连接次数（含失败）
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// 按连接参数取得数据库
    pub fn database(&self, params: &ConnectionParams) -> Arc<MemoryDatabase> {
        self.databases
            .lock()
            .entry(location(params))
            .or_insert_with(MemoryDatabase::new)
            .clone()
    }
}

fn location(params: &ConnectionParams) -> String {
    format!(
        "{}:{}/{}/{}",
        params.host,
        params.port,
        params.database,
        params.schema.as_deref().unwrap_or("public")
    )
}

#[async_trait]
impl TenantConnector for MemoryConnector {
    async fn connect(
        &self,
        tenant: &TenantId,
        params: &ConnectionParams,
    ) -> Result<Arc<dyn TenantStore>, StoreError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.failing.lock().contains(tenant) {
            return Err(StoreError::Connect(format!(
                "connection refused by {}:{}",
                params.host, params.port
            )));
        }

        debug!(tenant_id = %tenant, location = %location(params), "Memory store opened");
        Ok(Arc::new(MemoryStore::with_database(self.database(params))))
    }
}
