//! 租户 ID → 物理连接参数

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use retail_common::{RetryConfig, TenantId, with_retry};
use retail_errors::{AppError, AppResult};
use retail_ports::{ConnectionParams, TenantDirectory};
use tracing::{debug, error, warn};

use crate::parse_tenant;

/// 租户目录查询，带 TTL 缓存
///
/// 只缓存查到的结果；租户不存在的答复不缓存，新开通的租户无需等待过期。
/// 目录不可用时按 `RetryConfig` 重试，默认不重试。
pub struct SchemaResolver {
    directory: Arc<dyn TenantDirectory>,
    cache: RwLock<HashMap<TenantId, (ConnectionParams, Instant)>>,
    ttl: Duration,
    retry: RetryConfig,
}

impl SchemaResolver {
    /// `ttl` 为零时不缓存
    pub fn new(directory: Arc<dyn TenantDirectory>, ttl: Duration) -> Self {
        Self {
            directory,
            cache: RwLock::new(HashMap::new()),
            ttl,
            retry: RetryConfig::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// 校验格式后解析
    pub async fn resolve(&self, tenant_id: &str) -> AppResult<ConnectionParams> {
        let tenant = parse_tenant(tenant_id)?;
        self.resolve_tenant(&tenant).await
    }

    pub async fn resolve_tenant(&self, tenant: &TenantId) -> AppResult<ConnectionParams> {
        if let Some(params) = self.cached(tenant) {
            debug!(tenant_id = %tenant, "Tenant directory cache hit");
            return Ok(params);
        }

        let lookup = with_retry(
            &self.retry,
            "tenant_directory_lookup",
            || self.directory.lookup(tenant),
            |_| true,
        )
        .await;

        match lookup {
            Ok(Some(params)) => {
                if !self.ttl.is_zero() {
                    self.cache
                        .write()
                        .insert(tenant.clone(), (params.clone(), Instant::now()));
                }
                Ok(params)
            }
            Ok(None) => {
                warn!(tenant_id = %tenant, "Tenant not found in directory");
                Err(AppError::tenant_not_found(tenant.as_str()))
            }
            Err(e) => {
                error!(tenant_id = %tenant, error = %e, "Tenant directory lookup failed");
                Err(AppError::directory_unavailable(tenant.as_str()))
            }
        }
    }

    fn cached(&self, tenant: &TenantId) -> Option<ConnectionParams> {
        let cache = self.cache.read();
        let (params, stored_at) = cache.get(tenant)?;
        (stored_at.elapsed() < self.ttl).then(|| params.clone())
    }

    /// 丢弃单个租户的缓存
    pub fn invalidate(&self, tenant: &TenantId) {
        self.cache.write().remove(tenant);
    }

    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    /// 当前缓存条目数（含已过期未清理的）
    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}
