//! PostgreSQL 连接管理

use std::sync::Arc;

use async_trait::async_trait;
use retail_common::TenantId;
use retail_ports::{ConnectionParams, StoreError, TenantConnector, TenantStore};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

use crate::{PgTenantStore, PostgresConfig, TransactionOptions};

/// 创建 PostgreSQL 连接池
///
/// 至少建立 `pool_min` 条连接后才返回，连接失败统一归为 `StoreError::Connect`。
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(config.pool_max)
        .min_connections(config.pool_min)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .connect_with(config.connect_options())
        .await
        .map_err(|e| StoreError::Connect(e.to_string()))
}

/// 按租户连接参数建立连接池
#[derive(Debug, Clone, Default)]
pub struct PgConnector {
    template: PostgresConfig,
    transaction_options: TransactionOptions,
}

impl PgConnector {
    /// 以模板配置创建，模板中的主机和账号会被租户参数覆盖
    pub fn new(template: PostgresConfig) -> Self {
        Self {
            template,
            transaction_options: TransactionOptions::default(),
        }
    }

    pub fn with_transaction_options(mut self, options: TransactionOptions) -> Self {
        self.transaction_options = options;
        self
    }

    pub fn template(&self) -> &PostgresConfig {
        &self.template
    }
}

#[async_trait]
impl TenantConnector for PgConnector {
    async fn connect(
        &self,
        tenant: &TenantId,
        params: &ConnectionParams,
    ) -> Result<Arc<dyn TenantStore>, StoreError> {
        let config = self.template.for_tenant(params);
        let target = config.redacted_target();

        let pool = create_pool(&config).await.inspect_err(|e| {
            warn!(tenant_id = %tenant, target = %target, error = %e, "Failed to open tenant pool");
        })?;

        info!(
            tenant_id = %tenant,
            target = %target,
            max_connections = config.pool_max,
            "Tenant pool opened"
        );

        let store = PgTenantStore::new(pool).with_transaction_options(self.transaction_options);
        Ok(Arc::new(store))
    }
}
