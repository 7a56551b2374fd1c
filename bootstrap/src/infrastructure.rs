//! 租户基础设施装配
//!
//! 由配置组装目录、解析器、连接池管理器和仓储工厂，所有服务共享同一套实例

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use retail_adapter_postgres::{PgConnector, PgTenantDirectory, PostgresConfig, SslMode};
use retail_common::{RetryConfig, TenantId, with_retry};
use retail_config::{AppConfig, DirectoryConfig, DirectorySource};
use retail_errors::{AppError, AppResult};
use retail_ports::{ConnectionParams, TenantConnector, TenantDirectory};
use retail_telemetry::HealthStatus;
use retail_tenancy::{
    ConnectionPoolManager, SchemaResolver, StaticDirectory, TenantRepositoryFactory,
};
use secrecy::ExposeSecret;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{ShutdownController, sweep_interval};

/// 控制库连接池大小，只承载目录查询
const DIRECTORY_POOL_SIZE: u32 = 4;

/// 基础设施资源容器
pub struct Infrastructure {
    config: AppConfig,
    resolver: Arc<SchemaResolver>,
    pools: Arc<ConnectionPoolManager>,
    factory: Arc<TenantRepositoryFactory>,
}

impl Infrastructure {
    /// 从配置创建基础设施资源
    ///
    /// 控制库连接带重试；租户连接池按需惰性创建，这里不会连接任何租户库。
    pub async fn from_config(config: AppConfig) -> AppResult<Self> {
        let directory: Arc<dyn TenantDirectory> = match config.directory.source {
            DirectorySource::Static => {
                let directory = static_directory(&config.directory)?;
                info!(tenants = directory.len(), "Static tenant directory loaded");
                Arc::new(directory)
            }
            DirectorySource::Postgres => {
                let url = config
                    .directory
                    .url
                    .as_ref()
                    .ok_or_else(|| AppError::internal("directory.url is not configured"))?
                    .expose_secret()
                    .clone();

                let directory = with_retry(
                    &RetryConfig::default(),
                    "Tenant directory connection",
                    || {
                        let url = url.clone();
                        async move { PgTenantDirectory::connect(&url, DIRECTORY_POOL_SIZE).await }
                    },
                    |_| true,
                )
                .await
                .map_err(|e| AppError::internal(e.to_string()))?;
                info!("Postgres tenant directory connected");
                Arc::new(directory)
            }
        };

        let connector = PgConnector::new(connector_template(&config)?);
        info!(
            pool_min = config.pool.min_connections,
            pool_max = config.pool.max_connections,
            ssl_mode = %config.pool.ssl_mode,
            "Tenant connector configured"
        );

        Ok(Self::from_parts(config, directory, Arc::new(connector)))
    }

    /// 用现成的目录和连接器组装，配置只提供缓存和重试参数
    pub fn from_parts(
        config: AppConfig,
        directory: Arc<dyn TenantDirectory>,
        connector: Arc<dyn TenantConnector>,
    ) -> Self {
        let retry = &config.directory.retry;
        let resolver = Arc::new(
            SchemaResolver::new(directory, config.directory.cache_ttl()).with_retry(
                RetryConfig::new(
                    retry.max_attempts,
                    Duration::from_millis(retry.initial_delay_ms),
                    Duration::from_millis(retry.max_delay_ms),
                ),
            ),
        );
        let pools = Arc::new(ConnectionPoolManager::new(resolver.clone(), connector));
        let factory = Arc::new(TenantRepositoryFactory::new(pools.clone()));

        Self {
            config,
            resolver,
            pools,
            factory,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<SchemaResolver> {
        &self.resolver
    }

    pub fn pools(&self) -> &Arc<ConnectionPoolManager> {
        &self.pools
    }

    /// 仓储工厂
    pub fn factory(&self) -> Arc<TenantRepositoryFactory> {
        self.factory.clone()
    }

    /// 对每个已就绪的租户连接池做连通性检查
    pub async fn health(&self) -> HealthStatus {
        let handles = self.pools.handles();
        let results = join_all(handles.iter().map(|h| h.ping())).await;

        let mut status = HealthStatus::new();
        for (handle, result) in handles.iter().zip(results) {
            status.add_check(
                format!("tenant:{}", handle.tenant()),
                result.is_ok(),
                result.err().map(|e| e.to_string()),
            );
        }
        status
    }

    /// 回收空闲超过 `pool.handle_idle_secs` 的租户连接池
    pub async fn evict_idle(&self) -> Vec<TenantId> {
        self.pools.evict_idle(self.config.pool.handle_idle()).await
    }

    /// 启动后台空闲回收任务，直到 `shutdown` 触发
    ///
    /// `pool.handle_idle_secs = 0` 时不启动。
    pub fn spawn_idle_sweeper(&self, shutdown: ShutdownController) -> Option<JoinHandle<()>> {
        let max_idle = self.config.pool.handle_idle();
        if max_idle.is_zero() {
            info!("Idle tenant pool sweeper disabled");
            return None;
        }

        let pools = self.pools.clone();
        let interval = sweep_interval(max_idle);
        Some(tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "Idle tenant pool sweeper started");
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        pools.evict_idle(max_idle).await;
                    }
                    _ = shutdown.wait() => {
                        info!("Idle tenant pool sweeper received shutdown signal");
                        break;
                    }
                }
            }
            info!("Idle tenant pool sweeper stopped");
        }))
    }

    /// 等待进行中的创建结束并关闭全部租户连接池
    pub async fn shutdown(&self) {
        let stats = self.pools.stats();
        info!(
            ready = stats.ready,
            initializing = stats.initializing,
            "Shutting down tenant infrastructure"
        );
        self.pools.shutdown_all().await;
    }
}

/// 由 `directory.tenants` 构建静态目录
fn static_directory(config: &DirectoryConfig) -> AppResult<StaticDirectory> {
    if config.tenants.is_empty() {
        warn!("Static tenant directory is empty, every tenant lookup will fail");
    }

    config
        .tenants
        .iter()
        .map(|(raw, tenant)| {
            let id = TenantId::parse(raw).map_err(|e| {
                AppError::internal(format!("invalid tenant id {raw:?} in directory.tenants: {e}"))
            })?;
            let params = ConnectionParams {
                host: tenant.host.clone(),
                port: tenant.port,
                database: tenant.database.clone(),
                schema: tenant.schema.clone(),
                username: tenant.username.clone(),
                password: tenant.password.clone(),
            };
            Ok((id, params))
        })
        .collect()
}

/// 所有租户共用的连接池参数模板
fn connector_template(config: &AppConfig) -> AppResult<PostgresConfig> {
    let pool = &config.pool;
    let ssl_mode: SslMode = pool.ssl_mode.parse().map_err(AppError::internal)?;
    let application_name = pool
        .application_name
        .clone()
        .unwrap_or_else(|| config.app_name.clone());

    Ok(PostgresConfig::default()
        .with_ssl_mode(ssl_mode)
        .with_pool(pool.min_connections, pool.max_connections)
        .with_acquire_timeout(pool.acquire_timeout())
        .with_idle_timeout(pool.idle_timeout())
        .with_max_lifetime(pool.max_lifetime())
        .with_application_name(application_name))
}
