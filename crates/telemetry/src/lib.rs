//! retail-telemetry - 可观测性库

use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// 租户连接池创建次数
pub const TENANT_POOL_OPEN_TOTAL: &str = "tenant_pool_open_total";
/// 租户连接池创建失败次数
pub const TENANT_POOL_OPEN_FAILURES_TOTAL: &str = "tenant_pool_open_failures_total";
/// 租户连接池回收次数
pub const TENANT_POOL_EVICTIONS_TOTAL: &str = "tenant_pool_evictions_total";
/// 当前就绪的租户连接池数量
pub const TENANT_POOL_READY: &str = "tenant_pool_ready";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    Tracing(String),

    #[error("Failed to install Prometheus recorder: {0}")]
    Metrics(String),
}

/// 初始化 tracing
pub fn init_tracing(log_level: &str) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| TelemetryError::Tracing(e.to_string()))
}

/// 初始化 JSON 格式的 tracing（生产环境）
pub fn init_tracing_json(log_level: &str) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| TelemetryError::Tracing(e.to_string()))
}

/// 初始化 Prometheus metrics 并登记租户连接池指标
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;

    describe_tenant_metrics();
    Ok(handle)
}

/// 登记指标说明，未安装 recorder 时为空操作
pub fn describe_tenant_metrics() {
    metrics::describe_counter!(TENANT_POOL_OPEN_TOTAL, "Tenant pools opened");
    metrics::describe_counter!(
        TENANT_POOL_OPEN_FAILURES_TOTAL,
        "Tenant pool creations that failed"
    );
    metrics::describe_counter!(TENANT_POOL_EVICTIONS_TOTAL, "Tenant pools evicted");
    metrics::describe_gauge!(TENANT_POOL_READY, "Tenant pools currently ready");
}

/// 健康检查状态
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub checks: Vec<HealthCheck>,
}

#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub name: String,
    pub healthy: bool,
    pub message: Option<String>,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            healthy: true,
            checks: Vec::new(),
        }
    }

    pub fn add_check(&mut self, name: impl Into<String>, healthy: bool, message: Option<String>) {
        if !healthy {
            self.healthy = false;
        }
        self.checks.push(HealthCheck {
            name: name.into(),
            healthy,
            message,
        });
    }

    /// 查找指定名称的检查项
    pub fn check(&self, name: &str) -> Option<&HealthCheck> {
        self.checks.iter().find(|c| c.name == name)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}
