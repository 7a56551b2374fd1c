//! retail-config - 配置加载库
//!
//! 加载顺序（后者覆盖前者）：
//! 1. `{config_dir}/default.toml`
//! 2. `{config_dir}/{APP_ENV}.toml`
//! 3. `APP_` 前缀的环境变量，层级用 `__` 分隔，例如 `APP_POOL__MAX_CONNECTIONS=50`

use std::collections::HashMap;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use secrecy::Secret;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 租户连接池配置（对所有租户统一）
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// 单条连接最大存活时间，不设置则不限制
    #[serde(default = "default_max_lifetime_secs")]
    pub max_lifetime_secs: Option<u64>,
    /// 租户句柄空闲多久后可被回收
    #[serde(default = "default_handle_idle_secs")]
    pub handle_idle_secs: u64,
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
    pub application_name: Option<String>,
}

fn default_min_connections() -> u32 {
    1
}

fn default_max_connections() -> u32 {
    // 开发环境: 10, 生产环境: 50
    match std::env::var("APP_ENV").as_deref() {
        Ok("production") => 50,
        _ => 10,
    }
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_max_lifetime_secs() -> Option<u64> {
    Some(1800)
}

fn default_handle_idle_secs() -> u64 {
    1800
}

fn default_ssl_mode() -> String {
    "prefer".to_string()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_connections: default_min_connections(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            max_lifetime_secs: default_max_lifetime_secs(),
            handle_idle_secs: default_handle_idle_secs(),
            ssl_mode: default_ssl_mode(),
            application_name: None,
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_secs.map(Duration::from_secs)
    }

    pub fn handle_idle(&self) -> Duration {
        Duration::from_secs(self.handle_idle_secs)
    }
}

/// 租户目录来源
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectorySource {
    /// 配置文件中的静态映射
    #[default]
    Static,
    /// 控制库中的 `tenant_directory` 表
    Postgres,
}

/// 目录查询重试配置
///
/// 默认只尝试一次，即不重试。
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryRetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_retry_attempts() -> u32 {
    1
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    2000
}

impl Default for DirectoryRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// 静态目录中单个租户的连接参数
#[derive(Debug, Clone, Deserialize)]
pub struct StaticTenantConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub schema: Option<String>,
    pub username: String,
    pub password: Secret<String>,
}

fn default_port() -> u16 {
    5432
}

/// 租户目录配置
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub source: DirectorySource,
    /// 控制库连接串，`source = "postgres"` 时必填
    pub url: Option<Secret<String>>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub retry: DirectoryRetryConfig,
    /// 静态租户映射，键为租户 ID
    #[serde(default)]
    pub tenants: HashMap<String, StaticTenantConfig>,
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            source: DirectorySource::default(),
            url: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            retry: DirectoryRetryConfig::default(),
            tenants: HashMap::new(),
        }
    }
}

impl DirectoryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 输出 JSON 格式日志
    #[serde(default)]
    pub json: bool,
    /// 安装 Prometheus recorder
    #[serde(default)]
    pub metrics: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: false,
            metrics: false,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_app_env() -> String {
    std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string())
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = default_app_env();

        let figment = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("APP_").split("__"));

        Self::from_figment(figment)
    }

    /// 从已组装的 figment 提取并校验
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "pool.max_connections must be at least 1".to_string(),
            ));
        }

        if self.pool.min_connections > self.pool.max_connections {
            return Err(ConfigError::Invalid(format!(
                "pool.min_connections ({}) exceeds pool.max_connections ({})",
                self.pool.min_connections, self.pool.max_connections
            )));
        }

        if self.directory.source == DirectorySource::Postgres && self.directory.url.is_none() {
            return Err(ConfigError::Invalid(
                "directory.url is required when directory.source = \"postgres\"".to_string(),
            ));
        }

        Ok(())
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}
