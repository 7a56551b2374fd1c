//! PostgreSQL 配置模块
//!
//! 连接池模板配置：池大小、超时、SSL 等对所有租户统一，
//! 主机、库名、账号和 schema 在连接时由租户目录给出。

use std::str::FromStr;
use std::time::Duration;

use retail_ports::ConnectionParams;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};

/// SSL 模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// 禁用 SSL
    Disable,
    /// 允许 SSL（如果服务器支持）
    #[default]
    Prefer,
    /// 要求 SSL
    Require,
    /// 验证 CA 证书
    VerifyCa,
    /// 验证完整证书链
    VerifyFull,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }

    fn to_pg(self) -> PgSslMode {
        match self {
            SslMode::Disable => PgSslMode::Disable,
            SslMode::Prefer => PgSslMode::Prefer,
            SslMode::Require => PgSslMode::Require,
            SslMode::VerifyCa => PgSslMode::VerifyCa,
            SslMode::VerifyFull => PgSslMode::VerifyFull,
        }
    }
}

impl FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(format!("unknown ssl mode: {other}")),
        }
    }
}

/// PostgreSQL 配置
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// 主机
    pub host: String,
    /// 端口
    pub port: u16,
    /// 数据库名
    pub database: String,
    /// 用户名
    pub username: String,
    /// 密码
    pub password: Option<Secret<String>>,
    /// Schema
    pub schema: Option<String>,
    /// SSL 模式
    pub ssl_mode: SslMode,
    /// 最小连接数
    pub pool_min: u32,
    /// 最大连接数
    pub pool_max: u32,
    /// 获取连接超时
    pub acquire_timeout: Duration,
    /// 空闲超时
    pub idle_timeout: Duration,
    /// 连接最大生命周期
    pub max_lifetime: Option<Duration>,
    /// 应用名称（用于连接标识）
    pub application_name: Option<String>,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            username: "postgres".to_string(),
            password: None,
            schema: None,
            ssl_mode: SslMode::default(),
            pool_min: 1,
            pool_max: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Some(Duration::from_secs(1800)),
            application_name: None,
        }
    }
}

impl PostgresConfig {
    /// 从组件创建配置
    pub fn from_components(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    /// 以当前配置为模板，填入租户的连接参数
    pub fn for_tenant(&self, params: &ConnectionParams) -> Self {
        Self {
            host: params.host.clone(),
            port: params.port,
            database: params.database.clone(),
            username: params.username.clone(),
            password: Some(params.password.clone()),
            schema: params.schema.clone(),
            ..self.clone()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Secret::new(password.into()));
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_ssl_mode(mut self, mode: SslMode) -> Self {
        self.ssl_mode = mode;
        self
    }

    /// 设置连接池大小
    pub fn with_pool(mut self, min: u32, max: u32) -> Self {
        self.pool_min = min;
        self.pool_max = max;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// 连接选项，schema 通过 `search_path` 生效
    pub fn connect_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.username)
            .ssl_mode(self.ssl_mode.to_pg());

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        if let Some(app_name) = &self.application_name {
            options = options.application_name(app_name);
        }

        if let Some(schema) = &self.schema {
            options = options.options([("search_path", schema.as_str())]);
        }

        options
    }

    /// 不含密码的连接描述，用于日志
    pub fn redacted_target(&self) -> String {
        format!(
            "postgres://{}@{}:{}/{}?search_path={}",
            self.username,
            self.host,
            self.port,
            self.database,
            self.schema.as_deref().unwrap_or("public")
        )
    }
}
