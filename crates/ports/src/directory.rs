//! 租户目录 trait 定义

use async_trait::async_trait;
use retail_common::TenantId;
use secrecy::Secret;
use thiserror::Error;

/// 租户物理连接参数
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    /// 租户数据所在 schema，为空时使用数据库默认 search_path
    pub schema: Option<String>,
    pub username: String,
    pub password: Secret<String>,
}

/// 目录查询失败（目录本身不可用，而不是租户不存在）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tenant directory lookup failed: {0}")]
pub struct DirectoryError(pub String);

/// 租户目录
///
/// 把租户 ID 映射为物理连接参数。租户不存在返回 `Ok(None)`。
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn lookup(&self, tenant: &TenantId) -> Result<Option<ConnectionParams>, DirectoryError>;
}
