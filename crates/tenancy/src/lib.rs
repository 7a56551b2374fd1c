//! retail-tenancy - 多租户动态数据源与租户仓储
//!
//! 调用链：`TenantRepositoryFactory` → `ConnectionPoolManager` → `SchemaResolver`
//! → `TenantConnector`。每个租户最多一个连接池句柄，同一租户的并发创建合并为一次。

mod directory;
mod entity;
mod handle;
mod pool_manager;
mod repository;
mod resolver;

pub use directory::*;
pub use entity::*;
pub use handle::*;
pub use pool_manager::*;
pub use repository::*;
pub use resolver::*;

use retail_common::TenantId;
use retail_errors::{AppError, AppResult};

/// 校验租户 ID 格式，不做任何 I/O
pub fn parse_tenant(raw: &str) -> AppResult<TenantId> {
    TenantId::parse(raw).map_err(|e| AppError::validation(format!("invalid tenant id: {e}")))
}
