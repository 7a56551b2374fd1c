//! 基于控制库的租户目录
//!
//! ```sql
//! CREATE TABLE tenant_directory (
//!     tenant_id      VARCHAR(64) PRIMARY KEY,
//!     host           TEXT NOT NULL,
//!     port           INTEGER NOT NULL DEFAULT 5432,
//!     database_name  TEXT NOT NULL,
//!     schema_name    TEXT,
//!     username       TEXT NOT NULL,
//!     password       TEXT NOT NULL,
//!     enabled        BOOLEAN NOT NULL DEFAULT TRUE
//! );
//! ```

use async_trait::async_trait;
use retail_common::TenantId;
use retail_ports::{ConnectionParams, DirectoryError, TenantDirectory};
use secrecy::Secret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

#[derive(sqlx::FromRow)]
struct DirectoryRow {
    host: String,
    port: i32,
    database_name: String,
    schema_name: Option<String>,
    username: String,
    password: String,
}

impl TryFrom<DirectoryRow> for ConnectionParams {
    type Error = DirectoryError;

    fn try_from(row: DirectoryRow) -> Result<Self, Self::Error> {
        let port = u16::try_from(row.port)
            .map_err(|_| DirectoryError(format!("invalid port {} in tenant directory", row.port)))?;

        Ok(Self {
            host: row.host,
            port,
            database: row.database_name,
            schema: row.schema_name,
            username: row.username,
            password: Secret::new(row.password),
        })
    }
}

/// 从 `tenant_directory` 表查询租户连接参数，停用的租户视为不存在
#[derive(Clone)]
pub struct PgTenantDirectory {
    pool: PgPool,
}

impl PgTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 连接控制库
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, DirectoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| DirectoryError(e.to_string()))?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn lookup(&self, tenant: &TenantId) -> Result<Option<ConnectionParams>, DirectoryError> {
        sqlx::query_as::<_, DirectoryRow>(
            r#"
            SELECT host, port, database_name, schema_name, username, password
            FROM tenant_directory
            WHERE tenant_id = $1 AND enabled
            "#,
        )
        .bind(tenant.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DirectoryError(e.to_string()))?
        .map(ConnectionParams::try_from)
        .transpose()
    }
}
