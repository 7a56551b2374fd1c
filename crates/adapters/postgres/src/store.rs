//! PostgreSQL 租户记录存储
//!
//! 每种实体一张表，位于租户 schema 内（由连接的 `search_path` 决定）：
//!
//! ```sql
//! CREATE TABLE products (
//!     id          UUID PRIMARY KEY,
//!     data        JSONB NOT NULL,
//!     is_deleted  BOOLEAN NOT NULL DEFAULT FALSE,
//!     deleted_at  TIMESTAMPTZ,
//!     created_at  TIMESTAMPTZ NOT NULL,
//!     created_by  UUID,
//!     updated_at  TIMESTAMPTZ NOT NULL,
//!     updated_by  UUID
//! );
//! CREATE UNIQUE INDEX products_sku_key ON products ((data->>'sku')) WHERE NOT is_deleted;
//! ```
//!
//! 建表由迁移流程负责，这里只做读写。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use retail_common::{AuditInfo, EntityKind, UserId};
use retail_ports::{
    ListQuery, RecordStore, StoreError, StoreStatus, StoreTransaction, StoredRecord, TenantStore,
};
use serde_json::Value;
use sqlx::{PgExecutor, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::{PgStoreTransaction, TransactionOptions, classify};

const COLUMNS: &str =
    "id, data, is_deleted, deleted_at, created_at, created_by, updated_at, updated_by";

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: Uuid,
    data: Value,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    created_by: Option<Uuid>,
    updated_at: DateTime<Utc>,
    updated_by: Option<Uuid>,
}

impl TryFrom<RecordRow> for StoredRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let Value::Object(data) = row.data else {
            return Err(StoreError::Decode(format!(
                "record {} data is not a JSON object",
                row.id
            )));
        };

        Ok(Self {
            id: row.id,
            data,
            deleted: row.is_deleted,
            deleted_at: row.deleted_at,
            audit: AuditInfo {
                created_at: row.created_at,
                created_by: row.created_by.map(UserId::from_uuid),
                updated_at: row.updated_at,
                updated_by: row.updated_by.map(UserId::from_uuid),
            },
        })
    }
}

pub(crate) async fn fetch_record<'e, E>(
    executor: E,
    kind: EntityKind,
    id: Uuid,
    include_deleted: bool,
) -> Result<Option<StoredRecord>, StoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "SELECT {COLUMNS} FROM {} WHERE id = $1 AND ($2 OR NOT is_deleted)",
        kind.table_name()
    );

    sqlx::query_as::<_, RecordRow>(&sql)
        .bind(id)
        .bind(include_deleted)
        .fetch_optional(executor)
        .await
        .map_err(classify)?
        .map(StoredRecord::try_from)
        .transpose()
}

pub(crate) async fn list_records<'e, E>(
    executor: E,
    kind: EntityKind,
    query: &ListQuery,
) -> Result<Vec<StoredRecord>, StoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "SELECT {COLUMNS} FROM {} \
         WHERE ($1 OR NOT is_deleted) AND data @> $2 \
         ORDER BY created_at, id LIMIT $3 OFFSET $4",
        kind.table_name()
    );

    sqlx::query_as::<_, RecordRow>(&sql)
        .bind(query.include_deleted)
        .bind(query.filter.to_json())
        .bind(query.limit.map(i64::from))
        .bind(i64::from(query.offset))
        .fetch_all(executor)
        .await
        .map_err(classify)?
        .into_iter()
        .map(StoredRecord::try_from)
        .collect()
}

pub(crate) async fn count_records<'e, E>(
    executor: E,
    kind: EntityKind,
    query: &ListQuery,
) -> Result<u64, StoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE ($1 OR NOT is_deleted) AND data @> $2",
        kind.table_name()
    );

    let count: i64 = sqlx::query_scalar(&sql)
        .bind(query.include_deleted)
        .bind(query.filter.to_json())
        .fetch_one(executor)
        .await
        .map_err(classify)?;

    Ok(count.max(0) as u64)
}

pub(crate) async fn insert_record<'e, E>(
    executor: E,
    kind: EntityKind,
    record: &StoredRecord,
) -> Result<(), StoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "INSERT INTO {} ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        kind.table_name()
    );

    sqlx::query(&sql)
        .bind(record.id)
        .bind(Value::Object(record.data.clone()))
        .bind(record.deleted)
        .bind(record.deleted_at)
        .bind(record.audit.created_at)
        .bind(record.audit.created_by.as_ref().map(|u| u.0))
        .bind(record.audit.updated_at)
        .bind(record.audit.updated_by.as_ref().map(|u| u.0))
        .execute(executor)
        .await
        .map_err(classify)?;

    Ok(())
}

pub(crate) async fn replace_record<'e, E>(
    executor: E,
    kind: EntityKind,
    record: &StoredRecord,
) -> Result<bool, StoreError>
where
    E: PgExecutor<'e>,
{
    let sql = format!(
        "UPDATE {} SET data = $2, is_deleted = $3, deleted_at = $4, \
         updated_at = $5, updated_by = $6 WHERE id = $1",
        kind.table_name()
    );

    let result = sqlx::query(&sql)
        .bind(record.id)
        .bind(Value::Object(record.data.clone()))
        .bind(record.deleted)
        .bind(record.deleted_at)
        .bind(record.audit.updated_at)
        .bind(record.audit.updated_by.as_ref().map(|u| u.0))
        .execute(executor)
        .await
        .map_err(classify)?;

    Ok(result.rows_affected() > 0)
}

/// 单个租户 schema 的 PostgreSQL 连接池
pub struct PgTenantStore {
    pool: PgPool,
    transaction_options: TransactionOptions,
}

impl PgTenantStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            transaction_options: TransactionOptions::default(),
        }
    }

    pub fn with_transaction_options(mut self, options: TransactionOptions) -> Self {
        self.transaction_options = options;
        self
    }

    /// 获取连接池引用
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgTenantStore {
    async fn fetch(
        &self,
        kind: EntityKind,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<StoredRecord>, StoreError> {
        fetch_record(&self.pool, kind, id, include_deleted).await
    }

    async fn list(
        &self,
        kind: EntityKind,
        query: &ListQuery,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        list_records(&self.pool, kind, query).await
    }

    async fn count(&self, kind: EntityKind, query: &ListQuery) -> Result<u64, StoreError> {
        count_records(&self.pool, kind, query).await
    }

    async fn insert(&self, kind: EntityKind, record: &StoredRecord) -> Result<(), StoreError> {
        insert_record(&self.pool, kind, record).await
    }

    async fn replace(&self, kind: EntityKind, record: &StoredRecord) -> Result<bool, StoreError> {
        replace_record(&self.pool, kind, record).await
    }
}

#[async_trait]
impl TenantStore for PgTenantStore {
    fn records(&self) -> &dyn RecordStore {
        self
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = PgStoreTransaction::begin(&self.pool, &self.transaction_options).await?;
        Ok(Box::new(tx))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("PostgreSQL tenant pool closed");
    }

    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    fn status(&self) -> StoreStatus {
        StoreStatus {
            size: self.pool.size(),
            idle: self.pool.num_idle() as u32,
        }
    }
}
