//! PostgreSQL 事务
//!
//! 事务对象持有一条独占连接，`commit` / `rollback` 后连接归还连接池。

use async_trait::async_trait;
use retail_common::EntityKind;
use retail_ports::{ListQuery, RecordStore, StoreError, StoreTransaction, StoredRecord};
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::classify;
use crate::store::{count_records, fetch_record, insert_record, list_records, replace_record};

/// 事务隔离级别
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    /// 读已提交（PostgreSQL 默认）
    #[default]
    ReadCommitted,
    /// 可重复读
    RepeatableRead,
    /// 可串行化
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// 事务访问模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccessMode {
    #[default]
    ReadWrite,
    ReadOnly,
}

impl AccessMode {
    pub fn as_sql(&self) -> &'static str {
        match self {
            AccessMode::ReadWrite => "READ WRITE",
            AccessMode::ReadOnly => "READ ONLY",
        }
    }
}

/// 事务选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    pub isolation_level: IsolationLevel,
    pub access_mode: AccessMode,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.access_mode = AccessMode::ReadOnly;
        self
    }

    /// 生成 SET TRANSACTION 语句，默认选项返回 `None`
    pub fn to_sql(&self) -> Option<String> {
        if *self == Self::default() {
            return None;
        }

        Some(format!(
            "SET TRANSACTION ISOLATION LEVEL {}, {}",
            self.isolation_level.as_sql(),
            self.access_mode.as_sql()
        ))
    }
}

/// 租户连接池上的一个事务
pub struct PgStoreTransaction {
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

impl PgStoreTransaction {
    /// 开启事务并应用选项
    pub async fn begin(pool: &PgPool, options: &TransactionOptions) -> Result<Self, StoreError> {
        let mut tx = pool.begin().await.map_err(classify)?;

        if let Some(sql) = options.to_sql() {
            sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .map_err(classify)?;
        }

        debug!(
            isolation = options.isolation_level.as_sql(),
            "PostgreSQL transaction started"
        );

        Ok(Self {
            tx: Mutex::new(Some(tx)),
        })
    }
}

#[async_trait]
impl RecordStore for PgStoreTransaction {
    async fn fetch(
        &self,
        kind: EntityKind,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<StoredRecord>, StoreError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::Closed)?;
        fetch_record(&mut **tx, kind, id, include_deleted).await
    }

    async fn list(
        &self,
        kind: EntityKind,
        query: &ListQuery,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::Closed)?;
        list_records(&mut **tx, kind, query).await
    }

    async fn count(&self, kind: EntityKind, query: &ListQuery) -> Result<u64, StoreError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::Closed)?;
        count_records(&mut **tx, kind, query).await
    }

    async fn insert(&self, kind: EntityKind, record: &StoredRecord) -> Result<(), StoreError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::Closed)?;
        insert_record(&mut **tx, kind, record).await
    }

    async fn replace(&self, kind: EntityKind, record: &StoredRecord) -> Result<bool, StoreError> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().ok_or(StoreError::Closed)?;
        replace_record(&mut **tx, kind, record).await
    }
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    fn records(&self) -> &dyn RecordStore {
        self
    }

    async fn commit(&self) -> Result<(), StoreError> {
        let tx = self.tx.lock().await.take().ok_or(StoreError::Closed)?;
        tx.commit().await.map_err(classify)?;
        debug!("PostgreSQL transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        let tx = self.tx.lock().await.take().ok_or(StoreError::Closed)?;
        tx.rollback().await.map_err(classify)?;
        debug!("PostgreSQL transaction rolled back");
        Ok(())
    }
}
