//! 租户记录存储 trait 定义

use async_trait::async_trait;
use retail_common::EntityKind;
use thiserror::Error;
use uuid::Uuid;

use crate::{ListQuery, StoredRecord};

/// 存储层错误
///
/// 只在适配器与租户层之间流转，租户层负责把它归类为 `AppError`。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// 唯一性约束冲突
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// 建立连接失败
    #[error("connection failed: {0}")]
    Connect(String),

    /// 语句执行失败
    #[error("query failed: {0}")]
    Query(String),

    /// 存储内容无法解码
    #[error("decode failed: {0}")]
    Decode(String),

    /// 连接池或事务已关闭
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    pub fn unique(constraint: impl Into<String>) -> Self {
        Self::UniqueViolation {
            constraint: constraint.into(),
        }
    }
}

/// 连接池状态快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStatus {
    /// 当前连接数
    pub size: u32,
    /// 空闲连接数
    pub idle: u32,
}

/// 记录读写操作
///
/// 连接池和事务都实现该 trait，仓储代码不区分二者。
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 根据 ID 读取
    async fn fetch(
        &self,
        kind: EntityKind,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<StoredRecord>, StoreError>;

    /// 列表查询
    async fn list(&self, kind: EntityKind, query: &ListQuery)
    -> Result<Vec<StoredRecord>, StoreError>;

    /// 统计数量
    async fn count(&self, kind: EntityKind, query: &ListQuery) -> Result<u64, StoreError>;

    /// 插入新记录
    async fn insert(&self, kind: EntityKind, record: &StoredRecord) -> Result<(), StoreError>;

    /// 整体替换已有记录，记录不存在时返回 false
    async fn replace(&self, kind: EntityKind, record: &StoredRecord) -> Result<bool, StoreError>;
}

/// 绑定到单个租户 schema 的连接池
#[async_trait]
pub trait TenantStore: Send + Sync {
    fn records(&self) -> &dyn RecordStore;

    /// 开启事务
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// 轻量连通性检查
    async fn ping(&self) -> Result<(), StoreError>;

    /// 关闭连接池，已借出的连接归还后释放
    async fn close(&self);

    fn is_closed(&self) -> bool;

    fn status(&self) -> StoreStatus {
        StoreStatus::default()
    }
}

/// 租户连接上的事务
///
/// `commit` / `rollback` 之后事务不可再用，后续操作返回 `StoreError::Closed`。
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    fn records(&self) -> &dyn RecordStore;

    async fn commit(&self) -> Result<(), StoreError>;

    async fn rollback(&self) -> Result<(), StoreError>;
}
