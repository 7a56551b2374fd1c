//! 租户仓储
//!
//! 每个操作先通过连接池管理器取得租户句柄，再在该租户的连接池或事务上执行。
//! 存储层错误在这里归类：唯一冲突返回 `Conflict`，其余基础设施故障记录日志后
//! 统一返回 `Unavailable`，不携带驱动信息。

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use retail_common::{AuditInfo, EntityKind, PagedResult, Pagination, TenantId, UserId, new_id};
use retail_errors::{AppError, AppResult};
use retail_ports::{
    Filter, ListQuery, RecordStore, StoreError, StoreTransaction, StoredRecord, TenantStore,
};
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{
    ConnectionHandle, ConnectionPoolManager, Entity, FindOptions, Payload, Record, parse_tenant,
    to_object,
};

/// 仓储工厂
///
/// 业务服务持有 `Arc<TenantRepositoryFactory>`，按 (租户, 实体类型) 取得仓储。
pub struct TenantRepositoryFactory {
    pools: Arc<ConnectionPoolManager>,
}

impl TenantRepositoryFactory {
    pub fn new(pools: Arc<ConnectionPoolManager>) -> Self {
        Self { pools }
    }

    pub fn pools(&self) -> &Arc<ConnectionPoolManager> {
        &self.pools
    }

    /// 强类型仓储，同时预热该租户的连接池
    pub async fn repository<E: Entity>(&self, tenant_id: &str) -> AppResult<Repository<E>> {
        self.repository_for(tenant_id, E::KIND).await
    }

    /// 以 JSON 对象读写的仓储
    pub async fn raw_repository(
        &self,
        tenant_id: &str,
        kind: EntityKind,
    ) -> AppResult<Repository<Value>> {
        self.repository_for(tenant_id, kind).await
    }

    /// 指定负载类型和实体类型的仓储
    pub async fn repository_for<P: Payload>(
        &self,
        tenant_id: &str,
        kind: EntityKind,
    ) -> AppResult<Repository<P>> {
        let tenant = parse_tenant(tenant_id)?;
        self.pools.connection(&tenant).await?;

        Ok(Repository {
            tenant,
            kind,
            scope: Scope::Pooled(self.pools.clone()),
            _payload: PhantomData,
        })
    }
}

#[derive(Clone)]
enum Scope {
    Pooled(Arc<ConnectionPoolManager>),
    Transaction(Arc<dyn StoreTransaction>),
}

/// 本次操作的执行目标
enum Target {
    Store(Arc<dyn TenantStore>),
    Transaction(Arc<dyn StoreTransaction>),
}

impl Target {
    fn records(&self) -> &dyn RecordStore {
        match self {
            Target::Store(store) => store.records(),
            Target::Transaction(tx) => tx.records(),
        }
    }
}

/// 绑定到单个租户和实体类型的仓储
pub struct Repository<P> {
    tenant: TenantId,
    kind: EntityKind,
    scope: Scope,
    _payload: PhantomData<fn() -> P>,
}

impl<P> Clone for Repository<P> {
    fn clone(&self) -> Self {
        Self {
            tenant: self.tenant.clone(),
            kind: self.kind,
            scope: self.scope.clone(),
            _payload: PhantomData,
        }
    }
}

impl<P: Payload> Repository<P> {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// 是否运行在事务中
    pub fn in_transaction(&self) -> bool {
        matches!(self.scope, Scope::Transaction(_))
    }

    /// 同一租户、同一作用域（连接池或事务）下的另一种实体仓储
    pub fn sibling<Q: Entity>(&self) -> Repository<Q> {
        self.sibling_for(Q::KIND)
    }

    pub fn sibling_for<Q: Payload>(&self, kind: EntityKind) -> Repository<Q> {
        Repository {
            tenant: self.tenant.clone(),
            kind,
            scope: self.scope.clone(),
            _payload: PhantomData,
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Record<P>>> {
        self.find_by_id_with(id, &FindOptions::default()).await
    }

    pub async fn find_by_id_with(
        &self,
        id: Uuid,
        options: &FindOptions,
    ) -> AppResult<Option<Record<P>>> {
        let target = self.target().await?;
        target
            .records()
            .fetch(self.kind, id, options.include_deleted)
            .await
            .map_err(|e| self.classify(e, "find_by_id"))?
            .map(|stored| self.decode(stored))
            .transpose()
    }

    /// 记录不存在（或已软删除）时返回 `NotFound`
    pub async fn find_by_id_or_fail(&self, id: Uuid) -> AppResult<Record<P>> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| self.not_found(id))
    }

    pub async fn find_all(&self, filter: Filter, options: &FindOptions) -> AppResult<Vec<Record<P>>> {
        let query = ListQuery {
            filter,
            include_deleted: options.include_deleted,
            limit: options.pagination.as_ref().map(|p| p.page_size),
            offset: options.pagination.as_ref().map_or(0, Pagination::offset),
        };

        let target = self.target().await?;
        target
            .records()
            .list(self.kind, &query)
            .await
            .map_err(|e| self.classify(e, "find_all"))?
            .into_iter()
            .map(|stored| self.decode(stored))
            .collect()
    }

    /// 分页查询，附带总数
    pub async fn find_page(
        &self,
        filter: Filter,
        pagination: &Pagination,
    ) -> AppResult<PagedResult<Record<P>>> {
        let total = self.count(filter.clone()).await?;
        let items = self
            .find_all(filter, &FindOptions::new().paginate(pagination.clone()))
            .await?;
        Ok(PagedResult::new(items, total, pagination))
    }

    /// 统计未删除的记录
    pub async fn count(&self, filter: Filter) -> AppResult<u64> {
        let target = self.target().await?;
        target
            .records()
            .count(self.kind, &ListQuery::new(filter))
            .await
            .map_err(|e| self.classify(e, "count"))
    }

    pub async fn exists(&self, filter: Filter) -> AppResult<bool> {
        let query = ListQuery {
            limit: Some(1),
            ..ListQuery::new(filter)
        };

        let target = self.target().await?;
        let found = target
            .records()
            .list(self.kind, &query)
            .await
            .map_err(|e| self.classify(e, "exists"))?;
        Ok(!found.is_empty())
    }

    /// 新建记录，分配 ID 和审计字段
    pub async fn create(&self, data: P, actor: Option<UserId>) -> AppResult<Record<P>> {
        data.validate().map_err(AppError::validation)?;
        let map = to_object(&data).map_err(AppError::validation)?;

        let stored = StoredRecord {
            id: new_id(),
            data: map,
            deleted: false,
            deleted_at: None,
            audit: AuditInfo::new(actor),
        };

        let target = self.target().await?;
        target
            .records()
            .insert(self.kind, &stored)
            .await
            .map_err(|e| self.classify(e, "create"))?;

        debug!(tenant_id = %self.tenant, entity_kind = %self.kind, id = %stored.id, "Record created");

        Ok(Record {
            id: stored.id,
            data,
            deleted: stored.deleted,
            deleted_at: stored.deleted_at,
            audit: stored.audit,
        })
    }

    /// 按顶层字段合并部分更新，值为 `null` 的字段被移除
    pub async fn update(&self, id: Uuid, patch: Value, actor: Option<UserId>) -> AppResult<Record<P>> {
        let Value::Object(patch) = patch else {
            return Err(AppError::validation("update patch must be a JSON object"));
        };

        let target = self.target().await?;
        let records = target.records();

        let mut stored = records
            .fetch(self.kind, id, false)
            .await
            .map_err(|e| self.classify(e, "update"))?
            .ok_or_else(|| self.not_found(id))?;

        for (field, value) in patch {
            if value.is_null() {
                stored.data.remove(&field);
            } else {
                stored.data.insert(field, value);
            }
        }

        let data: P = serde_json::from_value(Value::Object(stored.data))
            .map_err(|e| AppError::validation(format!("invalid {} payload: {e}", self.kind)))?;
        data.validate().map_err(AppError::validation)?;
        stored.data = to_object(&data).map_err(AppError::validation)?;
        stored.audit.update(actor);

        let replaced = records
            .replace(self.kind, &stored)
            .await
            .map_err(|e| self.classify(e, "update"))?;
        if !replaced {
            return Err(self.not_found(id));
        }

        Ok(Record {
            id: stored.id,
            data,
            deleted: stored.deleted,
            deleted_at: stored.deleted_at,
            audit: stored.audit,
        })
    }

    /// 软删除，记录不存在或已删除时返回 `NotFound`
    pub async fn soft_delete(&self, id: Uuid, actor: Option<UserId>) -> AppResult<()> {
        let target = self.target().await?;
        let records = target.records();

        let mut stored = records
            .fetch(self.kind, id, false)
            .await
            .map_err(|e| self.classify(e, "soft_delete"))?
            .ok_or_else(|| self.not_found(id))?;

        stored.deleted = true;
        stored.audit.update(actor);
        stored.deleted_at = Some(stored.audit.updated_at);

        let replaced = records
            .replace(self.kind, &stored)
            .await
            .map_err(|e| self.classify(e, "soft_delete"))?;
        if !replaced {
            return Err(self.not_found(id));
        }

        debug!(tenant_id = %self.tenant, entity_kind = %self.kind, id = %id, "Record soft-deleted");
        Ok(())
    }

    /// 撤销软删除，记录未被删除时返回 `Conflict`
    pub async fn restore(&self, id: Uuid, actor: Option<UserId>) -> AppResult<Record<P>> {
        let target = self.target().await?;
        let records = target.records();

        let mut stored = records
            .fetch(self.kind, id, true)
            .await
            .map_err(|e| self.classify(e, "restore"))?
            .ok_or_else(|| self.not_found(id))?;

        if !stored.deleted {
            return Err(AppError::conflict(format!(
                "{} {} is not deleted",
                self.kind, id
            )));
        }

        stored.deleted = false;
        stored.deleted_at = None;
        stored.audit.update(actor);

        let replaced = records
            .replace(self.kind, &stored)
            .await
            .map_err(|e| self.classify(e, "restore"))?;
        if !replaced {
            return Err(self.not_found(id));
        }

        self.decode(stored)
    }

    /// 在同一租户的事务中执行 `f`
    ///
    /// `f` 返回 `Err` 时回滚，否则提交。已经在事务中时直接复用当前事务。
    pub async fn run_in_transaction<T, F, Fut>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(Repository<P>) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let pools = match &self.scope {
            Scope::Transaction(_) => return f(self.clone()).await,
            Scope::Pooled(pools) => pools,
        };

        let handle = pools.connection(&self.tenant).await?;
        let store = self.ready_store(&handle)?;
        let tx: Arc<dyn StoreTransaction> = Arc::from(
            store
                .begin()
                .await
                .map_err(|e| self.classify(e, "begin_transaction"))?,
        );

        let scoped = Repository {
            tenant: self.tenant.clone(),
            kind: self.kind,
            scope: Scope::Transaction(tx.clone()),
            _payload: PhantomData,
        };

        match f(scoped).await {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|e| self.classify(e, "commit"))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(
                        tenant_id = %self.tenant,
                        entity_kind = %self.kind,
                        error = %rollback,
                        "Transaction rollback failed"
                    );
                }
                debug!(tenant_id = %self.tenant, error = %e, "Transaction rolled back");
                Err(e)
            }
        }
    }

    async fn target(&self) -> AppResult<Target> {
        match &self.scope {
            Scope::Transaction(tx) => Ok(Target::Transaction(tx.clone())),
            Scope::Pooled(pools) => {
                let handle = pools.connection(&self.tenant).await?;
                Ok(Target::Store(self.ready_store(&handle)?))
            }
        }
    }

    fn ready_store(&self, handle: &ConnectionHandle) -> AppResult<Arc<dyn TenantStore>> {
        handle.store().ok_or_else(|| {
            warn!(
                tenant_id = %self.tenant,
                entity_kind = %self.kind,
                state = ?handle.state(),
                "Tenant pool closed before use"
            );
            AppError::unavailable(self.tenant.as_str())
        })
    }

    fn decode(&self, stored: StoredRecord) -> AppResult<Record<P>> {
        let id = stored.id;
        Record::from_stored(stored).map_err(|e| {
            error!(
                tenant_id = %self.tenant,
                entity_kind = %self.kind,
                id = %id,
                error = %e,
                "Stored record does not match payload type"
            );
            AppError::internal(format!("{} {} could not be decoded", self.kind, id))
        })
    }

    fn not_found(&self, id: Uuid) -> AppError {
        AppError::not_found(format!("{} {} not found", self.kind, id))
    }

    fn classify(&self, error: StoreError, operation: &'static str) -> AppError {
        match error {
            StoreError::UniqueViolation { constraint } => {
                let field = self.kind.unique_fields().iter().find(|field| {
                    constraint == format!("{}_{}_key", self.kind.table_name(), field)
                });
                match field {
                    Some(field) => AppError::conflict(format!(
                        "{} with this {} already exists",
                        self.kind, field
                    )),
                    None => AppError::conflict(format!(
                        "{} violates unique constraint {}",
                        self.kind, constraint
                    )),
                }
            }
            StoreError::Decode(cause) => {
                error!(
                    tenant_id = %self.tenant,
                    entity_kind = %self.kind,
                    operation,
                    error = %cause,
                    "Stored record could not be decoded"
                );
                AppError::internal(format!("{} record could not be decoded", self.kind))
            }
            other => {
                error!(
                    tenant_id = %self.tenant,
                    entity_kind = %self.kind,
                    operation,
                    error = %other,
                    "Tenant database operation failed"
                );
                AppError::unavailable(self.tenant.as_str())
            }
        }
    }
}
