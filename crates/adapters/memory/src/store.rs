//! 内存记录存储

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use retail_common::EntityKind;
use retail_ports::{
    ListQuery, RecordStore, StoreError, StoreStatus, StoreTransaction, StoredRecord, TenantStore,
};
use tracing::debug;
use uuid::Uuid;

type Table = BTreeMap<Uuid, StoredRecord>;

/// 一个租户 schema 的内存数据
///
/// 连接池关闭后数据仍然保留，重新连接同一 schema 可以看到之前的写入。
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: RwLock<HashMap<EntityKind, Table>>,
}

impl MemoryDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 某张表的记录数（含已软删除）
    pub fn row_count(&self, kind: EntityKind) -> usize {
        self.tables.read().get(&kind).map_or(0, |t| t.len())
    }

    fn snapshot(&self, kind: EntityKind) -> Table {
        self.tables.read().get(&kind).cloned().unwrap_or_default()
    }
}

/// 检查唯一字段，已软删除的记录不参与比较
fn check_unique<'a>(
    kind: EntityKind,
    candidate: &StoredRecord,
    others: impl Iterator<Item = &'a StoredRecord>,
) -> Result<(), StoreError> {
    if candidate.deleted {
        return Ok(());
    }

    let others: Vec<&StoredRecord> = others
        .filter(|r| r.id != candidate.id && !r.deleted)
        .collect();

    for field in kind.unique_fields() {
        let Some(value) = candidate.data.get(*field).filter(|v| !v.is_null()) else {
            continue;
        };
        if others.iter().any(|r| r.data.get(*field) == Some(value)) {
            return Err(StoreError::unique(format!(
                "{}_{}_key",
                kind.table_name(),
                field
            )));
        }
    }

    Ok(())
}

fn select(table: &Table, query: &ListQuery) -> Vec<StoredRecord> {
    let mut rows: Vec<&StoredRecord> = table
        .values()
        .filter(|r| query.include_deleted || !r.deleted)
        .filter(|r| r.matches(&query.filter))
        .collect();
    rows.sort_by(|a, b| {
        a.audit
            .created_at
            .cmp(&b.audit.created_at)
            .then(a.id.cmp(&b.id))
    });

    let limit = query.limit.map_or(usize::MAX, |l| l as usize);
    rows.into_iter()
        .skip(query.offset as usize)
        .take(limit)
        .cloned()
        .collect()
}

fn count(table: &Table, query: &ListQuery) -> u64 {
    table
        .values()
        .filter(|r| query.include_deleted || !r.deleted)
        .filter(|r| r.matches(&query.filter))
        .count() as u64
}

fn visible(record: &StoredRecord, include_deleted: bool) -> bool {
    include_deleted || !record.deleted
}

/// 内存连接池
#[derive(Debug)]
pub struct MemoryStore {
    db: Arc<MemoryDatabase>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// 使用独立的空数据库创建
    pub fn new() -> Self {
        Self::with_database(MemoryDatabase::new())
    }

    pub fn with_database(db: Arc<MemoryDatabase>) -> Self {
        Self {
            db,
            closed: AtomicBool::new(false),
        }
    }

    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.db
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch(
        &self,
        kind: EntityKind,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<StoredRecord>, StoreError> {
        self.ensure_open()?;
        let tables = self.db.tables.read();
        Ok(tables
            .get(&kind)
            .and_then(|t| t.get(&id))
            .filter(|r| visible(r, include_deleted))
            .cloned())
    }

    async fn list(
        &self,
        kind: EntityKind,
        query: &ListQuery,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        self.ensure_open()?;
        let tables = self.db.tables.read();
        Ok(tables.get(&kind).map(|t| select(t, query)).unwrap_or_default())
    }

    async fn count(&self, kind: EntityKind, query: &ListQuery) -> Result<u64, StoreError> {
        self.ensure_open()?;
        let tables = self.db.tables.read();
        Ok(tables.get(&kind).map_or(0, |t| count(t, query)))
    }

    async fn insert(&self, kind: EntityKind, record: &StoredRecord) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut tables = self.db.tables.write();
        let table = tables.entry(kind).or_default();

        if table.contains_key(&record.id) {
            return Err(StoreError::unique(format!("{}_pkey", kind.table_name())));
        }
        check_unique(kind, record, table.values())?;

        table.insert(record.id, record.clone());
        Ok(())
    }

    async fn replace(&self, kind: EntityKind, record: &StoredRecord) -> Result<bool, StoreError> {
        self.ensure_open()?;
        let mut tables = self.db.tables.write();
        let table = tables.entry(kind).or_default();

        if !table.contains_key(&record.id) {
            return Ok(false);
        }
        check_unique(kind, record, table.values())?;

        table.insert(record.id, record.clone());
        Ok(true)
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    fn records(&self) -> &dyn RecordStore {
        self
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        self.ensure_open()?;
        Ok(Box::new(MemoryTransaction::new(self.db.clone())))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_open()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn status(&self) -> StoreStatus {
        if self.is_closed() {
            StoreStatus::default()
        } else {
            StoreStatus { size: 1, idle: 1 }
        }
    }
}

type Staged = HashMap<(EntityKind, Uuid), StoredRecord>;

/// 内存事务
///
/// 写入先暂存，提交时在写锁内重新校验唯一约束后一次性落地；
/// 回滚或未提交即丢弃时，暂存内容对其他读者不可见。
#[derive(Debug)]
pub struct MemoryTransaction {
    db: Arc<MemoryDatabase>,
    staged: Mutex<Option<Staged>>,
}

impl MemoryTransaction {
    fn new(db: Arc<MemoryDatabase>) -> Self {
        Self {
            db,
            staged: Mutex::new(Some(HashMap::new())),
        }
    }

    /// 已提交数据叠加本事务暂存写入后的视图
    fn view(&self, kind: EntityKind) -> Result<Table, StoreError> {
        let staged = self.staged.lock();
        let staged = staged.as_ref().ok_or(StoreError::Closed)?;

        let mut table = self.db.snapshot(kind);
        for ((k, id), record) in staged.iter() {
            if *k == kind {
                table.insert(*id, record.clone());
            }
        }
        Ok(table)
    }

    fn stage(&self, kind: EntityKind, record: &StoredRecord) -> Result<(), StoreError> {
        let mut staged = self.staged.lock();
        let staged = staged.as_mut().ok_or(StoreError::Closed)?;
        staged.insert((kind, record.id), record.clone());
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryTransaction {
    async fn fetch(
        &self,
        kind: EntityKind,
        id: Uuid,
        include_deleted: bool,
    ) -> Result<Option<StoredRecord>, StoreError> {
        let table = self.view(kind)?;
        Ok(table
            .get(&id)
            .filter(|r| visible(r, include_deleted))
            .cloned())
    }

    async fn list(
        &self,
        kind: EntityKind,
        query: &ListQuery,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(select(&self.view(kind)?, query))
    }

    async fn count(&self, kind: EntityKind, query: &ListQuery) -> Result<u64, StoreError> {
        Ok(count(&self.view(kind)?, query))
    }

    async fn insert(&self, kind: EntityKind, record: &StoredRecord) -> Result<(), StoreError> {
        let table = self.view(kind)?;
        if table.contains_key(&record.id) {
            return Err(StoreError::unique(format!("{}_pkey", kind.table_name())));
        }
        check_unique(kind, record, table.values())?;
        self.stage(kind, record)
    }

    async fn replace(&self, kind: EntityKind, record: &StoredRecord) -> Result<bool, StoreError> {
        let table = self.view(kind)?;
        if !table.contains_key(&record.id) {
            return Ok(false);
        }
        check_unique(kind, record, table.values())?;
        self.stage(kind, record)?;
        Ok(true)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    fn records(&self) -> &dyn RecordStore {
        self
    }

    async fn commit(&self) -> Result<(), StoreError> {
        let staged = self.staged.lock().take().ok_or(StoreError::Closed)?;
        let mut tables = self.db.tables.write();

        // 先整体校验，再落地，保证提交的原子性
        let mut by_kind: HashMap<EntityKind, Vec<&StoredRecord>> = HashMap::new();
        for ((kind, _), record) in staged.iter() {
            by_kind.entry(*kind).or_default().push(record);
        }
        for (kind, records) in &by_kind {
            let mut merged = tables.get(kind).cloned().unwrap_or_default();
            for record in records {
                merged.insert(record.id, (*record).clone());
            }
            for record in records {
                check_unique(*kind, record, merged.values())?;
            }
        }
        drop(by_kind);

        let written = staged.len();
        for ((kind, id), record) in staged {
            tables.entry(kind).or_default().insert(id, record);
        }
        debug!(records = written, "Memory transaction committed");
        Ok(())
    }

    async fn rollback(&self) -> Result<(), StoreError> {
        let discarded = self.staged.lock().take().ok_or(StoreError::Closed)?;
        debug!(records = discarded.len(), "Memory transaction rolled back");
        Ok(())
    }
}
