//! 实体负载与仓储返回的记录

use chrono::{DateTime, Utc};
use retail_common::{AuditInfo, EntityKind, Pagination};
use retail_ports::StoredRecord;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use uuid::Uuid;

/// 可由仓储保存的业务数据
///
/// 序列化结果必须是 JSON 对象。`validate` 在写入前调用，返回的消息会作为
/// `Validation` 错误原样交给调用方。
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl Payload for Value {
    fn validate(&self) -> Result<(), String> {
        if self.is_object() {
            Ok(())
        } else {
            Err("payload must be a JSON object".to_string())
        }
    }
}

/// 绑定了实体类型的负载
pub trait Entity: Payload {
    const KIND: EntityKind;
}

/// 仓储返回的一条记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record<P> {
    pub id: Uuid,
    pub data: P,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub audit: AuditInfo,
}

impl<P: Payload> Record<P> {
    pub(crate) fn from_stored(stored: StoredRecord) -> Result<Self, serde_json::Error> {
        let data = serde_json::from_value(Value::Object(stored.data))?;
        Ok(Self {
            id: stored.id,
            data,
            deleted: stored.deleted,
            deleted_at: stored.deleted_at,
            audit: stored.audit,
        })
    }
}

/// 序列化为 JSON 对象
pub(crate) fn to_object<P: Payload>(data: &P) -> Result<Map<String, Value>, String> {
    match serde_json::to_value(data) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("payload must be a JSON object".to_string()),
        Err(e) => Err(format!("payload could not be serialized: {e}")),
    }
}

/// 查询选项
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// 包含已软删除的记录
    pub include_deleted: bool,
    /// 分页，为空时返回全部
    pub pagination: Option<Pagination>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }
}
