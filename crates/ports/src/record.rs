//! 存储层记录与查询条件

use chrono::{DateTime, Utc};
use retail_common::AuditInfo;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// 存储层的一条实体记录
///
/// 业务字段以 JSON 对象保存在 `data` 中，软删除和审计字段是固定列。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Uuid,
    pub data: Map<String, Value>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub audit: AuditInfo,
}

impl StoredRecord {
    /// 是否满足过滤条件
    pub fn matches(&self, filter: &Filter) -> bool {
        filter
            .conditions()
            .iter()
            .all(|(field, expected)| self.data.get(field) == Some(expected))
    }
}

/// 按业务字段相等匹配的过滤条件
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个 `field == value` 条件
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[(String, Value)] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// 转换为 JSON 对象（用于 jsonb 包含查询）
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self.conditions.iter().cloned().collect();
        Value::Object(map)
    }
}

/// 列表查询参数
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub filter: Filter,
    pub include_deleted: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl ListQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }
}
