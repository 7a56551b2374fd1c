//! 静态租户目录

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use retail_common::TenantId;
use retail_ports::{ConnectionParams, DirectoryError, TenantDirectory};

/// 内存中的租户映射，通常由配置文件加载
#[derive(Debug, Default)]
pub struct StaticDirectory {
    tenants: RwLock<HashMap<TenantId, ConnectionParams>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(self, tenant: TenantId, params: ConnectionParams) -> Self {
        self.insert(tenant, params);
        self
    }

    /// 新增或替换租户，返回旧的连接参数
    pub fn insert(&self, tenant: TenantId, params: ConnectionParams) -> Option<ConnectionParams> {
        self.tenants.write().insert(tenant, params)
    }

    pub fn remove(&self, tenant: &TenantId) -> Option<ConnectionParams> {
        self.tenants.write().remove(tenant)
    }

    pub fn len(&self) -> usize {
        self.tenants.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.read().is_empty()
    }
}

impl FromIterator<(TenantId, ConnectionParams)> for StaticDirectory {
    fn from_iter<I: IntoIterator<Item = (TenantId, ConnectionParams)>>(iter: I) -> Self {
        Self {
            tenants: RwLock::new(iter.into_iter().collect()),
        }
    }
}

#[async_trait]
impl TenantDirectory for StaticDirectory {
    async fn lookup(&self, tenant: &TenantId) -> Result<Option<ConnectionParams>, DirectoryError> {
        Ok(self.tenants.read().get(tenant).cloned())
    }
}
