//! 租户连接器 trait 定义

use std::sync::Arc;

use async_trait::async_trait;
use retail_common::TenantId;

use crate::{ConnectionParams, StoreError, TenantStore};

/// 按连接参数为租户打开连接池
#[async_trait]
pub trait TenantConnector: Send + Sync {
    async fn connect(
        &self,
        tenant: &TenantId,
        params: &ConnectionParams,
    ) -> Result<Arc<dyn TenantStore>, StoreError>;
}
