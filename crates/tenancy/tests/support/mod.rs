#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use retail_adapter_memory::MemoryConnector;
use retail_common::{EntityKind, TenantId};
use retail_ports::ConnectionParams;
use retail_tenancy::{
    ConnectionPoolManager, Entity, Payload, SchemaResolver, StaticDirectory,
    TenantRepositoryFactory,
};
use secrecy::Secret;
use serde::{Deserialize, Serialize};

pub fn params(tenant: &str) -> ConnectionParams {
    ConnectionParams {
        host: "localhost".to_string(),
        port: 5432,
        database: "retail".to_string(),
        schema: Some(tenant.replace('-', "_")),
        username: "retail".to_string(),
        password: Secret::new("secret".to_string()),
    }
}

pub fn directory(tenants: &[&str]) -> StaticDirectory {
    tenants
        .iter()
        .map(|t| (TenantId::parse(t).unwrap(), params(t)))
        .collect()
}

pub struct Harness {
    pub connector: Arc<MemoryConnector>,
    pub pools: Arc<ConnectionPoolManager>,
    pub factory: TenantRepositoryFactory,
}

pub fn harness(tenants: &[&str]) -> Harness {
    harness_with(tenants, MemoryConnector::new())
}

pub fn harness_with(tenants: &[&str], connector: MemoryConnector) -> Harness {
    let connector = Arc::new(connector);
    let resolver = Arc::new(SchemaResolver::new(
        Arc::new(directory(tenants)),
        Duration::from_secs(60),
    ));
    let pools = Arc::new(ConnectionPoolManager::new(resolver, connector.clone()));
    let factory = TenantRepositoryFactory::new(pools.clone());

    Harness {
        connector,
        pools,
        factory,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub price_cents: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Product {
    pub fn new(sku: &str, name: &str) -> Self {
        Self {
            sku: sku.to_string(),
            name: name.to_string(),
            price_cents: 0,
            status: None,
        }
    }
}

impl Payload for Product {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("product name must not be empty".to_string());
        }
        if self.price_cents < 0 {
            return Err("product price must not be negative".to_string());
        }
        Ok(())
    }
}

impl Entity for Product {
    const KIND: EntityKind = EntityKind::Product;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub product_sku: String,
    pub quantity: u32,
}

impl Payload for Order {}

impl Entity for Order {
    const KIND: EntityKind = EntityKind::Order;
}
