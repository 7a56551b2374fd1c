//! 实体类型标识
//!
//! 仓储按显式的实体类型区分，每种类型对应租户库中的一张表。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 租户库中的实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Store,
    Product,
    Order,
    Customer,
    Voucher,
    InventoryTransfer,
    AuditLog,
    Supplier,
    Employee,
}

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Store,
        EntityKind::Product,
        EntityKind::Order,
        EntityKind::Customer,
        EntityKind::Voucher,
        EntityKind::InventoryTransfer,
        EntityKind::AuditLog,
        EntityKind::Supplier,
        EntityKind::Employee,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Store => "store",
            EntityKind::Product => "product",
            EntityKind::Order => "order",
            EntityKind::Customer => "customer",
            EntityKind::Voucher => "voucher",
            EntityKind::InventoryTransfer => "inventory_transfer",
            EntityKind::AuditLog => "audit_log",
            EntityKind::Supplier => "supplier",
            EntityKind::Employee => "employee",
        }
    }

    /// 租户 schema 内的表名
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Store => "stores",
            EntityKind::Product => "products",
            EntityKind::Order => "orders",
            EntityKind::Customer => "customers",
            EntityKind::Voucher => "vouchers",
            EntityKind::InventoryTransfer => "inventory_transfers",
            EntityKind::AuditLog => "audit_logs",
            EntityKind::Supplier => "suppliers",
            EntityKind::Employee => "employees",
        }
    }

    /// 在未删除记录中必须唯一的字段
    pub fn unique_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Store => &["code"],
            EntityKind::Product => &["sku"],
            EntityKind::Customer => &["email"],
            EntityKind::Voucher => &["code"],
            EntityKind::Supplier => &["code"],
            EntityKind::Employee => &["email"],
            EntityKind::Order | EntityKind::InventoryTransfer | EntityKind::AuditLog => &[],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_names_are_distinct() {
        let tables: HashSet<_> = EntityKind::ALL.iter().map(|k| k.table_name()).collect();
        assert_eq!(tables.len(), EntityKind::ALL.len());
    }

    #[test]
    fn test_serde_matches_as_str() {
        for kind in EntityKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_unique_fields() {
        assert_eq!(EntityKind::Product.unique_fields(), &["sku"]);
        assert!(EntityKind::Order.unique_fields().is_empty());
    }
}
