mod support;

use retail_common::{EntityKind, Pagination, TenantId, UserId};
use retail_errors::AppError;
use retail_ports::Filter;
use retail_tenancy::FindOptions;
use serde_json::json;
use uuid::Uuid;

use support::{Order, Product, harness, params};

#[tokio::test]
async fn test_create_then_find_round_trip() {
    let h = harness(&["store-001"]);
    let repo = h.factory.raw_repository("store-001", EntityKind::Product).await.unwrap();

    let created = repo.create(json!({"name": "Widget"}), None).await.unwrap();
    let found = repo.find_by_id(created.id).await.unwrap().unwrap();

    assert_eq!(found.data, json!({"name": "Widget"}));
    assert_eq!(found.id, created.id);
    assert!(!found.deleted);
    assert_eq!(found.audit.created_at, created.audit.created_at);
}

#[tokio::test]
async fn test_find_by_id_or_fail_missing() {
    let h = harness(&["store-001"]);
    let repo = h.factory.repository::<Product>("store-001").await.unwrap();

    let err = repo.find_by_id_or_fail(Uuid::now_v7()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_soft_delete_visibility() {
    let h = harness(&["store-001"]);
    let repo = h.factory.repository::<Product>("store-001").await.unwrap();
    let actor = UserId::new();

    let created = repo
        .create(Product::new("W-1", "Widget"), Some(actor.clone()))
        .await
        .unwrap();
    repo.soft_delete(created.id, Some(actor.clone())).await.unwrap();

    assert!(repo.find_by_id(created.id).await.unwrap().is_none());

    let deleted = repo
        .find_by_id_with(created.id, &FindOptions::new().include_deleted())
        .await
        .unwrap()
        .unwrap();
    assert!(deleted.deleted);
    assert!(deleted.deleted_at.is_some());
    assert_eq!(deleted.audit.updated_by, Some(actor));

    let err = repo.soft_delete(created.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_restore() {
    let h = harness(&["store-001"]);
    let repo = h.factory.repository::<Product>("store-001").await.unwrap();

    let created = repo.create(Product::new("W-1", "Widget"), None).await.unwrap();

    let err = repo.restore(created.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    repo.soft_delete(created.id, None).await.unwrap();
    let restored = repo.restore(created.id, None).await.unwrap();
    assert!(!restored.deleted);
    assert!(restored.deleted_at.is_none());
    assert!(repo.find_by_id(created.id).await.unwrap().is_some());

    let err = repo.restore(Uuid::now_v7(), None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_validation_errors() {
    let h = harness(&["store-001"]);
    let typed = h.factory.repository::<Product>("store-001").await.unwrap();
    let raw = h.factory.raw_repository("store-001", EntityKind::Product).await.unwrap();

    let err = typed.create(Product::new("W-1", "  "), None).await.unwrap_err();
    assert_eq!(err, AppError::validation("product name must not be empty"));

    let err = raw.create(json!(["not", "an", "object"]), None).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let created = typed.create(Product::new("W-1", "Widget"), None).await.unwrap();
    let err = typed
        .update(created.id, json!({"price_cents": -5}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = typed
        .update(created.id, json!({"price_cents": "free"}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = typed.update(created.id, json!(42), None).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_unique_field_conflict() {
    let h = harness(&["store-001"]);
    let repo = h.factory.repository::<Product>("store-001").await.unwrap();

    let first = repo.create(Product::new("W-1", "Widget"), None).await.unwrap();
    let err = repo
        .create(Product::new("W-1", "Other widget"), None)
        .await
        .unwrap_err();
    assert_eq!(err, AppError::conflict("product with this sku already exists"));

    let second = repo.create(Product::new("W-2", "Gadget"), None).await.unwrap();
    let err = repo
        .update(second.id, json!({"sku": "W-1"}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // 软删除后唯一值可以复用
    repo.soft_delete(first.id, None).await.unwrap();
    repo.create(Product::new("W-1", "Replacement"), None).await.unwrap();
}

#[tokio::test]
async fn test_update_merges_fields() {
    let h = harness(&["store-001"]);
    let repo = h.factory.repository::<Product>("store-001").await.unwrap();
    let mut product = Product::new("W-1", "Widget");
    product.status = Some("draft".to_string());

    let created = repo.create(product, None).await.unwrap();
    let actor = UserId::new();
    let updated = repo
        .update(
            created.id,
            json!({"price_cents": 1299, "status": null}),
            Some(actor.clone()),
        )
        .await
        .unwrap();

    assert_eq!(updated.data.price_cents, 1299);
    assert_eq!(updated.data.name, "Widget");
    assert_eq!(updated.data.status, None);
    assert_eq!(updated.audit.updated_by, Some(actor));
    assert_eq!(updated.audit.created_at, created.audit.created_at);

    let reloaded = repo.find_by_id_or_fail(created.id).await.unwrap();
    assert_eq!(reloaded.data, updated.data);

    repo.soft_delete(created.id, None).await.unwrap();
    let err = repo
        .update(created.id, json!({"name": "Ghost"}), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_find_all_count_exists() {
    let h = harness(&["store-001"]);
    let repo = h.factory.repository::<Product>("store-001").await.unwrap();

    for i in 0..5 {
        let mut product = Product::new(&format!("W-{i}"), "Widget");
        product.status = Some(if i % 2 == 0 { "open" } else { "closed" }.to_string());
        repo.create(product, None).await.unwrap();
    }
    let hidden = repo.create(Product::new("W-9", "Hidden"), None).await.unwrap();
    repo.soft_delete(hidden.id, None).await.unwrap();

    let all = repo.find_all(Filter::new(), &FindOptions::new()).await.unwrap();
    assert_eq!(all.len(), 5);

    let with_deleted = repo
        .find_all(Filter::new(), &FindOptions::new().include_deleted())
        .await
        .unwrap();
    assert_eq!(with_deleted.len(), 6);

    let open = Filter::new().eq("status", "open");
    assert_eq!(repo.count(open.clone()).await.unwrap(), 3);
    assert!(repo.exists(open).await.unwrap());
    assert!(!repo.exists(Filter::new().eq("sku", "W-9")).await.unwrap());

    let page = repo
        .find_page(Filter::new(), &Pagination::new(2, 2))
        .await
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total_pages(), 3);
    assert_eq!(page.items[0].data.sku, "W-2");
}

#[tokio::test]
async fn test_transaction_rollback_leaves_no_writes() {
    let h = harness(&["store-001"]);
    let repo = h.factory.repository::<Product>("store-001").await.unwrap();

    let result: Result<(), AppError> = repo
        .run_in_transaction(|tx| async move {
            assert!(tx.in_transaction());
            tx.create(Product::new("W-1", "Widget"), None).await?;
            tx.sibling::<Order>()
                .create(
                    Order {
                        product_sku: "W-1".to_string(),
                        quantity: 2,
                    },
                    None,
                )
                .await?;
            Err(AppError::conflict("stock exhausted"))
        })
        .await;

    assert_eq!(result.unwrap_err(), AppError::conflict("stock exhausted"));
    assert_eq!(repo.count(Filter::new()).await.unwrap(), 0);
    let orders = repo.sibling::<Order>();
    assert_eq!(orders.count(Filter::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_transaction_commit() {
    let h = harness(&["store-001"]);
    let repo = h.factory.repository::<Product>("store-001").await.unwrap();

    let id = repo
        .run_in_transaction(|tx| async move {
            let product = tx.create(Product::new("W-1", "Widget"), None).await?;
            // 事务内可以读到自己的写入
            assert!(tx.find_by_id(product.id).await?.is_some());

            // 嵌套调用复用同一事务
            tx.run_in_transaction(|inner| async move {
                inner
                    .update(product.id, json!({"price_cents": 500}), None)
                    .await
            })
            .await?;
            Ok(product.id)
        })
        .await
        .unwrap();

    let stored = repo.find_by_id_or_fail(id).await.unwrap();
    assert_eq!(stored.data.price_cents, 500);
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let h = harness(&["store-001", "store-002"]);
    let a = h.factory.repository::<Product>("store-001").await.unwrap();
    let b = h.factory.repository::<Product>("store-002").await.unwrap();

    let created = a.create(Product::new("W-1", "Widget"), None).await.unwrap();

    assert!(b.find_by_id(created.id).await.unwrap().is_none());
    assert_eq!(b.count(Filter::new()).await.unwrap(), 0);
    // 同一 SKU 在另一个租户不冲突
    b.create(Product::new("W-1", "Widget"), None).await.unwrap();

    assert_eq!(a.tenant().as_str(), "store-001");
    assert_eq!(
        h.connector
            .database(&params("store-001"))
            .row_count(EntityKind::Product),
        1
    );
}

#[tokio::test]
async fn test_factory_rejects_bad_tenant() {
    let h = harness(&["store-001"]);

    let err = h.factory.repository::<Product>("").await.err().unwrap();
    assert!(matches!(err, AppError::Validation(_)));

    let err = h.factory.repository::<Product>("store-404").await.err().unwrap();
    assert_eq!(err, AppError::tenant_not_found("store-404"));
    assert_eq!(h.connector.connect_count(), 0);
}

#[tokio::test]
async fn test_operations_after_eviction_reconnect() {
    let h = harness(&["store-001"]);
    let repo = h.factory.repository::<Product>("store-001").await.unwrap();
    let created = repo.create(Product::new("W-1", "Widget"), None).await.unwrap();

    h.pools.evict(&TenantId::parse("store-001").unwrap()).await;

    // 仓储每次操作都重新取句柄，数据在同一 schema 中仍然可见
    let found = repo.find_by_id(created.id).await.unwrap();
    assert!(found.is_some());
    assert_eq!(h.connector.connect_count(), 2);
}

#[tokio::test]
async fn test_finished_transaction_is_unavailable() {
    let h = harness(&["store-001"]);
    let repo = h.factory.repository::<Product>("store-001").await.unwrap();

    let leaked = repo
        .run_in_transaction(|tx| async move {
            tx.create(Product::new("W-1", "Widget"), None).await?;
            Ok(tx.clone())
        })
        .await
        .unwrap();

    let err = leaked.count(Filter::new()).await.unwrap_err();
    assert_eq!(err, AppError::unavailable("store-001"));
    assert_eq!(err.to_string(), "Tenant database unavailable: store-001");
    assert_eq!(repo.count(Filter::new()).await.unwrap(), 1);
}
