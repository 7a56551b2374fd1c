use std::sync::Arc;
use std::time::Duration;

use retail_adapter_memory::MemoryConnector;
use retail_common::{Pagination, TenantId, UserId};
use retail_customers::application::{
    CustomerService, RegisterCustomerCommand, RenameCustomerCommand, TransferPointsCommand,
};
use retail_errors::AppError;
use retail_ports::ConnectionParams;
use retail_tenancy::{
    ConnectionPoolManager, SchemaResolver, StaticDirectory, TenantRepositoryFactory,
};
use secrecy::Secret;
use uuid::Uuid;

fn service(tenants: &[&str]) -> CustomerService {
    let directory: StaticDirectory = tenants
        .iter()
        .map(|t| {
            (
                TenantId::parse(t).unwrap(),
                ConnectionParams {
                    host: "localhost".to_string(),
                    port: 5432,
                    database: "retail".to_string(),
                    schema: Some(t.replace('-', "_")),
                    username: "retail".to_string(),
                    password: Secret::new("secret".to_string()),
                },
            )
        })
        .collect();
    let resolver = Arc::new(SchemaResolver::new(
        Arc::new(directory),
        Duration::from_secs(60),
    ));
    let pools = Arc::new(ConnectionPoolManager::new(
        resolver,
        Arc::new(MemoryConnector::new()),
    ));
    CustomerService::new(Arc::new(TenantRepositoryFactory::new(pools)))
}

fn register(tenant: &str, email: &str, name: &str) -> RegisterCustomerCommand {
    RegisterCustomerCommand {
        tenant_id: tenant.to_string(),
        user_id: None,
        email: email.to_string(),
        name: name.to_string(),
        phone: None,
    }
}

#[tokio::test]
async fn test_register_and_get() {
    let service = service(&["store-001"]);
    let actor = UserId::new();

    let mut cmd = register("store-001", "Ada@Example.com", "Ada");
    cmd.user_id = Some(actor.clone());
    cmd.phone = Some("555-0100".to_string());
    let created = service.register(cmd).await.unwrap();

    assert_eq!(created.data.email, "ada@example.com");
    assert_eq!(created.audit.created_by, Some(actor));

    let found = service.get("store-001", created.id).await.unwrap();
    assert_eq!(found.data.phone.as_deref(), Some("555-0100"));

    let by_email = service
        .find_by_email("store-001", "ADA@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_email.id, created.id);
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let service = service(&["store-001"]);
    service
        .register(register("store-001", "ada@example.com", "Ada"))
        .await
        .unwrap();

    let err = service
        .register(register("store-001", "ADA@example.com", "Ada Again"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AppError::conflict("customer ada@example.com is already registered")
    );
}

#[tokio::test]
async fn test_register_invalid_email() {
    let service = service(&["store-001"]);
    let err = service
        .register(register("store-001", "not-an-email", "Ada"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_unknown_tenant() {
    let service = service(&["store-001"]);
    let err = service
        .register(register("store-404", "ada@example.com", "Ada"))
        .await
        .unwrap_err();
    assert_eq!(err, AppError::tenant_not_found("store-404"));
}

#[tokio::test]
async fn test_rename_and_list() {
    let service = service(&["store-001"]);
    let ada = service
        .register(register("store-001", "ada@example.com", "Ada"))
        .await
        .unwrap();
    service
        .register(register("store-001", "bob@example.com", "Bob"))
        .await
        .unwrap();

    let renamed = service
        .rename(RenameCustomerCommand {
            tenant_id: "store-001".to_string(),
            user_id: None,
            customer_id: ada.id,
            name: "  Ada Lovelace ".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(renamed.data.name, "Ada Lovelace");

    let err = service
        .rename(RenameCustomerCommand {
            tenant_id: "store-001".to_string(),
            user_id: None,
            customer_id: ada.id,
            name: "".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let page = service
        .list("store-001", &Pagination::new(1, 10))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].data.name, "Ada Lovelace");
}

#[tokio::test]
async fn test_deactivate_and_reactivate() {
    let service = service(&["store-001"]);
    let ada = service
        .register(register("store-001", "ada@example.com", "Ada"))
        .await
        .unwrap();

    service.deactivate("store-001", ada.id, None).await.unwrap();
    let err = service.get("store-001", ada.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let restored = service.reactivate("store-001", ada.id, None).await.unwrap();
    assert!(!restored.deleted);
    assert!(service.get("store-001", ada.id).await.is_ok());
}

#[tokio::test]
async fn test_transfer_points() {
    let service = service(&["store-001"]);
    let ada = service
        .register(register("store-001", "ada@example.com", "Ada"))
        .await
        .unwrap();
    let bob = service
        .register(register("store-001", "bob@example.com", "Bob"))
        .await
        .unwrap();
    service
        .adjust_points("store-001", ada.id, 100, None)
        .await
        .unwrap();

    let transfer = |points| TransferPointsCommand {
        tenant_id: "store-001".to_string(),
        user_id: None,
        from: ada.id,
        to: bob.id,
        points,
    };

    service.transfer_points(transfer(40)).await.unwrap();
    assert_eq!(service.get("store-001", ada.id).await.unwrap().data.points, 60);
    assert_eq!(service.get("store-001", bob.id).await.unwrap().data.points, 40);

    // 余额不足时两边都不变
    let err = service.transfer_points(transfer(500)).await.unwrap_err();
    assert_eq!(err, AppError::conflict("insufficient points"));
    assert_eq!(service.get("store-001", ada.id).await.unwrap().data.points, 60);
    assert_eq!(service.get("store-001", bob.id).await.unwrap().data.points, 40);

    let err = service.transfer_points(transfer(0)).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_transfer_to_missing_customer_rolls_back() {
    let service = service(&["store-001"]);
    let ada = service
        .register(register("store-001", "ada@example.com", "Ada"))
        .await
        .unwrap();
    service
        .adjust_points("store-001", ada.id, 10, None)
        .await
        .unwrap();

    let err = service
        .transfer_points(TransferPointsCommand {
            tenant_id: "store-001".to_string(),
            user_id: None,
            from: ada.id,
            to: Uuid::now_v7(),
            points: 5,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(service.get("store-001", ada.id).await.unwrap().data.points, 10);

    let err = service
        .adjust_points("store-001", ada.id, -11, None)
        .await
        .unwrap_err();
    assert_eq!(err, AppError::conflict("insufficient points"));
}

#[tokio::test]
async fn test_customers_are_tenant_scoped() {
    let service = service(&["store-001", "store-002"]);
    let ada = service
        .register(register("store-001", "ada@example.com", "Ada"))
        .await
        .unwrap();

    service
        .register(register("store-002", "ada@example.com", "Ada"))
        .await
        .unwrap();
    assert!(service.get("store-002", ada.id).await.is_err());
}
