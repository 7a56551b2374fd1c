mod support;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use mockall::mock;
use retail_adapter_memory::MemoryConnector;
use retail_common::TenantId;
use retail_errors::AppError;
use retail_ports::{ConnectionParams, DirectoryError, TenantDirectory};
use retail_tenancy::{ConnectionPoolManager, HandleState, PoolStats, SchemaResolver};

use support::{harness, harness_with, params};

mock! {
    pub Directory {}

    #[async_trait]
    impl TenantDirectory for Directory {
        async fn lookup(&self, tenant: &TenantId) -> Result<Option<ConnectionParams>, DirectoryError>;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_open_once() {
    let h = harness_with(
        &["store-001"],
        MemoryConnector::new().with_latency(Duration::from_millis(50)),
    );

    let handles = join_all((0..32).map(|_| {
        let pools = h.pools.clone();
        tokio::spawn(async move { pools.get_connection("store-001").await })
    }))
    .await;

    let handles: Vec<_> = handles
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(h.connector.connect_count(), 1);
    assert!(handles.iter().all(|h2| Arc::ptr_eq(h2, &handles[0])));
    assert_eq!(handles[0].state(), HandleState::Ready);
}

#[tokio::test]
async fn test_two_parallel_requests_share_handle() {
    let h = harness_with(
        &["store-001"],
        MemoryConnector::new().with_latency(Duration::from_millis(20)),
    );

    let (a, b) = tokio::join!(
        h.pools.get_connection("store-001"),
        h.pools.get_connection("store-001")
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.id(), b.id());
    assert_eq!(h.connector.connect_count(), 1);
}

#[tokio::test]
async fn test_empty_tenant_id_touches_nothing() {
    let mut directory = MockDirectory::new();
    directory.expect_lookup().never();

    let connector = Arc::new(MemoryConnector::new());
    let resolver = Arc::new(SchemaResolver::new(
        Arc::new(directory),
        Duration::from_secs(60),
    ));
    let pools = ConnectionPoolManager::new(resolver, connector.clone());

    for raw in ["", "Store-001", "-store", "store 001"] {
        let err = pools.get_connection(raw).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{raw:?} -> {err:?}");
    }

    assert_eq!(connector.connect_count(), 0);
    assert_eq!(pools.stats().initializing, 0);
}

#[tokio::test]
async fn test_unknown_tenant_is_not_found() {
    let mut directory = MockDirectory::new();
    directory.expect_lookup().times(2).returning(|_| Ok(None));

    let connector = Arc::new(MemoryConnector::new());
    let resolver = Arc::new(SchemaResolver::new(
        Arc::new(directory),
        Duration::from_secs(60),
    ));
    let pools = ConnectionPoolManager::new(resolver, connector.clone());

    for _ in 0..2 {
        let err = pools.get_connection("store-404").await.unwrap_err();
        assert_eq!(err, AppError::tenant_not_found("store-404"));
    }
    assert_eq!(connector.connect_count(), 0);
    assert!(pools.tenants().is_empty());
}

#[tokio::test]
async fn test_directory_outage_is_reported() {
    let mut directory = MockDirectory::new();
    directory
        .expect_lookup()
        .times(1)
        .returning(|_| Err(DirectoryError("timeout".to_string())));

    let resolver = Arc::new(SchemaResolver::new(
        Arc::new(directory),
        Duration::from_secs(60),
    ));
    let pools = ConnectionPoolManager::new(resolver, Arc::new(MemoryConnector::new()));

    let err = pools.get_connection("store-001").await.unwrap_err();
    assert_eq!(err, AppError::directory_unavailable("store-001"));
    assert!(err.is_infrastructure());
}

#[tokio::test]
async fn test_evict_only_affects_one_tenant() {
    let h = harness(&["store-001", "store-002"]);

    let first = h.pools.get_connection("store-001").await.unwrap();
    let second = h.pools.get_connection("store-002").await.unwrap();

    assert!(h.pools.evict(&TenantId::parse("store-001").unwrap()).await);

    assert_eq!(first.state(), HandleState::Closed);
    assert_eq!(second.state(), HandleState::Ready);
    let again = h.pools.get_connection("store-002").await.unwrap();
    assert!(Arc::ptr_eq(&again, &second));
    assert_eq!(h.connector.connect_count(), 2);
}

#[tokio::test]
async fn test_evicted_tenant_is_recreated() {
    let h = harness(&["store-001"]);

    let old = h.pools.get_connection("store-001").await.unwrap();
    h.pools.evict(old.tenant()).await;

    let fresh = h.pools.get_connection("store-001").await.unwrap();
    assert_ne!(old.id(), fresh.id());
    assert_eq!(fresh.state(), HandleState::Ready);
    assert_eq!(h.connector.connect_count(), 2);
}

#[tokio::test]
async fn test_evict_during_creation_discards_pool() {
    let h = harness_with(
        &["store-001"],
        MemoryConnector::new().with_latency(Duration::from_millis(100)),
    );
    let tenant = TenantId::parse("store-001").unwrap();

    let pools = h.pools.clone();
    let pending = tokio::spawn(async move { pools.get_connection("store-001").await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.pools.stats().initializing, 1);
    assert!(h.pools.evict(&tenant).await);

    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err, AppError::connection_init("store-001"));
    assert!(h.pools.tenants().is_empty());

    let fresh = h.pools.get_connection("store-001").await.unwrap();
    assert!(fresh.is_ready());
}

#[tokio::test]
async fn test_failed_creation_removes_placeholder() {
    let h = harness(&["store-001"]);
    let tenant = TenantId::parse("store-001").unwrap();
    h.connector.fail_tenant(&tenant);

    let err = h.pools.get_connection("store-001").await.unwrap_err();
    assert_eq!(err, AppError::connection_init("store-001"));
    assert!(!err.to_string().contains("refused"));
    assert_eq!(h.pools.stats().initializing, 0);

    h.connector.heal_tenant(&tenant);
    let handle = h.pools.get_connection("store-001").await.unwrap();
    assert!(handle.is_ready());
    assert_eq!(h.connector.connect_count(), 2);
}

#[tokio::test]
async fn test_cancelled_caller_does_not_cancel_creation() {
    let h = harness_with(
        &["store-001"],
        MemoryConnector::new().with_latency(Duration::from_millis(80)),
    );

    let pools = h.pools.clone();
    let impatient = tokio::spawn(async move { pools.get_connection("store-001").await });

    let pools = h.pools.clone();
    let patient = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        pools.get_connection("store-001").await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    impatient.abort();
    assert!(impatient.await.unwrap_err().is_cancelled());

    let handle = patient.await.unwrap().unwrap();
    assert!(handle.is_ready());
    assert_eq!(h.connector.connect_count(), 1);
}

#[tokio::test]
async fn test_shutdown_all_then_recreate() {
    let h = harness(&["store-001", "store-002"]);

    let a = h.pools.get_connection("store-001").await.unwrap();
    let b = h.pools.get_connection("store-002").await.unwrap();

    h.pools.shutdown_all().await;

    assert_eq!(a.state(), HandleState::Closed);
    assert_eq!(b.state(), HandleState::Closed);
    assert_eq!(h.pools.stats().ready, 0);

    let fresh = h.pools.get_connection("store-001").await.unwrap();
    assert_ne!(fresh.id(), a.id());
    assert!(fresh.is_ready());
    assert_eq!(h.connector.connect_count(), 3);
}

#[tokio::test]
async fn test_shutdown_waits_for_inflight_creation() {
    let h = harness_with(
        &["store-001"],
        MemoryConnector::new().with_latency(Duration::from_millis(50)),
    );

    let pools = h.pools.clone();
    let pending = tokio::spawn(async move { pools.get_connection("store-001").await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    h.pools.shutdown_all().await;

    // 创建已完成但随即被关闭，等待方不会拿到已关闭的句柄
    let err = pending.await.unwrap().unwrap_err();
    assert_eq!(err, AppError::connection_init("store-001"));
    assert!(h.pools.tenants().is_empty());
    assert_eq!(
        h.pools.stats(),
        PoolStats {
            ready: 0,
            initializing: 0,
            opened_total: 1,
        }
    );
}

#[tokio::test]
async fn test_evict_refreshes_directory_entry() {
    let mut directory = MockDirectory::new();
    directory
        .expect_lookup()
        .times(2)
        .returning(|tenant| Ok(Some(params(tenant.as_str()))));

    let resolver = Arc::new(SchemaResolver::new(
        Arc::new(directory),
        Duration::from_secs(60),
    ));
    let pools = ConnectionPoolManager::new(resolver.clone(), Arc::new(MemoryConnector::new()));
    let tenant = TenantId::parse("store-001").unwrap();

    pools.connection(&tenant).await.unwrap();
    assert_eq!(resolver.cached_len(), 1);

    assert!(pools.evict(&tenant).await);
    assert_eq!(resolver.cached_len(), 0);

    // 重新创建时再次查询目录
    let fresh = pools.connection(&tenant).await.unwrap();
    assert!(fresh.is_ready());
}
