//! Graceful Shutdown

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Infrastructure;

/// Shutdown 控制器
///
/// 触发后所有克隆都能观察到，先触发再等待也会立即返回。
#[derive(Clone, Default)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// 触发关闭
    pub fn shutdown(&self) {
        if !self.token.is_cancelled() {
            info!("Triggering shutdown");
        }
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待关闭信号
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}

/// 运行到 `signal` 完成为止，然后按顺序关闭
///
/// 运行期间后台回收空闲租户连接池；收到信号后先停止回收任务，
/// 再等待进行中的连接池创建并关闭全部租户连接池。
pub async fn run_until_shutdown<S>(infra: &Infrastructure, signal: S)
where
    S: Future<Output = ()>,
{
    let controller = ShutdownController::new();
    let sweeper = infra.spawn_idle_sweeper(controller.clone());

    signal.await;
    controller.shutdown();

    if let Some(sweeper) = sweeper {
        if let Err(e) = sweeper.await {
            warn!(error = %e, "Idle sweeper terminated abnormally");
        }
    }

    infra.shutdown().await;
}

/// 空闲回收的扫描间隔，取空闲阈值的一半，至少一秒
pub fn sweep_interval(handle_idle: Duration) -> Duration {
    (handle_idle / 2).max(Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_after_shutdown_returns() {
        let controller = ShutdownController::new();
        let observer = controller.clone();

        controller.shutdown();
        observer.wait().await;
        assert!(observer.is_shutdown());
    }

    #[tokio::test]
    async fn test_wait_blocks_until_shutdown() {
        let controller = ShutdownController::new();
        let observer = controller.clone();

        let waiter = tokio::spawn(async move { observer.wait().await });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        controller.shutdown();
        waiter.await.unwrap();
    }

    #[test]
    fn test_sweep_interval() {
        assert_eq!(sweep_interval(Duration::from_secs(1800)), Duration::from_secs(900));
        assert_eq!(sweep_interval(Duration::from_millis(10)), Duration::from_secs(1));
    }
}
