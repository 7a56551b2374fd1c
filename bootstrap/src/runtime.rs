//! 服务运行时

use metrics_exporter_prometheus::PrometheusHandle;
use retail_config::AppConfig;
use retail_telemetry::{TelemetryError, init_metrics, init_tracing, init_tracing_json};
use tracing::{error, info};

/// 服务运行时配置
pub struct RuntimeConfig {
    pub config_dir: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            config_dir: "config".to_string(),
        }
    }
}

/// 初始化服务运行时
///
/// 生产环境或 `telemetry.json = true` 时输出 JSON 日志。
/// 开启 `telemetry.metrics` 时返回 Prometheus handle，由调用方负责暴露。
pub fn init_runtime(config: &AppConfig) -> Result<Option<PrometheusHandle>, TelemetryError> {
    if config.is_production() || config.telemetry.json {
        init_tracing_json(&config.telemetry.log_level)?;
    } else {
        init_tracing(&config.telemetry.log_level)?;
    }

    let metrics = if config.telemetry.metrics {
        Some(init_metrics()?)
    } else {
        None
    };

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        metrics = metrics.is_some(),
        "Runtime initialized"
    );

    Ok(metrics)
}

/// 等待关闭信号
///
/// 信号处理器安装失败时只记录日志，对应的分支永不触发。
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
