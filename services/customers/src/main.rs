//! retail-customers 服务入口

use retail_bootstrap::{
    Infrastructure, RuntimeConfig, init_runtime, run_until_shutdown, shutdown_signal,
};
use retail_config::AppConfig;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = RuntimeConfig::default();
    let config = AppConfig::load(&runtime.config_dir)?;
    let _metrics = init_runtime(&config)?;

    info!("Initializing customers service...");
    let infra = Infrastructure::from_config(config).await?;
    info!("Customers service ready");

    run_until_shutdown(&infra, shutdown_signal()).await;
    info!("Customers service stopped");
    Ok(())
}
