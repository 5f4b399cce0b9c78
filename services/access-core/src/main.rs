//! access-core 服务入口

use std::path::Path;

use access_core::{AccessSystem, OperationContext, apply_seed};
use anyhow::Context;
use tracing::{info, warn};
use uas_config::AccessConfig;
use uas_telemetry::{init_metrics, init_tracing, init_tracing_json};

const CONFIG_DIR: &str = "config";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 不存在时忽略
    let _ = dotenvy::dotenv();

    let config = if Path::new(CONFIG_DIR).is_dir() {
        AccessConfig::load(CONFIG_DIR).context("failed to load configuration")?
    } else {
        AccessConfig::default()
    };

    if config.telemetry.json || config.is_production() {
        init_tracing_json(&config.telemetry.log_level)?;
    } else {
        init_tracing(&config.telemetry.log_level)?;
    }
    let _metrics = if config.telemetry.prometheus {
        Some(init_metrics()?)
    } else {
        None
    };

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        "Starting access-core"
    );

    let system = AccessSystem::from_config(&config).await?;
    let ctx = OperationContext::new();

    if config.seed.enabled {
        apply_seed(&system, &ctx)
            .await
            .context("seeding failed")?;
    }

    let distribution = system.access.list_groups_with_user_counts(&ctx).await;
    match distribution.data {
        Some(counts) => {
            for (group, users) in &counts {
                info!(group = %group, users, "Group distribution");
            }
        }
        None => warn!(code = ?distribution.error_code, message = %distribution.message, "Group distribution unavailable"),
    }

    shutdown_signal().await;
    ctx.cancellation().cancel();
    info!("access-core stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
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
