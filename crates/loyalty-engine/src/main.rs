//! 积分引擎后台进程入口
//!
//! 装配仓储与服务后，以固定间隔运行积分过期清扫，直到收到
//! 终止信号优雅退出。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use loyalty_shared::{config::AppConfig, database::Database, observability};
use tokio::signal;
use tracing::{error, info, warn};

use loyalty_engine::{
    lock::MemberLockManager,
    notification::{NotificationSender, NotificationService},
    repository::{RewardRepository, TransactionRepository},
    service::ExpiryService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 统一加载配置：config/*.toml + LOYALTY_ 前缀环境变量
    let config = AppConfig::load("loyalty-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    // 2. 初始化日志与 metrics
    observability::init(&config.service_name, &config.observability)?;

    info!("Starting loyalty-engine...");
    info!(environment = %config.environment, "Configuration loaded");

    // 3. 初始化数据库连接
    let db = Database::connect(&config.database).await?;
    db.health_check().await?;
    let pool = db.pool().clone();
    info!("Database connection established");

    // 4. 创建仓储与基础设施
    let transaction_repo = Arc::new(TransactionRepository::new(pool.clone()));
    let reward_repo = Arc::new(RewardRepository::new(pool.clone()));
    let locks = Arc::new(MemberLockManager::with_defaults());

    // 通知链路在此进程中装配但仅由服务触发
    let notification_service = Arc::new(NotificationService::with_defaults(&config.notification));
    let _notification_sender = NotificationSender::new(notification_service);

    // 5. 过期清扫服务
    let expiry_service = ExpiryService::new(
        transaction_repo,
        reward_repo,
        locks,
        pool,
        config.expiry.batch_size,
    );
    info!(
        interval_seconds = config.expiry.interval_seconds,
        batch_size = config.expiry.batch_size,
        "Expiry sweep scheduled"
    );

    // 6. 固定间隔清扫，直到收到终止信号
    let mut interval =
        tokio::time::interval(Duration::from_secs(config.expiry.interval_seconds));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match expiry_service.sweep().await {
                    Ok(report) if report.failures > 0 => {
                        warn!(failures = report.failures, "清扫部分失败");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "清扫执行失败");
                    }
                }
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received, stopping loyalty-engine");
                break;
            }
        }
    }

    db.close().await;
    info!("loyalty-engine stopped");
    Ok(())
}

/// 等待 Ctrl+C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
