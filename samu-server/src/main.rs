//! SAMU调度服务主程序

use anyhow::{Context, Result};
use clap::Parser;
use samu_admin::{init_logging, ConfigManager, DispatchMetrics, SamuConfig};
use samu_core::collaborators::{Collaborators, InMemoryDirectory};
use samu_database::{DatabaseOptions, DatabasePool, PgStore};
use samu_dispatch::{Audience, DashboardAggregator, DispatchCenter, TimeWindow};
use samu_integration::{
    HttpGeocoder, HttpGeocoderConfig, WebhookManager, WebhookSubscriptionRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// SAMU调度服务命令行参数
#[derive(Parser, Debug)]
#[command(name = "samu-server")]
#[command(about = "SAMU 急救调度与医疗调节服务")]
struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "config/samu.toml")]
    config: String,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<String>,

    /// 看板刷新间隔（秒），覆盖配置文件
    #[arg(long)]
    dashboard_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_manager = ConfigManager::new(&args.config)?;
    let mut config = config_manager.get_config().await;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(interval) = args.dashboard_interval {
        config.dashboard.refresh_interval_secs = interval.max(1);
    }

    // 初始化日志
    init_logging(&config.logging)?;

    info!("Starting {}", config.server.name);
    if let Some(instance) = &config.server.instance_id {
        info!("  instance: {}", instance);
    }

    let (collaborators, database) = build_collaborators(&config).await?;
    let center = Arc::new(DispatchCenter::new(collaborators, config.dispatch_settings()));
    let restored = center.restore().await.context("Failed to restore state")?;
    info!(
        "State restored: {} occurrences, {} vehicles, {} audit events",
        restored.occurrences, restored.vehicles, restored.events
    );

    spawn_notification_logger(&center);
    spawn_webhook_forwarder(&center, &config).await?;
    let metrics = DispatchMetrics::new()?;
    spawn_dashboard_loop(
        center.clone(),
        metrics,
        Duration::from_secs(config.dashboard.refresh_interval_secs),
    );

    info!("Dispatch center running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    if let Some(database) = database {
        database.close().await;
    }
    Ok(())
}

/// 按配置组装协作方
async fn build_collaborators(config: &SamuConfig) -> Result<(Collaborators, Option<DatabasePool>)> {
    let directory = Arc::new(InMemoryDirectory::new());
    for seed in &config.directory.operators {
        directory.add_operator(seed.id, seed.name.clone()).await;
    }
    for seed in &config.directory.regulation_centers {
        directory.add_center(seed.id, seed.name.clone()).await;
    }
    for seed in &config.directory.facilities {
        directory.add_facility(seed.id, seed.name.clone()).await;
    }
    info!(
        "Directory seeded: {} operators, {} regulation centers, {} facilities",
        config.directory.operators.len(),
        config.directory.regulation_centers.len(),
        config.directory.facilities.len()
    );

    let mut collaborators = Collaborators::in_memory(directory);

    if config.geocoding.enabled {
        let geocoder = HttpGeocoder::new(&HttpGeocoderConfig {
            base_url: config.geocoding.base_url.clone(),
            user_agent: config.geocoding.user_agent.clone(),
            request_timeout: Duration::from_millis(config.geocoding.request_timeout_ms),
        })?;
        collaborators = collaborators.with_geocoder(Arc::new(geocoder));
        info!("Geocoding enabled: {}", config.geocoding.base_url);
    } else {
        warn!("Geocoding disabled, occurrences without coordinates stay unlocated");
    }

    let mut database = None;
    if config.database.enabled {
        let pool = DatabasePool::connect(&DatabaseOptions {
            url: config.database.connection_string.clone(),
            max_connections: config.database.max_connections,
            connect_timeout: Duration::from_secs(config.database.connect_timeout_secs),
        })
        .await?;
        let store = Arc::new(PgStore::initialize(pool.clone()).await?);
        collaborators = collaborators
            .with_store(store.clone())
            .with_sequence(store);
        database = Some(pool);
    } else {
        warn!("Database disabled, state is kept in memory only");
    }

    Ok((collaborators, database))
}

/// 把所有通知写入日志
fn spawn_notification_logger(center: &DispatchCenter) {
    let mut subscription = center.subscribe(&Audience::all());
    tokio::spawn(async move {
        while let Some(notification) = subscription.recv().await {
            info!(
                "[{:?}] {} occurrence={:?} vehicle={:?} status={}",
                notification.audiences,
                notification.kind,
                notification.occurrence_id,
                notification.vehicle_id,
                notification.status.as_deref().unwrap_or("-")
            );
        }
    });
}

/// 把通知转发给配置的外部订阅方
async fn spawn_webhook_forwarder(center: &DispatchCenter, config: &SamuConfig) -> Result<()> {
    if config.webhooks.is_empty() {
        return Ok(());
    }

    let manager = Arc::new(WebhookManager::new());
    for webhook in &config.webhooks {
        manager
            .subscribe(WebhookSubscriptionRequest {
                url: webhook.url.clone(),
                audiences: webhook.audiences.clone(),
                secret: webhook.secret.clone(),
            })
            .await?;
    }

    let subscription = center.subscribe(&Audience::all());
    tokio::spawn(manager.forward(subscription));
    info!("Forwarding notifications to {} webhooks", config.webhooks.len());
    Ok(())
}

/// 周期性生成看板快照，更新指标并发布告警
fn spawn_dashboard_loop(center: Arc<DispatchCenter>, metrics: DispatchMetrics, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;

            let snapshot = center.dashboard(TimeWindow::last_hours(24)).await;
            metrics.observe(&snapshot);
            let published = DashboardAggregator::publish_alerts(&snapshot, center.bus());
            if !snapshot.alerts.is_empty() {
                warn!(
                    "Dashboard raised {} alerts ({} published)",
                    snapshot.alerts.len(),
                    published
                );
            }

            match metrics.get_prometheus_metrics() {
                Ok(text) => tracing::trace!("{}", text),
                Err(e) => error!("Failed to encode metrics: {}", e),
            }
        }
    });
}
