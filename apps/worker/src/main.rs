//! Lodge maintenance worker: purge loop, blocklist refresh, thumbnails.

#![forbid(unsafe_code)]

mod thumbnails;
mod worker_config;

use std::sync::Arc;
use std::time::Duration;

use lodge_application::{
    BlocklistService, PurgeConfig, PurgeService, run_interval, run_supervised,
};
use lodge_core::AppError;
use lodge_infrastructure::{
    FsStorageProvider, HttpBlocklistFetcher, PostgresAttachmentRepository,
    PostgresLoginAttemptRepository, PostgresTombstoneRepository, RedisThumbnailQueue,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    worker_config::init_tracing();

    let config = worker_config::WorkerConfig::load()?;
    let pool = lodge_infrastructure::connect_and_migrate(
        &config.database_url,
        config.database_max_conn,
        1,
    )
    .await?;
    let redis_client = lodge_infrastructure::build_redis_client(&config.redis_url)?;

    let storage = Arc::new(FsStorageProvider::new(config.storage_root.clone()));
    let attachments = Arc::new(PostgresAttachmentRepository::new(pool.clone()));

    let purge_service = PurgeService::new(
        Arc::new(PostgresLoginAttemptRepository::new(pool.clone())),
        Arc::new(PostgresTombstoneRepository::new(pool)),
        attachments.clone(),
        storage.clone(),
        PurgeConfig {
            login_attempt_retention: config.login_attempt_retention,
            tombstone_retention: config.tombstone_retention,
            attachment_orphan_ttl: config.attachment_orphan_ttl,
        },
    );

    let blocklist_service = match config.disposable_email_url {
        Some(ref url) => Some(BlocklistService::new(
            Arc::new(HttpBlocklistFetcher::new(url.clone())?),
            config.disposable_email_enabled,
        )),
        None => None,
    };

    let thumbnail_worker = thumbnails::ThumbnailWorker::new(
        Arc::new(RedisThumbnailQueue::new(redis_client)),
        attachments,
        storage,
    );

    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    info!(
        purge_interval_secs = config.purge_interval.as_secs(),
        blocklist_enabled = blocklist_service.is_some(),
        "lodge-worker started"
    );

    {
        let purge_interval = config.purge_interval;
        let token = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            run_supervised("purge-loop", token, move |child| {
                let purge_service = purge_service.clone();
                async move {
                    run_interval(purge_interval, child, || {
                        let purge_service = purge_service.clone();
                        async move { purge_service.run_once().await }
                    })
                    .await
                }
            })
            .await;
        }));
    }

    if let Some(blocklist_service) = blocklist_service {
        let refresh_interval = config.blocklist_refresh_interval;
        let token = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            run_supervised("blocklist-refresh", token, move |child| {
                let blocklist_service = blocklist_service.clone();
                async move {
                    run_interval(refresh_interval, child, || {
                        let blocklist_service = blocklist_service.clone();
                        async move { blocklist_service.refresh().await }
                    })
                    .await
                }
            })
            .await;
        }));
    }

    {
        let token = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            run_supervised("thumbnail-worker", token, move |child| {
                let thumbnail_worker = thumbnail_worker.clone();
                async move { thumbnail_worker.run(child).await }
            })
            .await;
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|error| AppError::Internal(format!("failed to wait for ctrl-c: {error}")))?;
    info!("shutdown signal received");
    shutdown.cancel();

    let drain = async {
        for task in tasks {
            let _ = task.await;
        }
    };
    tokio::time::timeout(Duration::from_secs(15), drain).await.ok();

    info!("lodge-worker stopped");
    Ok(())
}
