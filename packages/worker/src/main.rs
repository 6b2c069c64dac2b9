use std::sync::Arc;

use anyhow::Context;
use common::GenerationTask;
use common::blobs::{BlobManager, SeaOrmBlobRefStore};
use common::storage::FilesystemBlobStore;
use common::store::{JobStore, SeaOrmJobStore};
use mq::{BroccoliError, BrokerMessage, MqConfig, init_mq};
use sea_orm::Database;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use worker::{
    GenerationExecutor, GenerationWorker, HttpModelClient, MqDeadLetterSink, WorkerAppConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = WorkerAppConfig::load().context("Failed to load config")?;
    info!("Worker starting: {}", config.worker.id);

    let db = Database::connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    let jobs: Arc<dyn JobStore> = Arc::new(SeaOrmJobStore::new(db.clone()));

    let blob_store = FilesystemBlobStore::new(
        config.storage.blob_dir.clone(),
        config.storage.max_blob_size,
    )
    .await
    .context("Failed to open blob storage")?;
    let blobs = Arc::new(BlobManager::new(
        Arc::new(blob_store),
        Arc::new(SeaOrmBlobRefStore::new(db)),
        config.storage.public_url.clone(),
    ));

    let model = Arc::new(
        HttpModelClient::new(config.model.clone()).context("Failed to build model client")?,
    );

    let mq = Arc::new(
        init_mq(MqConfig::from(&config.mq))
            .await
            .context("Failed to initialize MQ")?,
    );
    info!(
        queue_name = %config.mq.queue_name,
        dlq_queue_name = %config.mq.dlq_queue_name,
        max_retries = config.dlq.max_retries,
        concurrency = config.worker.concurrency,
        "MQ connected"
    );

    let executor = Arc::new(GenerationExecutor::new(
        GenerationWorker::new(jobs.clone(), blobs, model, config.model.clone()),
        jobs,
        config.dlq.retry_policy(),
        Arc::new(MqDeadLetterSink::new(
            Arc::clone(&mq),
            config.mq.dlq_queue_name.clone(),
        )),
    ));

    let result = mq
        .process_messages(
            &config.mq.queue_name,
            Some(config.worker.concurrency),
            None,
            move |message: BrokerMessage<GenerationTask>| {
                let executor = Arc::clone(&executor);
                async move {
                    executor.run_task(message.payload).await;
                    Ok::<(), BroccoliError>(())
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Worker stopped unexpectedly");
    }

    Ok(())
}
