use std::sync::Arc;

use common::blobs::{BlobManager, BlobRefStore, MemoryBlobRefStore, SeaOrmBlobRefStore};
use common::storage::{FilesystemBlobStore, StorageError};
use common::store::{JobStore, MemoryJobStore, SeaOrmJobStore};
use mq::Mq;
use sea_orm::DatabaseConnection;
use worker::{
    DeadLetterSink, GenerationExecutor, GenerationWorker, MemoryDeadLetterSink, ModelClient,
};

use crate::config::AppConfig;
use crate::dlq::DbDeadLetterSink;
use crate::live::{FeedNotifier, NotifyingJobStore};
use crate::scheduler::{LocalScheduler, MqScheduler, Scheduler};
use crate::services::GenerationService;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub generations: Arc<GenerationService>,
    pub blobs: Arc<BlobManager>,
    pub notifier: FeedNotifier,
}

/// Everything the server runs: the HTTP state plus the handles background
/// tasks need.
pub struct Services {
    pub state: AppState,
    pub jobs: Arc<dyn JobStore>,
    pub dead_letters: Arc<dyn DeadLetterSink>,
}

impl Services {
    /// Wire stores, scheduler and services.
    ///
    /// Without `db` jobs, blob handles and dead letters live in memory. With
    /// `mq` jobs are published for stand-alone workers; otherwise they run in
    /// this process against `model`.
    pub async fn build(
        config: AppConfig,
        db: Option<DatabaseConnection>,
        mq: Option<Arc<Mq>>,
        model: Arc<dyn ModelClient>,
    ) -> Result<Self, StorageError> {
        let notifier = FeedNotifier::default();

        let (raw_jobs, refs, dead_letters): (
            Arc<dyn JobStore>,
            Arc<dyn BlobRefStore>,
            Arc<dyn DeadLetterSink>,
        ) = match db {
            Some(db) => (
                Arc::new(SeaOrmJobStore::new(db.clone())),
                Arc::new(SeaOrmBlobRefStore::new(db.clone())),
                Arc::new(DbDeadLetterSink::new(db)),
            ),
            None => (
                Arc::new(MemoryJobStore::new()),
                Arc::new(MemoryBlobRefStore::new()),
                Arc::new(MemoryDeadLetterSink::new()),
            ),
        };
        let jobs: Arc<dyn JobStore> = Arc::new(NotifyingJobStore::new(raw_jobs, notifier.clone()));

        let blob_store = FilesystemBlobStore::new(
            config.storage.blob_dir.clone(),
            config.storage.max_blob_size,
        )
        .await?;
        let blobs = Arc::new(BlobManager::new(
            Arc::new(blob_store),
            refs,
            config.storage.public_url.clone(),
        ));

        let scheduler: Arc<dyn Scheduler> = match mq {
            Some(mq) => Arc::new(MqScheduler::new(mq, config.mq.queue_name.clone())),
            None => {
                let worker = GenerationWorker::new(
                    jobs.clone(),
                    blobs.clone(),
                    model,
                    config.generation.model.clone(),
                );
                let executor = GenerationExecutor::new(
                    worker,
                    jobs.clone(),
                    config.dlq.retry_policy(),
                    dead_letters.clone(),
                );
                Arc::new(LocalScheduler::new(Arc::new(executor)))
            }
        };

        let generations = Arc::new(GenerationService::new(
            jobs.clone(),
            blobs.clone(),
            scheduler,
            config.generation.clone(),
        ));

        Ok(Self {
            state: AppState {
                config,
                generations,
                blobs,
                notifier,
            },
            jobs,
            dead_letters,
        })
    }
}
