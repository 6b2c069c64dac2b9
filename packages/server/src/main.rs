use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use mq::{MqConfig, init_mq};
use server::blob_sweep::run_unattached_blob_sweeper;
use server::config::AppConfig;
use server::consumers::consume_generation_dlq;
use server::dlq::run_stuck_job_detector;
use server::state::Services;
use tracing::info;
use tracing_subscriber::EnvFilter;
use worker::HttpModelClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::load().context("Failed to load config")?;

    let db = match &config.database.url {
        Some(url) => {
            let db = server::database::init_db(url)
                .await
                .context("Failed to initialize database")?;
            server::database::ensure_indexes(&db)
                .await
                .context("Failed to create indexes")?;
            Some(db)
        }
        None => {
            info!("No database configured, keeping jobs in memory");
            None
        }
    };

    let mq = if config.mq.enabled {
        let mq = init_mq(MqConfig::from(&config.mq))
            .await
            .context("Failed to initialize MQ")?;
        info!(
            queue_name = %config.mq.queue_name,
            dlq_queue_name = %config.mq.dlq_queue_name,
            "MQ connected, generations run on stand-alone workers"
        );
        Some(Arc::new(mq))
    } else {
        info!("MQ disabled, generations run in-process");
        None
    };

    let model = Arc::new(
        HttpModelClient::new(config.generation.model.clone())
            .context("Failed to build model client")?,
    );

    let services = Services::build(config.clone(), db.clone(), mq.clone(), model)
        .await
        .context("Failed to open blob storage")?;

    tokio::spawn(run_stuck_job_detector(
        services.jobs.clone(),
        services.dead_letters.clone(),
        config.dlq.clone(),
    ));
    tokio::spawn(run_unattached_blob_sweeper(
        services.state.blobs.clone(),
        config.storage.clone(),
    ));

    if let (Some(db), Some(mq)) = (db, mq) {
        tokio::spawn(consume_generation_dlq(
            db,
            mq,
            config.mq.dlq_queue_name.clone(),
        ));
    }

    let app = server::build_router(services.state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    info!("Server running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
