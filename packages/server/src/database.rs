use std::time::Duration;

use common::entity::generation;
use sea_orm::sea_query::{Index, IndexCreateStatement, PostgresQueryBuilder};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use tracing::{error, info};

pub async fn init_db(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());

    // Set connection pool options
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;
    db.get_schema_registry("common::entity::*")
        .sync(&db)
        .await?;
    db.get_schema_registry("server::entity::*")
        .sync(&db)
        .await?;

    Ok(db)
}

/// Create the secondary indexes the feed queries are served from.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Whole feed and pagination:
    // WHERE owner_id = ? ORDER BY created_at DESC, id DESC
    let owner_created = Index::create()
        .if_not_exists()
        .name("idx_generation_owner_created")
        .table(generation::Entity)
        .col(generation::Column::OwnerId)
        .col(generation::Column::CreatedAt)
        .to_owned();
    create_index(db, "idx_generation_owner_created", owner_created).await?;

    // Saved feed:
    // WHERE owner_id = ? AND is_saved ORDER BY created_at DESC
    let owner_saved_created = Index::create()
        .if_not_exists()
        .name("idx_generation_owner_saved_created")
        .table(generation::Entity)
        .col(generation::Column::OwnerId)
        .col(generation::Column::IsSaved)
        .col(generation::Column::CreatedAt)
        .to_owned();
    create_index(db, "idx_generation_owner_saved_created", owner_saved_created).await?;

    Ok(())
}

async fn create_index(
    db: &DatabaseConnection,
    name: &str,
    stmt: IndexCreateStatement,
) -> Result<(), DbErr> {
    db.execute_unprepared(&stmt.to_string(PostgresQueryBuilder))
        .await
        .inspect_err(|e| error!("Failed to create index {name}: {e}"))?;
    info!("Ensured index {name} exists");
    Ok(())
}
