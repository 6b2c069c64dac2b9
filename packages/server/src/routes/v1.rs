use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest("/uploads", upload_routes(config.storage.max_blob_size))
        .nest("/blobs", blob_routes())
        .nest("/generations", generation_routes())
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::auth::me))
}

fn upload_routes(max_blob_size: u64) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::upload::create_upload))
        .routes(routes!(handlers::upload::put_upload))
        .layer(handlers::upload::upload_body_limit(max_blob_size))
}

fn blob_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::upload::get_blob))
}

fn generation_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            handlers::generation::list_generations,
            handlers::generation::create_generation
        ))
        .routes(routes!(handlers::generation::page_generations))
        .routes(routes!(handlers::generation::list_saved_generations))
        .routes(routes!(handlers::live::live_feed))
        .routes(routes!(
            handlers::generation::get_generation,
            handlers::generation::delete_generation
        ))
        .routes(routes!(handlers::generation::toggle_save_generation))
}
