use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use common::{FeedPage, GenerationView};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::generation::{CreateGenerationRequest, CreateGenerationResponse, FeedPageQuery};
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/",
    tag = "Generations",
    operation_id = "createGeneration",
    summary = "Start a generation",
    description = "Creates a `Processing` job from an uploaded sketch and a prompt, and schedules it. \
        Returns as soon as the job is recorded; follow its progress through the feed.",
    request_body = CreateGenerationRequest,
    responses(
        (status = 201, description = "Job created", body = CreateGenerationResponse),
        (status = 400, description = "Invalid prompt or sketch not uploaded (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Sketch belongs to another user (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Sketch not found (NOT_FOUND)", body = ErrorBody),
        (status = 409, description = "Sketch already used by another generation (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(owner_id = %auth_user.owner_id, canvas = %payload.canvas_ref))]
pub async fn create_generation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateGenerationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let id = state
        .generations
        .create(&auth_user.owner_id, &payload.prompt, payload.canvas_ref)
        .await?;
    Ok((StatusCode::CREATED, Json(CreateGenerationResponse { id })))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Generations",
    operation_id = "listGenerations",
    summary = "Whole feed",
    description = "All of the caller's generations, newest first, with image handles resolved to URLs.",
    responses(
        (status = 200, description = "Feed", body = Vec<GenerationView>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(owner_id = %auth_user.owner_id))]
pub async fn list_generations(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<GenerationView>>, AppError> {
    Ok(Json(state.generations.list(&auth_user.owner_id).await?))
}

#[utoipa::path(
    get,
    path = "/page",
    tag = "Generations",
    operation_id = "pageGenerations",
    summary = "One page of the feed",
    description = "Keyset pagination over the caller's feed, newest first. Pass `next_cursor` back as `cursor` \
        until it is `null`. Jobs created after the first page do not shift later pages.",
    params(FeedPageQuery),
    responses(
        (status = 200, description = "Feed page", body = FeedPage),
        (status = 400, description = "Malformed cursor (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(owner_id = %auth_user.owner_id))]
pub async fn page_generations(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<FeedPageQuery>,
) -> Result<Json<FeedPage>, AppError> {
    let page = state
        .generations
        .page(&auth_user.owner_id, query.cursor.as_deref(), query.page_size)
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/saved",
    tag = "Generations",
    operation_id = "listSavedGenerations",
    summary = "Saved generations",
    description = "The caller's saved generations, newest first.",
    responses(
        (status = 200, description = "Saved feed", body = Vec<GenerationView>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(owner_id = %auth_user.owner_id))]
pub async fn list_saved_generations(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<GenerationView>>, AppError> {
    Ok(Json(state.generations.list_saved(&auth_user.owner_id).await?))
}

#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Generations",
    operation_id = "getGeneration",
    summary = "Get one generation",
    params(("id" = Uuid, Path, description = "Generation ID")),
    responses(
        (status = 200, description = "Generation", body = GenerationView),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Owned by another user (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Generation not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(owner_id = %auth_user.owner_id))]
pub async fn get_generation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GenerationView>, AppError> {
    Ok(Json(state.generations.get(&auth_user.owner_id, id).await?))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Generations",
    operation_id = "deleteGeneration",
    summary = "Delete a generation",
    description = "Removes the job and both of its images. A job still `Processing` may be deleted; \
        its worker discards the result.",
    params(("id" = Uuid, Path, description = "Generation ID")),
    responses(
        (status = 204, description = "Generation deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Owned by another user (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Generation not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(owner_id = %auth_user.owner_id))]
pub async fn delete_generation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.generations.delete(&auth_user.owner_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/{id}/toggle-save",
    tag = "Generations",
    operation_id = "toggleSaveGeneration",
    summary = "Flip the saved flag",
    params(("id" = Uuid, Path, description = "Generation ID")),
    responses(
        (status = 200, description = "Updated generation", body = GenerationView),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Owned by another user (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Generation not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(owner_id = %auth_user.owner_id))]
pub async fn toggle_save_generation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GenerationView>, AppError> {
    Ok(Json(
        state.generations.toggle_save(&auth_user.owner_id, id).await?,
    ))
}
