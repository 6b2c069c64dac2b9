use common::blobs::BlobRef;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for starting a generation.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateGenerationRequest {
    /// Text prompt (1-1000 characters after trimming by default).
    #[schema(example = "a watercolor fox in a snowy forest")]
    pub prompt: String,
    /// Handle of an uploaded sketch owned by the caller and not yet used.
    pub canvas_ref: BlobRef,
}

/// Id of the new `Processing` job.
#[derive(Serialize, utoipa::ToSchema)]
pub struct CreateGenerationResponse {
    pub id: Uuid,
}

/// Query parameters for the paginated feed.
#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeedPageQuery {
    /// `next_cursor` of the previous page. Omit for the first page.
    pub cursor: Option<String>,
    /// Items per page (default 20, clamped to 1-100).
    #[param(example = 20)]
    pub page_size: Option<u64>,
}

/// Query parameters of the live feed socket.
#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LiveFeedQuery {
    /// Bearer token, for clients that cannot set the `Authorization` header
    /// on a WebSocket handshake.
    pub token: Option<String>,
}
