use axum::Json;
use tracing::instrument;

use crate::error::ErrorBody;
use crate::extractors::auth::AuthUser;
use crate::models::auth::MeResponse;

#[utoipa::path(
    get,
    path = "/me",
    tag = "Auth",
    operation_id = "getMe",
    summary = "Current caller",
    description = "Returns the identity carried by the bearer token. Tokens are issued by the external identity provider.",
    responses(
        (status = 200, description = "Caller identity", body = MeResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(auth_user), fields(owner_id = %auth_user.owner_id))]
pub async fn me(auth_user: AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        id: auth_user.owner_id,
        name: auth_user.name,
        email: auth_user.email,
        image: auth_user.image,
    })
}
