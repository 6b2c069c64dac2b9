use serde::Serialize;

/// Identity of the caller as asserted by their token.
#[derive(Serialize, utoipa::ToSchema)]
pub struct MeResponse {
    /// Owner id (`sub` claim).
    #[schema(example = "google-oauth2|1149847329")]
    pub id: String,
    #[schema(example = "Alice Liddell")]
    pub name: Option<String>,
    #[schema(example = "alice@example.com")]
    pub email: Option<String>,
    /// Avatar URL.
    pub image: Option<String>,
}
