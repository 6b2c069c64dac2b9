use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, instrument, warn};

use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::{AuthUser, bearer_token};
use crate::models::generation::LiveFeedQuery;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/live",
    tag = "Generations",
    operation_id = "liveGenerations",
    summary = "Live feed (WebSocket)",
    description = "Upgrades to a WebSocket that pushes the caller's whole feed (a JSON array of generations, \
        newest first) as a text frame: once on connect, after every change to one of the caller's jobs, \
        and periodically. Authenticate with the `Authorization` header or the `token` query parameter.",
    params(LiveFeedQuery),
    responses(
        (status = 101, description = "Switching protocols"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, headers, query, ws))]
pub async fn live_feed(
    State(state): State<AppState>,
    Query(query): Query<LiveFeedQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let token = match bearer_token(&headers)? {
        Some(token) => token.to_string(),
        None => query.token.ok_or(AppError::TokenMissing)?,
    };
    let auth_user = AuthUser::from_token(&token, &state.config.auth.jwt_secret)?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, auth_user.owner_id)))
}

async fn handle_socket(socket: WebSocket, state: AppState, owner_id: String) {
    info!(owner_id = %owner_id, "Live feed connected");

    // Subscribe before the first snapshot so no change falls in between.
    let mut changes = state.notifier.subscribe();
    let refresh = Duration::from_secs(state.config.generation.live_refresh_secs.max(1));
    let (mut sink, mut stream) = socket.split();

    let sender_owner = owner_id.clone();
    let send_task = tokio::spawn(async move {
        let owner_id = sender_owner;
        // The first tick fires immediately and sends the initial snapshot.
        let mut ticker = tokio::time::interval(refresh);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                change = changes.recv() => match change {
                    Ok(owner) if owner == owner_id => {}
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(owner_id = %owner_id, skipped, "Live feed lagged, resending snapshot");
                    }
                    Err(RecvError::Closed) => break,
                },
            }

            let feed = match state.generations.list(&owner_id).await {
                Ok(feed) => feed,
                Err(e) => {
                    warn!(owner_id = %owner_id, error = ?e, "Failed to load live feed snapshot");
                    continue;
                }
            };
            let text = match serde_json::to_string(&feed) {
                Ok(text) => text,
                Err(e) => {
                    warn!(owner_id = %owner_id, error = %e, "Failed to encode live feed snapshot");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                debug!(owner_id = %owner_id, "Live feed sink closed");
                break;
            }
        }
    });

    // Inbound frames carry nothing; only watch for the close.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(owner_id = %owner_id, error = %e, "Live feed receive error");
                break;
            }
        }
    }

    send_task.abort();
    info!(owner_id = %owner_id, "Live feed disconnected");
}
