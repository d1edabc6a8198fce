//! Streaming endpoints
//!
//! Forwards bus channels to subscribers via Server-Sent Events (SSE).
//! Each endpoint attaches one subscriber to one channel; a lagging
//! subscriber drops events and recovers by re-fetching history.

use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::stream::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::bus::channel;
use crate::error::AppError;

/// Create streaming router
pub fn streaming_router() -> Router<AppState> {
    Router::new()
        .route("/streaming/user", get(stream_user))
        .route("/streaming/notifications", get(stream_notifications))
        .route("/streaming/conversation/:id", get(stream_conversation))
        .route(
            "/streaming/conversation/:id/typing",
            get(stream_conversation_typing),
        )
        .route(
            "/streaming/conversation/:id/read",
            get(stream_conversation_read),
        )
        .route("/streaming/presence/:username", get(stream_presence))
}

type EventStream = Sse<Box<dyn Stream<Item = Result<Event, Infallible>> + Send + Unpin>>;

fn sse_from(receiver: broadcast::Receiver<serde_json::Value>) -> EventStream {
    let stream = BroadcastStream::new(receiver)
        // Lagged receivers skip dropped items instead of erroring out.
        .filter_map(|payload| futures::future::ready(payload.ok()))
        .map(|payload| Ok(Event::default().event("update").data(payload.to_string())));

    Sse::new(Box::new(stream) as Box<dyn Stream<Item = Result<Event, Infallible>> + Send + Unpin>)
        .keep_alive(KeepAlive::default())
}

/// GET /api/streaming/user
///
/// The authenticated user's private message queue. Carries every message
/// addressed to them, including the first message of a conversation they
/// have not subscribed to yet.
async fn stream_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<EventStream, AppError> {
    Ok(sse_from(state.bus.subscribe(&channel::user_queue(&user.id))))
}

/// GET /api/streaming/notifications
async fn stream_notifications(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<EventStream, AppError> {
    Ok(sse_from(
        state
            .bus
            .subscribe(&channel::user_notifications(&user.id)),
    ))
}

/// GET /api/streaming/conversation/:id
async fn stream_conversation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<EventStream, AppError> {
    require_participant(&state, &id, &user.id).await?;
    Ok(sse_from(state.bus.subscribe(&channel::conversation(&id))))
}

/// GET /api/streaming/conversation/:id/typing
async fn stream_conversation_typing(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<EventStream, AppError> {
    require_participant(&state, &id, &user.id).await?;
    Ok(sse_from(
        state.bus.subscribe(&channel::conversation_typing(&id)),
    ))
}

/// GET /api/streaming/conversation/:id/read
async fn stream_conversation_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<EventStream, AppError> {
    require_participant(&state, &id, &user.id).await?;
    Ok(sse_from(
        state.bus.subscribe(&channel::conversation_read(&id)),
    ))
}

/// GET /api/streaming/presence/:username
async fn stream_presence(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(username): Path<String>,
) -> Result<EventStream, AppError> {
    Ok(sse_from(
        state.bus.subscribe(&channel::user_presence(&username)),
    ))
}

async fn require_participant(
    state: &AppState,
    conversation_id: &str,
    user_id: &str,
) -> Result<(), AppError> {
    if !state
        .conversations
        .is_participant(conversation_id, user_id)
        .await?
    {
        return Err(AppError::NotFound("Conversation not found".to_string()));
    }
    Ok(())
}
