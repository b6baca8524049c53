use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::errors::ServiceError;
use crate::handlers::{created_response, validate_input};
use crate::services::support::{
    MessageView, OpenTicketInput, PostMessageInput, TicketSummary, TicketView,
};
use crate::{ApiResponse, ApiResult, AppState, ListQuery, PaginatedResponse};

pub fn support_routes() -> Router<AppState> {
    Router::new()
        .route("/tickets", get(list_tickets).post(open_ticket))
        .route("/tickets/:id", get(get_ticket))
        .route("/tickets/:id/messages", post(post_message))
        .route("/tickets/:id/stream", get(stream_ticket))
        .route("/tickets/:id/close", post(close_ticket))
}

/// Open a support ticket
#[utoipa::path(
    post,
    path = "/api/v1/support/tickets",
    request_body = OpenTicketInput,
    responses(
        (status = 201, description = "Ticket opened", body = crate::ApiResponse<TicketView>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Support"
)]
pub async fn open_ticket(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<OpenTicketInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let ticket = state
        .services
        .support
        .open_ticket(user.user_id, payload)
        .await?;
    Ok(created_response(ticket))
}

/// The user's tickets, most recently active first
#[utoipa::path(
    get,
    path = "/api/v1/support/tickets",
    params(("page" = u64, Query, description = "Page number"), ("limit" = u64, Query, description = "Page size")),
    responses(
        (status = 200, description = "Tickets listed", body = crate::ApiResponse<PaginatedResponse<TicketSummary>>)
    ),
    security(("Bearer" = [])),
    tag = "Support"
)]
pub async fn list_tickets(
    user: CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<PaginatedResponse<TicketSummary>> {
    let page = query.page.max(1);
    let limit = query.capped_limit();
    let (items, total) = state
        .services
        .support
        .list_tickets(user.user_id, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

/// Ticket detail with the full conversation
#[utoipa::path(
    get,
    path = "/api/v1/support/tickets/:id",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Ticket retrieved", body = crate::ApiResponse<TicketView>),
        (status = 404, description = "Ticket not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Support"
)]
pub async fn get_ticket(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<TicketView> {
    let ticket = state.services.support.get_ticket(user.user_id, id).await?;
    Ok(Json(ApiResponse::success(ticket)))
}

/// Add a message to a ticket
#[utoipa::path(
    post,
    path = "/api/v1/support/tickets/:id/messages",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    request_body = PostMessageInput,
    responses(
        (status = 201, description = "Message added", body = crate::ApiResponse<MessageView>),
        (status = 404, description = "Ticket not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Ticket is closed", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Support"
)]
pub async fn post_message(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PostMessageInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let message = state
        .services
        .support
        .post_message(user.user_id, id, payload.body)
        .await?;
    Ok(created_response(message))
}

/// Live feed of new messages on a ticket, as server-sent events
#[utoipa::path(
    get,
    path = "/api/v1/support/tickets/:id/stream",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "SSE stream of ticket messages"),
        (status = 404, description = "Ticket not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Support"
)]
pub async fn stream_ticket(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ServiceError> {
    let rx = state.services.support.subscribe(user.user_id, id).await?;

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(message) => {
                    // A message that cannot serialize is dropped, not fatal.
                    let Ok(event) = SseEvent::default().event("message").json_data(&message)
                    else {
                        continue;
                    };
                    return Some((Ok::<_, Infallible>(event), rx));
                }
                // Fallen behind the channel; skip ahead to live messages.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                // Ticket closed; end the stream.
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Close a ticket
#[utoipa::path(
    post,
    path = "/api/v1/support/tickets/:id/close",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Ticket closed", body = crate::ApiResponse<TicketView>),
        (status = 404, description = "Ticket not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Support"
)]
pub async fn close_ticket(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<TicketView> {
    let ticket = state.services.support.close_ticket(user.user_id, id).await?;
    Ok(Json(ApiResponse::success(ticket)))
}
