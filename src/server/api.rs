use crate::agent::{ Assistant, TurnError };
use crate::history::{ HistoryError, HistoryStore };
use crate::models::chat::{ ChatMessage, ChatSummary, SearchResult };
use crate::models::stream::{ StreamEvent, TurnRequest };
use crate::search::search_chats;
use axum::{
    extract::{ Path, Query, State },
    http::StatusCode,
    response::{ sse::{ Event, KeepAlive, Sse }, IntoResponse, Response },
    routing::{ delete, get },
    Json,
    Router,
};
use futures::StreamExt;
use governor::{ DefaultDirectRateLimiter, Quota, RateLimiter };
use log::{ error, info, warn };
use serde::{ Deserialize, Serialize };
use serde_json::json;
use std::num::NonZeroU32;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{ Any, CorsLayer };

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Too many requests, please retry shortly")]
    RateLimited,
    #[error("{0}")]
    Internal(String),
}

impl From<HistoryError> for ApiError {
    fn from(e: HistoryError) -> Self {
        match e {
            HistoryError::NotFound(_) => ApiError::NotFound("Chat not found".into()),
            other => {
                error!("History store error: {}", other);
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<TurnError> for ApiError {
    fn from(e: TurnError) -> Self {
        error!("Turn could not start: {}", e);
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    assistant: Arc<Assistant>,
    store: Arc<dyn HistoryStore>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl AppState {
    /// A `turn_rate_limit` of zero disables rate limiting.
    pub fn new(assistant: Arc<Assistant>, turn_rate_limit: u32) -> Self {
        let limiter = NonZeroU32::new(turn_rate_limit).map(|per_second|
            Arc::new(RateLimiter::direct(Quota::per_second(per_second)))
        );
        if limiter.is_none() {
            warn!("Turn rate limiting is disabled");
        }
        Self {
            store: assistant.history_store(),
            assistant,
            limiter,
        }
    }
}

#[derive(Deserialize)]
pub struct ChatQuery {
    #[serde(rename = "chatId")]
    pub chat_id: Option<String>,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Serialize)]
struct MessagesResponse {
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    page: i64,
    limit: i64,
    total: i64,
    has_more: bool,
}

#[derive(Serialize)]
struct ChatsResponse {
    chats: Vec<ChatSummary>,
    pagination: Pagination,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/chat", get(get_chat_handler).post(chat_handler))
        .route("/api/chats", get(list_chats_handler))
        .route("/api/chats/{id}", delete(delete_chat_handler))
        .route("/api/search", get(search_handler))
        .layer(cors)
        .with_state(state)
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<TurnRequest>
) -> Result<Response, ApiError> {
    if let Some(limiter) = &state.limiter {
        if limiter.check().is_err() {
            warn!("Turn rejected by rate limiter");
            return Err(ApiError::RateLimited);
        }
    }

    let chat_id = state.assistant.resolve_chat(req.chat_id).await?;
    let (tx, rx) = mpsc::channel::<StreamEvent>(EVENT_BUFFER);
    let assistant = Arc::clone(&state.assistant);

    tokio::spawn(async move {
        match assistant.run_turn(chat_id.clone(), req.messages, &tx).await {
            Ok(outcome) =>
                info!(
                    "Turn for chat {} finished after {} step(s) ({})",
                    chat_id,
                    outcome.steps,
                    outcome.finish_reason
                ),
            Err(e) => error!("Turn for chat {} failed: {}", chat_id, e),
        }
    });

    let events = ReceiverStream::new(rx).map(|event| Event::default().json_data(event));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()).into_response())
}

async fn get_chat_handler(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>
) -> Result<Json<MessagesResponse>, ApiError> {
    let chat_id = query.chat_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Chat ID is required".into()))?;
    let messages = state.store.load_chat(&chat_id).await?;
    Ok(Json(MessagesResponse { messages }))
}

async fn list_chats_handler(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>
) -> Result<Json<ChatsResponse>, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1).saturating_mul(limit);

    let result = state.store.list_chats(limit, offset).await?;
    Ok(
        Json(ChatsResponse {
            pagination: Pagination {
                page,
                limit,
                total: result.total,
                has_more: offset.saturating_add(limit) < result.total,
            },
            chats: result.chats,
        })
    )
}

async fn delete_chat_handler(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<StatusCode, ApiError> {
    if state.store.delete_chat(&id).await? {
        info!("Deleted chat {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Chat not found".into()))
    }
}

async fn search_handler(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>
) -> Result<Json<SearchResponse>, ApiError> {
    let q = query.q.unwrap_or_default();
    let results = search_chats(state.store.as_ref(), &q).await?;
    Ok(Json(SearchResponse { results }))
}
