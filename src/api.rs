//! JSON HTTP routes over the read cache, follow registry and history fetcher.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::cache::ReadCache;
use crate::config::parse_bool;
use crate::follow::FollowRegistry;
use crate::history::{HistoryFetcher, HistorySeries};
use crate::lookup::{resolve_asset, ServiceError};
use crate::models::{AssetRef, Cryptocurrency, UserId};
use crate::provider::{HistoryDays, MarketDataProvider};
use crate::store::{CryptoRepository, StoreError};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const NOT_FOUND_MESSAGE: &str = "Cryptocurrency not found";
pub const FOLLOWED_MESSAGE: &str = "Successfully followed cryptocurrency";
pub const UNFOLLOWED_MESSAGE: &str = "Successfully unfollowed cryptocurrency";
pub const HISTORY_FAILED_MESSAGE: &str = "Failed to fetch price history";

#[derive(Clone)]
pub struct AppState {
    pub read_cache: Arc<ReadCache>,
    pub repo: Arc<dyn CryptoRepository>,
    pub follows: Arc<FollowRegistry>,
    pub history: Arc<HistoryFetcher>,
    pub provider: Arc<dyn MarketDataProvider>,
}

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/cryptocurrencies", get(get_market_list))
        .route("/api/cryptocurrencies/trending", get(get_trending))
        .route("/api/cryptocurrencies/{id}", get(get_cryptocurrency))
        .route("/api/cryptocurrencies/{id}/history", get(get_history))
        .route(
            "/api/cryptocurrencies/{id}/follow",
            axum::routing::post(follow).delete(unfollow),
        )
        .route("/api/user/cryptocurrencies", get(get_followed))
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    Unauthenticated,
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(_) => Self::NotFound,
            ServiceError::Store(err) => err.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        warn!(
            component = "http",
            event = "http.store.error",
            error = %err
        );
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound => (StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE.to_string()),
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthenticated".to_string()),
            Self::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

/// User handle forwarded by the fronting auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .map(|id| AuthUser(UserId(id)))
            .ok_or(ApiError::Unauthenticated)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MarketListQuery {
    pub force_refresh: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub days: Option<String>,
}

#[derive(Serialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Serialize)]
struct MessageBody {
    message: &'static str,
}

async fn get_market_list(
    State(state): State<AppState>,
    Query(query): Query<MarketListQuery>,
) -> Result<Response, ApiError> {
    let force_refresh = query
        .force_refresh
        .as_deref()
        .and_then(parse_bool)
        .unwrap_or(false);
    info!(
        component = "http",
        event = "http.market_list.request",
        force_refresh
    );

    let list = state.read_cache.get_market_list(force_refresh).await?;
    Ok(Json(DataEnvelope {
        data: list.as_slice(),
    })
    .into_response())
}

async fn get_cryptocurrency(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DataEnvelope<Cryptocurrency>>, ApiError> {
    let crypto = resolve_asset(state.repo.as_ref(), &AssetRef::new(id))?;
    Ok(Json(DataEnvelope { data: crypto }))
}

async fn get_trending(State(state): State<AppState>) -> Json<serde_json::Value> {
    let trending = state
        .provider
        .trending()
        .await
        .unwrap_or_else(|_| json!({ "coins": [] }));
    Json(trending)
}

async fn follow(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageBody>, ApiError> {
    state.follows.follow(user, &AssetRef::new(id))?;
    Ok(Json(MessageBody {
        message: FOLLOWED_MESSAGE,
    }))
}

async fn unfollow(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageBody>, ApiError> {
    state.follows.unfollow(user, &AssetRef::new(id))?;
    Ok(Json(MessageBody {
        message: UNFOLLOWED_MESSAGE,
    }))
}

async fn get_followed(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Response, ApiError> {
    let followed = state.follows.list_followed(user)?;
    Ok(Json(followed).into_response())
}

async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, ApiError> {
    let days = HistoryDays::parse(query.days.as_deref());
    match state.history.get_history(&AssetRef::new(id), days).await {
        Ok(response) => Ok(Json(response).into_response()),
        Err(ServiceError::NotFound(_)) => Err(ApiError::NotFound),
        Err(ServiceError::Store(err)) => {
            warn!(
                component = "http",
                event = "http.history.failed",
                error = %err
            );
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "data": HistorySeries::default(),
                    "message": HISTORY_FAILED_MESSAGE,
                    "error": err.to_string(),
                })),
            )
                .into_response())
        }
    }
}
