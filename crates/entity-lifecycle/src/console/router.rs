use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::repository::{EntityRepository, NotificationPublisher, RepositoryError};
use super::service::{ConsoleService, ConsoleServiceError};
use crate::lifecycle::{EntityId, Status, TransitionError, TransitionRequest};
use crate::segments::FieldComparisonSpec;

/// Router builder exposing the engine over JSON.
pub fn console_router<R, N>(service: Arc<ConsoleService<R, N>>) -> Router
where
    R: EntityRepository + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route("/api/v1/entities/:entity_id", get(status_handler::<R, N>))
        .route(
            "/api/v1/entities/:entity_id/transitions",
            post(transition_handler::<R, N>),
        )
        .route(
            "/api/v1/segments/evaluate",
            post(segment_handler::<R, N>),
        )
        .route("/api/v1/segments/summary", get(summary_handler::<R, N>))
        .route(
            "/api/v1/tiers/suggestions",
            get(tier_suggestions_handler::<R, N>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionBody {
    pub(crate) from: Status,
    pub(crate) to: Status,
    pub(crate) reason: String,
    pub(crate) actor: String,
    #[serde(default)]
    pub(crate) extra: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SegmentQuery {
    #[serde(default)]
    pub(crate) predicate: Vec<FieldComparisonSpec>,
    #[serde(default)]
    pub(crate) as_of: Option<DateTime<Utc>>,
}

pub(crate) async fn status_handler<R, N>(
    State(service): State<Arc<ConsoleService<R, N>>>,
    Path(entity_id): Path<String>,
) -> Response
where
    R: EntityRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.status_view(&EntityId(entity_id), Utc::now()) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn transition_handler<R, N>(
    State(service): State<Arc<ConsoleService<R, N>>>,
    Path(entity_id): Path<String>,
    Json(body): Json<TransitionBody>,
) -> Response
where
    R: EntityRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let request = TransitionRequest {
        entity_id: EntityId(entity_id),
        from: body.from,
        to: body.to,
        reason: body.reason,
        actor: body.actor,
        extra: body.extra,
    };

    match service.transition(request) {
        Ok(entity) => (StatusCode::OK, Json(entity)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn segment_handler<R, N>(
    State(service): State<Arc<ConsoleService<R, N>>>,
    Json(query): Json<SegmentQuery>,
) -> Response
where
    R: EntityRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let as_of = query.as_of.unwrap_or_else(Utc::now);
    match service.evaluate_segment(&query.predicate, as_of) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn summary_handler<R, N>(
    State(service): State<Arc<ConsoleService<R, N>>>,
) -> Response
where
    R: EntityRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.dashboard(Utc::now()) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn tier_suggestions_handler<R, N>(
    State(service): State<Arc<ConsoleService<R, N>>>,
) -> Response
where
    R: EntityRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.tier_suggestions(Utc::now()) {
        Ok(suggestions) => (StatusCode::OK, Json(suggestions)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) fn error_response(error: ConsoleServiceError) -> Response {
    let status = match &error {
        ConsoleServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        ConsoleServiceError::Repository(RepositoryError::Conflict)
        | ConsoleServiceError::Transition(TransitionError::StaleStatus { .. }) => {
            StatusCode::CONFLICT
        }
        ConsoleServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ConsoleServiceError::Transition(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ConsoleServiceError::Predicate(_) => StatusCode::BAD_REQUEST,
    };

    let payload = json!({ "error": error.to_string() });
    (status, Json(payload)).into_response()
}
