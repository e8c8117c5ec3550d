//! HTTP handlers for the REST API.
//!
//! Each handler corresponds to an API endpoint and delegates to the
//! aggregation service for business logic.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;

use super::dto::{
    AggregationQuery, AggregationResult, BatchRecord, CreateTargetRequest, DistributionConfig,
    HealthResponse, PopulationLoad, RefreshResponse, SelectionRequest, Target, TargetListResponse,
};
use super::error::AppError;
use super::state::AppState;
use crate::api::{TargetChange, TargetId};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

fn result_json(result: Arc<AggregationResult>) -> Json<AggregationResult> {
    Json(Arc::unwrap_or_clone(result))
}

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
///
/// Health check endpoint reporting the provider and loaded data sizes.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let service = &state.aggregation;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: "v1".to_string(),
        provider: service.routes().provider_name().to_string(),
        population: service.population().len(),
        targets: service.targets().len(),
    }))
}

// =============================================================================
// Population & Targets
// =============================================================================

/// POST /v1/population
///
/// Replace the population with a JSON array of records. Invalid records are
/// skipped and reported; a body that is not an array is rejected.
pub async fn load_population(
    State(state): State<AppState>,
    body: String,
) -> HandlerResult<PopulationLoad> {
    let load = state.aggregation.load_population_json(&body)?;
    Ok(Json(load))
}

/// GET /v1/targets
pub async fn list_targets(State(state): State<AppState>) -> HandlerResult<TargetListResponse> {
    let targets = state.aggregation.targets().list_targets();
    let total = targets.len();
    Ok(Json(TargetListResponse { targets, total }))
}

/// POST /v1/targets
pub async fn create_target(
    State(state): State<AppState>,
    Json(request): Json<CreateTargetRequest>,
) -> Result<(StatusCode, Json<Target>), AppError> {
    let target: Target = request.into();
    state.aggregation.targets().add_target(target.clone())?;
    state
        .aggregation
        .handle_target_change(TargetChange::Added(target.id))?;
    Ok((StatusCode::CREATED, Json(target)))
}

/// DELETE /v1/targets/{target_id}
///
/// A removed target also leaves the current selection.
pub async fn delete_target(
    State(state): State<AppState>,
    Path(target_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let id = TargetId::new(target_id);
    if !state.aggregation.targets().remove_target(id) {
        return Err(AppError::NotFound(format!("Target {} not found", id)));
    }
    // The background listener does the same; applying it here keeps the
    // response consistent with the next read.
    state
        .aggregation
        .handle_target_change(TargetChange::Removed(id))?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Aggregation
// =============================================================================

/// PUT /v1/selection
///
/// Change selected targets and/or routing mode. Returns the recomputed
/// (possibly incomplete) result.
pub async fn update_selection(
    State(state): State<AppState>,
    Json(request): Json<SelectionRequest>,
) -> HandlerResult<AggregationResult> {
    let service = &state.aggregation;
    let mut result = match (request.target_ids, request.category) {
        (Some(_), Some(_)) => {
            return Err(AppError::BadRequest(
                "target_ids and category are mutually exclusive".to_string(),
            ))
        }
        (Some(ids), None) => Some(service.select_targets(ids)?),
        (None, Some(category)) => Some(service.select_category(&category)?),
        (None, None) => None,
    };
    if let Some(mode) = request.mode {
        if mode != service.mode() {
            result = Some(service.set_mode(mode)?);
        }
    }
    Ok(result_json(result.unwrap_or_else(|| service.current())))
}

/// PUT /v1/distribution
///
/// Replace the bucketing configuration. An invalid configuration is rejected
/// with 400 and the previous one stays active.
pub async fn update_distribution(
    State(state): State<AppState>,
    Json(config): Json<DistributionConfig>,
) -> HandlerResult<AggregationResult> {
    let result = state.aggregation.set_distribution_config(config)?;
    Ok(result_json(result))
}

/// POST /v1/aggregation/refresh
///
/// Start routing population × selection in the background. Track progress at
/// `/v1/batches/{generation}` or via `/v1/aggregation/stream`.
pub async fn refresh_aggregation(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<RefreshResponse>), AppError> {
    let service = Arc::clone(&state.aggregation);
    let generation = service.routes().generation();

    tokio::spawn(async move {
        if let Err(e) = service.refresh().await {
            log::error!("Refresh of generation {} failed: {}", generation, e);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(RefreshResponse {
            generation,
            message: format!(
                "Refresh started. Track progress at /v1/batches/{}",
                generation
            ),
        }),
    ))
}

/// GET /v1/aggregation
pub async fn get_aggregation(
    State(state): State<AppState>,
    Query(query): Query<AggregationQuery>,
) -> HandlerResult<AggregationResult> {
    let mut result = Arc::unwrap_or_clone(state.aggregation.current());
    if !query.include_points {
        result.point_costs.clear();
    }
    Ok(Json(result))
}

/// GET /v1/aggregation/stream
///
/// Stream every published result via Server-Sent Events (SSE), starting with
/// the current one. Per-point costs are left out to keep events small.
pub async fn stream_aggregation(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut updates = state.aggregation.subscribe();

    let stream = async_stream::stream! {
        let current = Arc::clone(&updates.borrow_and_update());
        yield Ok(aggregation_event(&current));

        while updates.changed().await.is_ok() {
            let next = Arc::clone(&updates.borrow_and_update());
            yield Ok(aggregation_event(&next));
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn aggregation_event(result: &AggregationResult) -> Event {
    let summary = serde_json::json!({
        "generation": result.generation,
        "complete": result.complete,
        "pending_pairs": result.pending_pairs,
        "mode": result.mode,
        "target_selection": result.target_selection,
        "buckets": result.buckets,
        "unreachable_weight": result.unreachable_weight,
        "total_weight": result.total_weight,
        "stats": result.stats,
    });
    Event::default()
        .event("aggregation")
        .data(serde_json::to_string(&summary).unwrap_or_default())
}

// =============================================================================
// Batches
// =============================================================================

/// GET /v1/batches/{generation}
pub async fn get_batch(
    State(state): State<AppState>,
    Path(generation): Path<u64>,
) -> HandlerResult<BatchRecord> {
    state
        .aggregation
        .routes()
        .tracker()
        .get(generation)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No batch for generation {}", generation)))
}
