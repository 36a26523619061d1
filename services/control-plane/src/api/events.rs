//! Change-log endpoint used by reconciliation managers to poll for changes.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use sortie_client::EventList;

use crate::api::error::ApiResult;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 500;
const MAX_LIMIT: usize = 5_000;

pub fn routes() -> Router<AppState> {
    Router::new().route("/events", get(list_events))
}

/// Query parameters for reading the change log.
#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    /// Return events with `seq > after`.
    pub after: Option<u64>,
    /// Max number of events to return.
    pub limit: Option<usize>,
}

/// GET /events
async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<ListEventsQuery>,
) -> ApiResult<Json<EventList>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let events = state
        .store()
        .events(query.after.unwrap_or(0), limit)
        .await?;
    Ok(Json(events))
}
