//! Discovery of served resource types.

use axum::{extract::State, routing::get, Json, Router};
use sortie_client::meta::ApiResourceList;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/apis", get(list_resources))
}

/// GET /apis
async fn list_resources(State(state): State<AppState>) -> Json<ApiResourceList> {
    Json(ApiResourceList {
        resources: state.store().served_resources().await,
    })
}
