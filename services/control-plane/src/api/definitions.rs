//! Resource definition endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use sortie_client::{CustomResourceDefinition, ObjectList};

use crate::api::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/definitions", get(list_definitions).post(create_definition))
        .route(
            "/definitions/{name}",
            get(get_definition).delete(delete_definition),
        )
}

/// POST /definitions
async fn create_definition(
    State(state): State<AppState>,
    Json(crd): Json<CustomResourceDefinition>,
) -> ApiResult<impl IntoResponse> {
    let crd = state.store().install_definition(crd).await?;
    Ok((StatusCode::CREATED, Json(crd)))
}

/// GET /definitions
async fn list_definitions(State(state): State<AppState>) -> impl IntoResponse {
    Json(ObjectList {
        api_version: None,
        kind: Some("CustomResourceDefinitionList".to_string()),
        items: state.store().list_definitions().await,
    })
}

/// GET /definitions/{name}
async fn get_definition(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<CustomResourceDefinition>> {
    Ok(Json(state.store().get_definition(&name).await?))
}

/// DELETE /definitions/{name}
async fn delete_definition(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.store().delete_definition(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
