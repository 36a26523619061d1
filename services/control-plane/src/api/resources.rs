//! Object endpoints for built-in and defined resource types.
//!
//! Paths follow `/apis/{group}/{version}/{plural}`; the empty core group is
//! addressed as `core`. Namespaced types take `?namespace=`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use sortie_client::ObjectList;

use crate::api::error::ApiResult;
use crate::state::AppState;
use crate::store::TypePath;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/apis/{group}/{version}/{plural}",
            get(list_objects).post(create_object),
        )
        .route(
            "/apis/{group}/{version}/{plural}/{name}",
            get(get_object).put(update_object).delete(delete_object),
        )
        .route(
            "/apis/{group}/{version}/{plural}/{name}/status",
            put(update_status),
        )
}

#[derive(Debug, Deserialize)]
pub struct NamespaceQuery {
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ItemPath {
    pub group: String,
    pub version: String,
    pub plural: String,
    pub name: String,
}

impl ItemPath {
    fn type_path(&self) -> TypePath {
        TypePath::new(&self.group, &self.version, &self.plural)
    }
}

/// POST /apis/{group}/{version}/{plural}
async fn create_object(
    State(state): State<AppState>,
    Path(path): Path<TypePath>,
    Query(query): Query<NamespaceQuery>,
    Json(object): Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let created = state
        .store()
        .create(&path, query.namespace.as_deref(), object)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /apis/{group}/{version}/{plural}
async fn list_objects(
    State(state): State<AppState>,
    Path(path): Path<TypePath>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult<Json<ObjectList<Value>>> {
    let items = state
        .store()
        .list(&path, query.namespace.as_deref())
        .await?;
    Ok(Json(ObjectList {
        api_version: None,
        kind: None,
        items,
    }))
}

/// GET /apis/{group}/{version}/{plural}/{name}
async fn get_object(
    State(state): State<AppState>,
    Path(path): Path<ItemPath>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult<Json<Value>> {
    let object = state
        .store()
        .get(&path.type_path(), query.namespace.as_deref(), &path.name)
        .await?;
    Ok(Json(object))
}

/// PUT /apis/{group}/{version}/{plural}/{name}
async fn update_object(
    State(state): State<AppState>,
    Path(path): Path<ItemPath>,
    Query(query): Query<NamespaceQuery>,
    Json(object): Json<Value>,
) -> ApiResult<Json<Value>> {
    let updated = state
        .store()
        .update(&path.type_path(), query.namespace.as_deref(), &path.name, object)
        .await?;
    Ok(Json(updated))
}

/// PUT /apis/{group}/{version}/{plural}/{name}/status
async fn update_status(
    State(state): State<AppState>,
    Path(path): Path<ItemPath>,
    Query(query): Query<NamespaceQuery>,
    Json(object): Json<Value>,
) -> ApiResult<Json<Value>> {
    let updated = state
        .store()
        .update_status(&path.type_path(), query.namespace.as_deref(), &path.name, object)
        .await?;
    Ok(Json(updated))
}

/// DELETE /apis/{group}/{version}/{plural}/{name}
async fn delete_object(
    State(state): State<AppState>,
    Path(path): Path<ItemPath>,
    Query(query): Query<NamespaceQuery>,
) -> ApiResult<StatusCode> {
    state
        .store()
        .delete(&path.type_path(), query.namespace.as_deref(), &path.name)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
