//! # Record Handlers
//!
//! Entity CRUD over the domain collections, served by whichever adapter is
//! active when the request arrives.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde_json::Value;

use crate::error::ApiError;
use crate::providers::{Collection, Fields, Record, RecordFilter, RecordId};
use crate::server::AppState;

/// Largest page a single list request may ask for.
pub const MAX_PAGE_SIZE: usize = 1000;

fn parse_collection(raw: &str) -> Result<Collection, ApiError> {
    raw.parse::<Collection>()
        .map_err(|_| ApiError::not_found(&format!("unknown collection '{raw}'")))
}

fn parse_usize(name: &str, raw: &str) -> Result<usize, ApiError> {
    raw.parse::<usize>()
        .map_err(|_| ApiError::validation(&format!("{name} must be a non-negative integer")))
}

/// Builds a filter from query parameters. Values that parse as JSON scalars
/// compare as such (`?user_id=3` matches the number 3); anything else is a string.
pub fn filter_from_query(params: HashMap<String, String>) -> Result<RecordFilter, ApiError> {
    let mut filter = RecordFilter::all();

    for (key, raw) in params {
        match key.as_str() {
            "limit" => {
                let limit = parse_usize("limit", &raw)?;
                if !(1..=MAX_PAGE_SIZE).contains(&limit) {
                    return Err(ApiError::validation(&format!(
                        "limit must be between 1 and {MAX_PAGE_SIZE}"
                    )));
                }
                filter.limit = Some(limit);
            }
            "offset" => filter.offset = parse_usize("offset", &raw)?,
            _ => {
                let value = match serde_json::from_str::<Value>(&raw) {
                    Ok(parsed) if !parsed.is_object() && !parsed.is_array() => parsed,
                    _ => Value::String(raw),
                };
                filter.equals.insert(key, value);
            }
        }
    }

    Ok(filter)
}

fn into_fields(body: Value) -> Result<Fields, ApiError> {
    match body {
        Value::Object(fields) => Ok(fields),
        _ => Err(ApiError::validation("request body must be a JSON object")),
    }
}

#[utoipa::path(
    get,
    path = "/api/records/{collection}",
    params(
        ("collection" = Collection, Path, description = "Domain collection"),
        ("limit" = Option<usize>, Query, description = "Page size"),
        ("offset" = Option<usize>, Query, description = "Records to skip"),
    ),
    responses(
        (status = 200, description = "Matching records ordered by id", body = [Value]),
        (status = 400, description = "Invalid paging parameters", body = ApiError),
        (status = 503, description = "Active provider unreachable", body = ApiError)
    ),
    tag = "records"
)]
pub async fn list_records(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Record>>, ApiError> {
    let collection = parse_collection(&collection)?;
    let filter = filter_from_query(params)?;
    let records = state.active.current().list(collection, &filter).await?;
    Ok(Json(records))
}

#[utoipa::path(
    post,
    path = "/api/records/{collection}",
    params(("collection" = Collection, Path, description = "Domain collection")),
    request_body = Value,
    responses(
        (status = 201, description = "Record created with a provider-assigned id", body = Value),
        (status = 409, description = "Unique field already taken", body = ApiError)
    ),
    tag = "records"
)]
pub async fn create_record(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Record>), ApiError> {
    let collection = parse_collection(&collection)?;
    let Json(body) = payload?;
    let record = state
        .active
        .current()
        .insert(collection, into_fields(body)?)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[utoipa::path(
    get,
    path = "/api/records/{collection}/{id}",
    params(
        ("collection" = Collection, Path, description = "Domain collection"),
        ("id" = String, Path, description = "Record id"),
    ),
    responses(
        (status = 200, description = "Record", body = Value),
        (status = 404, description = "Unknown record", body = ApiError)
    ),
    tag = "records"
)]
pub async fn get_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Record>, ApiError> {
    let collection = parse_collection(&collection)?;
    let record = state
        .active
        .current()
        .get(collection, &RecordId::parse(&id))
        .await?;
    Ok(Json(record))
}

#[utoipa::path(
    patch,
    path = "/api/records/{collection}/{id}",
    params(
        ("collection" = Collection, Path, description = "Domain collection"),
        ("id" = String, Path, description = "Record id"),
    ),
    request_body = Value,
    responses(
        (status = 200, description = "Record after the shallow merge", body = Value),
        (status = 404, description = "Unknown record", body = ApiError)
    ),
    tag = "records"
)]
pub async fn update_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Record>, ApiError> {
    let collection = parse_collection(&collection)?;
    let Json(body) = payload?;
    let record = state
        .active
        .current()
        .update(collection, &RecordId::parse(&id), into_fields(body)?)
        .await?;
    Ok(Json(record))
}

#[utoipa::path(
    delete,
    path = "/api/records/{collection}/{id}",
    params(
        ("collection" = Collection, Path, description = "Domain collection"),
        ("id" = String, Path, description = "Record id"),
    ),
    responses(
        (status = 204, description = "Record deleted"),
        (status = 404, description = "Unknown record", body = ApiError)
    ),
    tag = "records"
)]
pub async fn delete_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let collection = parse_collection(&collection)?;
    state
        .active
        .current()
        .delete(collection, &RecordId::parse(&id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
