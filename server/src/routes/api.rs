use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::config::DESCRIPTOR_CACHE_CONTROL;
use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let observability = state.observability.snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "tiles": state.descriptor.tile_count,
        "observability": {
            "descriptor_requests_total": observability.descriptor_requests_total,
            "descriptor_not_modified_total": observability.descriptor_not_modified_total,
        }
    }))
}

/// Serve the pre-serialized map descriptor, honouring `If-None-Match`.
pub async fn get_map_descriptor(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    state.observability.record_descriptor_request();
    let etag = state.descriptor.etag.as_ref();

    if if_none_match_matches(&headers, etag) {
        state.observability.record_descriptor_not_modified();
        return not_modified_response(DESCRIPTOR_CACHE_CONTROL, Some(etag));
    }

    let json: Arc<Bytes> = Arc::clone(&state.descriptor.json);
    json_bytes_response((*json).clone(), DESCRIPTOR_CACHE_CONTROL, Some(etag))
}

fn json_bytes_response(body: Bytes, cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn not_modified_response(cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn normalize_etag(candidate: &str) -> &str {
    candidate.strip_prefix("W/").unwrap_or(candidate).trim()
}

fn if_none_match_matches(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(header::IF_NONE_MATCH) else {
        return false;
    };
    let Ok(raw) = value.to_str() else {
        return false;
    };

    raw.split(',').any(|candidate| {
        let candidate = candidate.trim();
        candidate == "*" || normalize_etag(candidate) == normalize_etag(etag)
    })
}
