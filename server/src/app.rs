use std::path::Path;

use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, header},
    middleware::{self, Next},
    response::Response,
};
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;

use crate::config::{IMMUTABLE_CACHE_CONTROL, MAP_ASSET_CACHE_CONTROL, MAP_SUBDIR};
use crate::routes;
use crate::state::AppState;

pub(crate) fn build_app(state: AppState, asset_dir: &Path, dist_dir: &Path) -> Router {
    let client_bundle = ServeDir::new(dist_dir)
        .precompressed_br()
        .precompressed_gzip();

    let api = Router::new()
        .route(
            "/data/map.json",
            axum::routing::get(routes::api::get_map_descriptor),
        )
        .route("/api/health", axum::routing::get(routes::api::health))
        .layer(CompressionLayer::new());

    api.nest_service("/map", ServeDir::new(asset_dir.join(MAP_SUBDIR)))
        .fallback_service(client_bundle)
        .layer(middleware::from_fn(set_static_cache_control))
        .with_state(state)
}

async fn set_static_cache_control(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    let mut response = next.run(request).await;

    if response.status().is_success()
        && let Some(cache_control) = cache_control_for_path(&path)
    {
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(cache_control),
        );
    }

    response
}

fn cache_control_for_path(path: &str) -> Option<&'static str> {
    if is_hashed_bundle_asset(path) {
        return Some(IMMUTABLE_CACHE_CONTROL);
    }

    if path.starts_with("/map/") || path.starts_with("/fonts/") {
        return Some(MAP_ASSET_CACHE_CONTROL);
    }

    None
}

fn is_hashed_bundle_asset(path: &str) -> bool {
    let Some(ext) = Path::new(path).extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    if !matches!(ext, "wasm" | "js" | "css") {
        return false;
    }

    let Some(filename) = Path::new(path).file_name().and_then(|name| name.to_str()) else {
        return false;
    };

    filename
        .split(['-', '_', '.'])
        .any(|segment| segment.len() >= 8 && segment.chars().all(|c| c.is_ascii_hexdigit()))
}
