use std::path::PathBuf;

pub const DEFAULT_SERVER_PORT: u16 = 3000;
pub const DEFAULT_ASSET_DIR: &str = "public";
pub const DEFAULT_CLIENT_DIST_DIR: &str = "client/dist";

/// Tiles, icon atlas and label images live under `<asset dir>/map`.
pub const MAP_SUBDIR: &str = "map";
pub const ICONS_FILE: &str = "data/map_icons.json";
pub const LABELS_FILE: &str = "data/map_labels.json";

pub const DESCRIPTOR_CACHE_CONTROL: &str = "no-cache";
pub const MAP_ASSET_CACHE_CONTROL: &str = "public, max-age=86400";
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

pub fn server_port() -> u16 {
    std::env::var("SERVER_PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_SERVER_PORT)
}

pub fn asset_dir() -> PathBuf {
    non_empty_path("MAP_ASSET_DIR").unwrap_or_else(|| PathBuf::from(DEFAULT_ASSET_DIR))
}

pub fn client_dist_dir() -> PathBuf {
    non_empty_path("CLIENT_DIST_DIR").unwrap_or_else(|| PathBuf::from(DEFAULT_CLIENT_DIST_DIR))
}

/// Where to also write the built descriptor, if anywhere.
pub fn descriptor_out() -> Option<PathBuf> {
    non_empty_path("MAP_DESCRIPTOR_OUT")
}

fn non_empty_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
