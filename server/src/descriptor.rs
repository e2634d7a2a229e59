//! Builds the map descriptor from the asset directory: which region images
//! exist on each plane, plus the icon and label overlays.

use std::io;
use std::path::{Path, PathBuf};

use groupiron_shared::{MapDescriptor, RegionCoord, TILE_IMAGE_EXT};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::config::{ICONS_FILE, LABELS_FILE, MAP_SUBDIR};

#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> DescriptorError + '_ {
    move |source| DescriptorError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub fn build_descriptor(asset_dir: &Path) -> Result<MapDescriptor, DescriptorError> {
    let mut descriptor = MapDescriptor::default();

    let map_dir = asset_dir.join(MAP_SUBDIR);
    let mut skipped = 0usize;
    for entry in std::fs::read_dir(&map_dir).map_err(io_error(&map_dir))? {
        let path = entry.map_err(io_error(&map_dir))?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(TILE_IMAGE_EXT) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        match RegionCoord::parse_file_stem(stem) {
            Ok(region) => {
                if !descriptor.insert_tile(region) {
                    skipped += 1;
                    warn!(file = %path.display(), "skipping region outside the indexable range");
                }
            }
            Err(e) => {
                skipped += 1;
                warn!(file = %path.display(), error = %e, "skipping unrecognised map image");
            }
        }
    }

    descriptor.icons = read_overlay(&asset_dir.join(ICONS_FILE))?;
    descriptor.labels = read_overlay(&asset_dir.join(LABELS_FILE))?;

    tracing::info!(
        tiles = descriptor.tile_count(),
        skipped,
        "map descriptor built"
    );
    Ok(descriptor)
}

/// A missing overlay file means no overlay; anything else unreadable is an error.
fn read_overlay<T: DeserializeOwned + Default>(path: &Path) -> Result<T, DescriptorError> {
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(file = %path.display(), "overlay file missing; continuing without it");
            return Ok(T::default());
        }
        Err(e) => return Err(io_error(path)(e)),
    };
    serde_json::from_slice(&raw).map_err(|source| DescriptorError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_descriptor(json: &[u8], out: &Path) -> Result<(), DescriptorError> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    std::fs::write(out, json).map_err(io_error(out))
}
