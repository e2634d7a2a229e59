use gloo_storage::{LocalStorage, Storage};
use groupiron_shared::PLANE_COUNT;
use serde::{Deserialize, Serialize};

use crate::config::{INITIAL_CENTER, INITIAL_ZOOM, PREFS_STORAGE_KEY};

/// Where the map was last left, restored on the next visit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapPrefs {
    pub plane: u8,
    pub center_x: f64,
    pub center_y: f64,
    pub zoom: f64,
}

impl Default for MapPrefs {
    fn default() -> Self {
        Self {
            plane: 0,
            center_x: INITIAL_CENTER.0,
            center_y: INITIAL_CENTER.1,
            zoom: INITIAL_ZOOM,
        }
    }
}

impl MapPrefs {
    /// Replace anything unusable with the defaults.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            plane: if (self.plane as usize) < PLANE_COUNT {
                self.plane
            } else {
                defaults.plane
            },
            center_x: finite_or(self.center_x, defaults.center_x),
            center_y: finite_or(self.center_y, defaults.center_y),
            zoom: finite_or(self.zoom, defaults.zoom),
        }
    }

    pub fn load() -> Self {
        LocalStorage::get::<MapPrefs>(PREFS_STORAGE_KEY)
            .map(MapPrefs::sanitized)
            .unwrap_or_default()
    }

    pub fn save(&self) {
        if let Err(err) = LocalStorage::set(PREFS_STORAGE_KEY, self) {
            tracing::debug!(%err, "could not persist map position");
        }
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}
