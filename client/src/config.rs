//! Compile-time settings for the map view.

/// Served by the asset server; built from the tile directory at startup.
pub const DESCRIPTOR_URL: &str = "/data/map.json";
/// Region images, `{plane}_{x}_{y}.webp`.
pub const TILE_URL_PREFIX: &str = "/map";
pub const ICON_ATLAS_URL: &str = "/map/icons/map_icons.webp";
/// Area label images, `{labelId}.webp`.
pub const LABEL_URL_PREFIX: &str = "/map/labels";

pub const INITIAL_CENTER: (f64, f64) = (3103.0, 3095.0);
pub const INITIAL_ZOOM: f64 = 1.0;
pub const MIN_ZOOM: f64 = 1.0;
pub const MAX_ZOOM: f64 = 6.0;

/// Fade-in applied to a tile once its image arrives.
pub const TILE_FADE_MS: f64 = 300.0;
/// Retarget duration used while following a player.
pub const FOLLOW_RETARGET_MS: f64 = 100.0;
pub const WHEEL_ZOOM_MS: f64 = 100.0;
/// Wheel zoom step as a fraction of the current zoom target.
pub const WHEEL_ZOOM_FRACTION: f64 = 0.2;

/// Remaining scaled pixels per ms of animation above which new tile loads
/// are held back.
pub const FAST_PAN_THRESHOLD: f64 = 10.0;

pub const VELOCITY_SAMPLES: usize = 10;
/// A release this long after the last move does not fling.
pub const STALE_FLING_MS: f64 = 100.0;
/// Per-ms exponential decay rate of momentum.
pub const MOMENTUM_DECAY: f64 = 0.005;
/// Momentum stops once squared speed (px/ms) drops below this.
pub const MOMENTUM_STOP_SPEED_SQ: f64 = 0.001;
/// Pointer travel under which a press-release counts as a click.
pub const CLICK_SLOP_PX: f64 = 5.0;

/// Icon sprites are square cells of this size in the atlas.
pub const ICON_SPRITE_PX: f64 = 15.0;
pub const ICON_MAX_SCALE: f64 = 3.0;
pub const LABEL_MAX_SCALE: f64 = 2.0;

/// The frame clock never banks more than this many pending frames.
pub const MAX_PENDING_FRAMES: u32 = 2;

/// `localStorage` key for the last camera position and plane.
pub const PREFS_STORAGE_KEY: &str = "groupiron.map.prefs";
