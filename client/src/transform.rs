//! Conversions between the three coordinate spaces of the map.
//!
//! * **world**: game tile coordinates, y grows north.
//! * **canvas**: unscaled pixels of the tile sheet, y grows down. World
//!   `(0, 0)` is the bottom-left of region `(0, 0)`, whose image occupies
//!   canvas `[0, 256) x [0, 256)`.
//! * **client**: on-screen pixels of the map element. A canvas pixel `c`
//!   lands at `c * zoom - (camera.x, camera.y)`.

use groupiron_shared::{PIXELS_PER_GAME_TILE, TILE_SIZE_PX};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapMetrics {
    pub tile_size: f64,
    pub pixels_per_tile: f64,
}

impl Default for MapMetrics {
    fn default() -> Self {
        Self {
            tile_size: TILE_SIZE_PX as f64,
            pixels_per_tile: PIXELS_PER_GAME_TILE as f64,
        }
    }
}

/// Snapshot of the camera used by one frame or one input event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
    pub width: f64,
    pub height: f64,
}

/// Visible area in world-tile units. `top > bottom` since y grows north.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRect {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

/// The 2D context matrix `(a, b, c, d, e, f)` for a camera: uniform scale
/// plus a translation snapped to whole pixels.
pub fn canvas_transform(cam: &CameraState) -> [f64; 6] {
    [cam.zoom, 0.0, 0.0, cam.zoom, (-cam.x).round(), (-cam.y).round()]
}

impl MapMetrics {
    /// Game tiles along one region edge.
    pub fn region_tiles(&self) -> f64 {
        self.tile_size / self.pixels_per_tile
    }

    pub fn world_to_canvas(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.pixels_per_tile,
            self.tile_size - y * self.pixels_per_tile,
        )
    }

    pub fn canvas_to_world(&self, px: f64, py: f64) -> (f64, f64) {
        (
            px / self.pixels_per_tile,
            (self.tile_size - py) / self.pixels_per_tile,
        )
    }

    /// The world tile containing a canvas pixel.
    pub fn world_tile_at_canvas(&self, px: f64, py: f64) -> (i32, i32) {
        let (x, y) = self.canvas_to_world(px, py);
        (x.floor() as i32, y.floor() as i32)
    }

    /// Top-left canvas corner of a region image.
    pub fn region_origin(&self, rx: i32, ry: i32) -> (f64, f64) {
        (rx as f64 * self.tile_size, -(ry as f64) * self.tile_size)
    }

    /// Camera position that puts the middle of world tile `(x, y)` at the
    /// centre of a `width x height` screen.
    pub fn world_to_camera_center_offset(
        &self,
        x: f64,
        y: f64,
        zoom: f64,
        width: f64,
        height: f64,
    ) -> (f64, f64) {
        let (px, py) = self.world_to_canvas(x + 0.5, y + 0.5);
        (px * zoom - width / 2.0, py * zoom - height / 2.0)
    }

    pub fn canvas_to_client(&self, px: f64, py: f64, cam: &CameraState) -> (f64, f64) {
        (px * cam.zoom - cam.x, py * cam.zoom - cam.y)
    }

    pub fn client_to_canvas(&self, sx: f64, sy: f64, cam: &CameraState) -> (f64, f64) {
        ((sx + cam.x) / cam.zoom, (sy + cam.y) / cam.zoom)
    }

    pub fn world_to_client(&self, x: f64, y: f64, cam: &CameraState) -> (f64, f64) {
        let (px, py) = self.world_to_canvas(x, y);
        self.canvas_to_client(px, py, cam)
    }

    pub fn client_to_world(&self, sx: f64, sy: f64, cam: &CameraState) -> (f64, f64) {
        let (px, py) = self.client_to_canvas(sx, sy, cam);
        self.canvas_to_world(px, py)
    }

    pub fn view_rect(&self, cam: &CameraState) -> ViewRect {
        let (left, top) = self.client_to_world(0.0, 0.0, cam);
        let (right, bottom) = self.client_to_world(cam.width, cam.height, cam);
        ViewRect {
            left,
            right,
            top,
            bottom,
        }
    }

    /// Whether region `(rx, ry)`, grown by `padding` world tiles on every
    /// side, strictly overlaps the view.
    pub fn is_region_visible(&self, rx: i32, ry: i32, view: &ViewRect, padding: f64) -> bool {
        let size = self.region_tiles();
        let left = rx as f64 * size - padding;
        let right = (rx + 1) as f64 * size + padding;
        let bottom = ry as f64 * size - padding;
        let top = (ry + 1) as f64 * size + padding;
        left < view.right && right > view.left && bottom < view.top && top > view.bottom
    }

    /// Regions overlapping the view, column by column.
    pub fn visible_regions(
        &self,
        view: &ViewRect,
        padding: f64,
    ) -> impl Iterator<Item = (i32, i32)> + '_ {
        let size = self.region_tiles();
        let x0 = ((view.left - padding) / size).floor() as i32;
        let x1 = ((view.right + padding) / size).floor() as i32;
        let y0 = ((view.bottom - padding) / size).floor() as i32;
        let y1 = ((view.top + padding) / size).floor() as i32;
        let view = *view;
        (x0..=x1)
            .flat_map(move |rx| (y0..=y1).map(move |ry| (rx, ry)))
            .filter(move |&(rx, ry)| self.is_region_visible(rx, ry, &view, padding))
    }
}
