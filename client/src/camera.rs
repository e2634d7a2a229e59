use crate::animation::Animation;
use crate::config::FAST_PAN_THRESHOLD;
use crate::transform::{CameraState, MapMetrics};

/// Animated pan/zoom camera.
///
/// `x`/`y` are the scaled canvas pixels at the top-left corner of the screen.
/// The zoom target is always clamped to `[min_zoom, max_zoom]`; pan is free.
#[derive(Debug, Clone)]
pub struct Camera {
    pub x: Animation<f64>,
    pub y: Animation<f64>,
    pub zoom: Animation<f64>,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub is_dragging: bool,
}

impl Camera {
    pub fn new(x: f64, y: f64, zoom: f64, min_zoom: f64, max_zoom: f64) -> Self {
        Self {
            x: Animation::at_rest(x),
            y: Animation::at_rest(y),
            zoom: Animation::at_rest(zoom.clamp(min_zoom, max_zoom)),
            min_zoom,
            max_zoom,
            is_dragging: false,
        }
    }

    /// Camera snapshot from the current (on-screen) values.
    pub fn state(&self, width: f64, height: f64) -> CameraState {
        CameraState {
            x: self.x.current,
            y: self.y.current,
            zoom: self.zoom.current,
            width,
            height,
        }
    }

    /// Camera snapshot from the values it is heading toward.
    pub fn target_state(&self, width: f64, height: f64) -> CameraState {
        CameraState {
            x: self.x.target,
            y: self.y.target,
            zoom: self.zoom.target,
            width,
            height,
        }
    }

    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    pub fn cancel_animation(&mut self) {
        self.x.cancel();
        self.y.cancel();
        self.zoom.cancel();
    }

    /// Move the pan target by a screen-space drag delta, with no easing.
    pub fn drag_by(&mut self, dx: f64, dy: f64) {
        self.x.go_to(self.x.target - dx, 0.0);
        self.y.go_to(self.y.target - dy, 0.0);
    }

    /// Animate the pan so the middle of world tile `(wx, wy)` is centred,
    /// at the zoom the camera is heading toward.
    pub fn center_on(
        &mut self,
        metrics: &MapMetrics,
        wx: f64,
        wy: f64,
        width: f64,
        height: f64,
        duration: f64,
    ) {
        let (x, y) =
            metrics.world_to_camera_center_offset(wx, wy, self.zoom.target, width, height);
        self.retarget(x, y, duration);
    }

    /// Retarget the pan only where it differs, so a steady target keeps
    /// its running animation.
    pub fn retarget(&mut self, x: f64, y: f64, duration: f64) {
        if self.x.target != x {
            self.x.go_to(x, duration);
        }
        if self.y.target != y {
            self.y.go_to(y, duration);
        }
    }

    /// Zoom to `zoom` keeping the canvas point under screen `(sx, sy)` fixed
    /// once the transition lands. Returns `false` when the clamped zoom
    /// equals the current target.
    pub fn zoom_onto_point(&mut self, sx: f64, sy: f64, zoom: f64, duration: f64) -> bool {
        let new_zoom = self.clamp_zoom(zoom);
        let old_zoom = self.zoom.target;
        if new_zoom == old_zoom {
            return false;
        }
        let cx = (self.x.target + sx) / old_zoom;
        let cy = (self.y.target + sy) / old_zoom;
        self.x.go_to(cx * new_zoom - sx, duration);
        self.y.go_to(cy * new_zoom - sy, duration);
        self.zoom.go_to(new_zoom, duration);
        true
    }

    /// Remaining pan travel, in unscaled pixels per ms of animation left.
    pub fn pan_distance_left(&self) -> f64 {
        (rate_left(&self.x) + rate_left(&self.y)) / self.zoom.current
    }

    /// A pan is "big" while no zoom is in flight and the remaining travel
    /// rate exceeds the fast-pan threshold.
    pub fn is_panning_big(&self) -> bool {
        !self.zoom.is_animating() && self.pan_distance_left() > FAST_PAN_THRESHOLD
    }
}

fn rate_left(animation: &Animation<f64>) -> f64 {
    if animation.time > 0.0 {
        (animation.target - animation.current).abs() / animation.time
    } else {
        0.0
    }
}
