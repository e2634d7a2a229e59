//! Pointer, touch and wheel bookkeeping. Camera changes are applied by the
//! view; this module only turns raw positions and timestamps into deltas,
//! fling velocity and zoom targets.

use std::collections::VecDeque;

use crate::config::{
    CLICK_SLOP_PX, MOMENTUM_DECAY, MOMENTUM_STOP_SPEED_SQ, STALE_FLING_MS, VELOCITY_SAMPLES,
    WHEEL_ZOOM_FRACTION,
};

/// Rolling window of the most recent per-move velocities (px/ms).
#[derive(Debug, Clone)]
pub struct VelocityWindow {
    samples: VecDeque<(f64, f64)>,
    capacity: usize,
}

impl Default for VelocityWindow {
    fn default() -> Self {
        Self::with_capacity(VELOCITY_SAMPLES)
    }
}

impl VelocityWindow {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, vx: f64, vy: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back((vx, vy));
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn average(&self) -> (f64, f64) {
        if self.samples.is_empty() {
            return (0.0, 0.0);
        }
        let n = self.samples.len() as f64;
        let (sx, sy) = self
            .samples
            .iter()
            .fold((0.0, 0.0), |(ax, ay), (vx, vy)| (ax + vx, ay + vy));
        (sx / n, sy / n)
    }
}

/// Inertial pan velocity in camera pixels per ms.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Momentum {
    pub vx: f64,
    pub vy: f64,
}

impl Momentum {
    pub fn speed_sq(&self) -> f64 {
        self.vx * self.vx + self.vy * self.vy
    }

    pub fn is_moving(&self) -> bool {
        self.speed_sq() > MOMENTUM_STOP_SPEED_SQ
    }

    pub fn stop(&mut self) {
        *self = Self::default();
    }

    /// Exponential decay over `elapsed` ms, independent of frame rate.
    pub fn decay(&mut self, elapsed: f64) {
        let factor = (-MOMENTUM_DECAY * elapsed).exp();
        self.vx *= factor;
        self.vy *= factor;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pinch {
    pub start_distance: f64,
    pub start_zoom: f64,
}

impl Pinch {
    /// Zoom is linear in log2 of the finger-spread ratio.
    pub fn zoom_for(&self, distance: f64) -> f64 {
        if self.start_distance <= 0.0 || distance <= 0.0 {
            return self.start_zoom;
        }
        self.start_zoom + (distance / self.start_distance).log2()
    }
}

pub fn pinch_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

pub fn pinch_center(a: (f64, f64), b: (f64, f64)) -> (f64, f64) {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
}

/// New zoom target for one wheel notch, or `None` when `delta_y` is zero.
///
/// The step is a fifth of the current zoom target, rounded to a whole
/// number of pixels on a `tile_size` image.
pub fn wheel_zoom_target(zoom_target: f64, delta_y: f64, tile_size: f64) -> Option<f64> {
    if delta_y == 0.0 || delta_y.is_nan() {
        return None;
    }
    let step = (tile_size * WHEEL_ZOOM_FRACTION * zoom_target).round() / tile_size;
    Some(zoom_target - step * delta_y.signum())
}

/// Transient cursor and drag state.
#[derive(Debug, Clone, Default)]
pub struct GestureState {
    /// Last known pointer position in client pixels.
    pub cursor: Option<(f64, f64)>,
    pub momentum: Momentum,
    pub pinch: Option<Pinch>,
    previous: (f64, f64),
    press: Option<(f64, f64)>,
    last_move_ms: f64,
    velocity: VelocityWindow,
}

impl GestureState {
    pub fn begin_drag(&mut self, x: f64, y: f64, now: f64) {
        self.velocity.clear();
        self.momentum.stop();
        self.previous = (x, y);
        self.press = Some((x, y));
        self.cursor = Some((x, y));
        self.last_move_ms = now;
    }

    /// Record a move and return its delta from the previous position.
    pub fn track_move(&mut self, x: f64, y: f64, now: f64) -> (f64, f64) {
        let dx = x - self.previous.0;
        let dy = y - self.previous.1;
        self.previous = (x, y);
        self.cursor = Some((x, y));
        let elapsed = now - self.last_move_ms;
        self.last_move_ms = now;
        if elapsed > 0.0 {
            self.velocity.push(-dx / elapsed, -dy / elapsed);
        }
        (dx, dy)
    }

    /// Adopt the averaged window as the fling velocity.
    pub fn refresh_momentum(&mut self) {
        let (vx, vy) = self.velocity.average();
        self.momentum = Momentum { vx, vy };
    }

    /// Finish a drag. A release long after the last move drops the fling.
    /// Returns the press position when the pointer barely moved.
    pub fn end_drag(&mut self, now: f64) -> Option<(f64, f64)> {
        if now - self.last_move_ms > STALE_FLING_MS {
            self.momentum.stop();
        }
        let press = self.press.take()?;
        let travel = pinch_distance(press, self.previous);
        (travel < CLICK_SLOP_PX).then_some(press)
    }

    /// Abandon a drag: no click and no fling.
    pub fn cancel(&mut self) {
        self.press = None;
        self.velocity.clear();
        self.momentum.stop();
    }

    pub fn velocity(&self) -> &VelocityWindow {
        &self.velocity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff < 1e-9,
            "expected {expected}, got {actual} (diff: {diff})"
        );
    }

    #[test]
    fn window_keeps_most_recent_samples() {
        let mut window = VelocityWindow::default();
        for i in 0..25 {
            window.push(i as f64, -(i as f64));
        }
        assert_eq!(window.len(), VELOCITY_SAMPLES);
        // Samples 15..=24.
        let (vx, vy) = window.average();
        assert_close(vx, 19.5);
        assert_close(vy, -19.5);
        window.clear();
        assert_eq!(window.average(), (0.0, 0.0));
    }

    #[test]
    fn momentum_decay_is_frame_rate_independent() {
        let mut coarse = Momentum { vx: 2.0, vy: -1.0 };
        let mut fine = coarse;
        coarse.decay(64.0);
        for _ in 0..4 {
            fine.decay(16.0);
        }
        assert_close(coarse.vx, fine.vx);
        assert_close(coarse.vy, fine.vy);
    }

    #[test]
    fn momentum_stops_below_threshold() {
        let mut m = Momentum { vx: 1.25, vy: -1.875 };
        let mut elapsed = 0.0;
        while m.is_moving() {
            m.decay(16.0);
            elapsed += 16.0;
        }
        assert!(elapsed < 2000.0, "took {elapsed} ms");
        assert!(elapsed > 500.0);
    }

    #[test]
    fn drag_records_deltas_and_velocity() {
        let mut g = GestureState::default();
        g.begin_drag(100.0, 100.0, 1000.0);
        let (dx, dy) = g.track_move(80.0, 130.0, 1016.0);
        assert_eq!((dx, dy), (-20.0, 30.0));
        g.refresh_momentum();
        assert_close(g.momentum.vx, 1.25);
        assert_close(g.momentum.vy, -1.875);
        assert_eq!(g.cursor, Some((80.0, 130.0)));
    }

    #[test]
    fn same_timestamp_moves_add_no_sample() {
        let mut g = GestureState::default();
        g.begin_drag(0.0, 0.0, 10.0);
        g.track_move(5.0, 0.0, 10.0);
        assert!(g.velocity().is_empty());
    }

    #[test]
    fn stale_release_drops_fling() {
        let mut g = GestureState::default();
        g.begin_drag(0.0, 0.0, 0.0);
        g.track_move(50.0, 0.0, 10.0);
        g.refresh_momentum();
        assert!(g.momentum.is_moving());
        g.end_drag(200.0);
        assert_eq!(g.momentum, Momentum::default());
    }

    #[test]
    fn quick_release_keeps_fling() {
        let mut g = GestureState::default();
        g.begin_drag(0.0, 0.0, 0.0);
        g.track_move(50.0, 0.0, 10.0);
        g.refresh_momentum();
        assert_eq!(g.end_drag(50.0), None);
        assert_close(g.momentum.vx, -5.0);
    }

    #[test]
    fn small_travel_is_a_click() {
        let mut g = GestureState::default();
        g.begin_drag(10.0, 10.0, 0.0);
        g.track_move(12.0, 11.0, 5.0);
        assert_eq!(g.end_drag(20.0), Some((10.0, 10.0)));
        // Press is consumed.
        assert_eq!(g.end_drag(30.0), None);
    }

    #[test]
    fn cancel_drops_press_and_fling() {
        let mut g = GestureState::default();
        g.begin_drag(10.0, 10.0, 0.0);
        g.track_move(11.0, 10.0, 8.0);
        g.refresh_momentum();
        assert!(g.momentum.is_moving());
        g.cancel();
        assert_eq!(g.momentum, Momentum::default());
        assert!(g.velocity().is_empty());
        assert_eq!(g.end_drag(10.0), None);
    }

    #[test]
    fn wheel_steps() {
        let up = wheel_zoom_target(1.0, -100.0, 256.0).expect("non-zero delta");
        assert_close(up, 1.0 + 51.0 / 256.0);
        let down = wheel_zoom_target(2.0, 3.0, 256.0).expect("non-zero delta");
        assert_close(down, 2.0 - 102.0 / 256.0);
        assert_eq!(wheel_zoom_target(1.0, 0.0, 256.0), None);
    }

    #[test]
    fn pinch_zoom_is_logarithmic() {
        let pinch = Pinch {
            start_distance: 100.0,
            start_zoom: 2.0,
        };
        assert_close(pinch.zoom_for(200.0), 3.0);
        assert_close(pinch.zoom_for(50.0), 1.0);
        assert_close(pinch.zoom_for(100.0), 2.0);
        assert_close(pinch.zoom_for(0.0), 2.0);
        assert_close(pinch_distance((0.0, 0.0), (3.0, 4.0)), 5.0);
        assert_eq!(pinch_center((0.0, 0.0), (4.0, 6.0)), (2.0, 3.0));
    }
}
