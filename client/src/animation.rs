/// Values an [`Animation`] can ease between.
pub trait Interpolate: Copy {
    fn interpolate(from: Self, to: Self, t: f64) -> Self;
}

impl Interpolate for f64 {
    fn interpolate(from: f64, to: f64, t: f64) -> f64 {
        from + (to - from) * t
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    #[default]
    Linear,
    CubicOut,
}

impl Easing {
    fn apply(self, t: f64) -> f64 {
        match self {
            Easing::Linear => t,
            Easing::CubicOut => cubic_ease_out(t),
        }
    }
}

/// A value easing from where it currently is toward `target` over `time` ms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Animation<T: Interpolate> {
    start: T,
    pub current: T,
    pub target: T,
    /// Duration of the current transition in milliseconds.
    pub time: f64,
    /// 0 when a transition begins, 1 once it has landed.
    pub progress: f64,
    easing: Easing,
}

impl<T: Interpolate> Animation<T> {
    /// An animation already at rest on `value`.
    pub fn at_rest(value: T) -> Self {
        Self {
            start: value,
            current: value,
            target: value,
            time: 0.0,
            progress: 1.0,
            easing: Easing::Linear,
        }
    }

    /// Start at `from` and ease to `to` over `time` ms.
    pub fn transition(from: T, to: T, time: f64) -> Self {
        let mut animation = Self::at_rest(from);
        animation.go_to(to, time);
        animation
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    /// Retarget from the current value. A non-positive duration snaps.
    pub fn go_to(&mut self, target: T, time: f64) {
        self.start = self.current;
        self.target = target;
        if time > 0.0 {
            self.time = time;
            self.progress = 0.0;
        } else {
            self.time = 0.0;
            self.progress = 1.0;
            self.current = target;
        }
    }

    /// Freeze at the current value.
    pub fn cancel(&mut self) {
        self.start = self.current;
        self.target = self.current;
        self.progress = 1.0;
    }

    pub fn is_animating(&self) -> bool {
        self.progress < 1.0
    }

    /// Advance by `elapsed` ms. Returns whether more frames are needed.
    pub fn animate(&mut self, elapsed: f64) -> bool {
        if !self.is_animating() {
            return false;
        }
        if elapsed > 0.0 {
            self.progress = (self.progress + elapsed / self.time).min(1.0);
        }
        if self.progress >= 1.0 {
            self.current = self.target;
            return false;
        }
        let t = self.easing.apply(self.progress);
        self.current = T::interpolate(self.start, self.target, t);
        true
    }
}

/// Cubic ease-out: decelerating to zero velocity.
fn cubic_ease_out(t: f64) -> f64 {
    let t = t - 1.0;
    t * t * t + 1.0
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
    fn linear_progress_and_landing() {
        let mut a = Animation::transition(0.0, 100.0, 100.0);
        assert!(a.animate(25.0));
        assert_close(a.current, 25.0);
        assert!(a.animate(50.0));
        assert_close(a.current, 75.0);
        assert!(!a.animate(25.0));
        assert_eq!(a.current, a.target);
        assert_close(a.progress, 1.0);
        // Inert until retargeted.
        assert!(!a.animate(16.0));
        assert_eq!(a.current, 100.0);
    }

    #[test]
    fn overshooting_elapsed_lands_exactly() {
        let mut a = Animation::transition(10.0, -30.0, 50.0);
        assert!(!a.animate(500.0));
        assert_eq!(a.current, -30.0);
    }

    #[test]
    fn retarget_mid_flight_is_continuous() {
        let mut a = Animation::transition(0.0, 100.0, 100.0);
        a.animate(40.0);
        let before = a.current;
        a.go_to(-50.0, 200.0);
        assert_eq!(a.current, before);
        assert_close(a.progress, 0.0);
        assert!(a.animate(100.0));
        assert_close(a.current, before + (-50.0 - before) * 0.5);
    }

    #[test]
    fn retarget_is_continuous_with_easing() {
        let mut a = Animation::transition(0.0, 1.0, 300.0).with_easing(Easing::CubicOut);
        a.animate(120.0);
        let before = a.current;
        a.go_to(0.25, 300.0);
        assert_eq!(a.current, before);
    }

    #[test]
    fn progress_is_monotonic() {
        let mut a = Animation::transition(0.0, 1.0, 300.0).with_easing(Easing::CubicOut);
        let mut last = a.progress;
        let mut last_value = a.current;
        while a.animate(7.0) {
            assert!(a.progress > last);
            assert!(a.current >= last_value);
            last = a.progress;
            last_value = a.current;
        }
        assert_eq!(a.current, 1.0);
    }

    #[test]
    fn non_positive_duration_snaps() {
        let mut a = Animation::at_rest(5.0);
        a.go_to(9.0, 0.0);
        assert_eq!(a.current, 9.0);
        assert!(!a.is_animating());
        a.go_to(-1.0, -10.0);
        assert_eq!(a.current, -1.0);
        assert!(!a.animate(16.0));
    }

    #[test]
    fn cancel_freezes_current() {
        let mut a = Animation::transition(0.0, 100.0, 100.0);
        a.animate(30.0);
        a.cancel();
        assert_close(a.current, 30.0);
        assert_close(a.target, 30.0);
        assert!(!a.animate(16.0));
        assert_close(a.current, 30.0);
    }

    #[test]
    fn cubic_ease_out_endpoints() {
        assert_close(cubic_ease_out(0.0), 0.0);
        assert_close(cubic_ease_out(1.0), 1.0);
        assert!(cubic_ease_out(0.5) > 0.5);
    }
}
