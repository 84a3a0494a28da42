//! Scalar filters shared by the tracking policies and the blink animator.

/// Exponential smoothing toward `target`: `alpha*target + (1-alpha)*previous`.
///
/// `alpha = 1.0` disables smoothing.
pub fn ema(alpha: f32, target: f32, previous: f32) -> f32 {
    alpha * target + (1.0 - alpha) * previous
}

/// Slew limiter: move from `current` toward `target` by at most `max_step`.
pub fn limit_step(current: f32, target: f32, max_step: f32) -> f32 {
    if target > current {
        target.min(current + max_step)
    } else {
        target.max(current - max_step)
    }
}

/// Aggressiveness taper near zero error.
///
/// Returns 1.0 for |e| >= e0, tapering linearly to `min_gain` at e = 0. Keeps
/// large corrections fast while damping micro-corrections near the setpoint.
pub fn near_gain(e: f32, e0: f32, min_gain: f32) -> f32 {
    let a = e.abs();
    if a >= e0 {
        1.0
    } else {
        min_gain + (1.0 - min_gain) * (a / e0)
    }
}

/// Smoothstep easing, `3t^2 - 2t^3`, with `t` clamped to [0, 1].
pub fn ease_in_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    3.0 * t * t - 2.0 * t * t * t
}

/// Cross-frame low-pass filter over a scalar signal.
///
/// `filtered = (1-alpha)*filtered + alpha*new`; used on the normalized gaze
/// error to knock down detector jitter before it reaches the PID.
#[derive(Debug, Clone, Copy)]
pub struct LowPass {
    alpha: f32,
    value: f32,
}

impl LowPass {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, value: 0.0 }
    }

    pub fn filter(&mut self, x: f32) -> f32 {
        self.value = (1.0 - self.alpha) * self.value + self.alpha * x;
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}
