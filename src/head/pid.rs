//! Generic PID regulator over a scalar error signal.

/// Floor for `dt` before any division; degenerate frame timing must not
/// produce a division by zero.
const DT_FLOOR_S: f32 = 0.001;

/// Proportional-integral-derivative filter with integral clamping.
///
/// One instance per controlled error dimension. Gains are calibration data
/// supplied by the caller; see [`crate::config::DimensionTuning`].
#[derive(Debug, Clone, Copy)]
pub struct Pid {
    kp: f32,
    ki: f32,
    kd: f32,
    i_clamp: f32,
    integral: f32,
    last_error: f32,
}

impl Pid {
    pub fn new(kp: f32, ki: f32, kd: f32, i_clamp: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            i_clamp,
            integral: 0.0,
            last_error: 0.0,
        }
    }

    /// Advance one tick and return the raw control output.
    ///
    /// The integral is clamped to `[-i_clamp, i_clamp]` every tick
    /// (anti-windup); it is never zeroed after construction.
    pub fn update(&mut self, error: f32, dt: f32) -> f32 {
        let dt = dt.max(DT_FLOOR_S);

        self.integral = (self.integral + error * dt).clamp(-self.i_clamp, self.i_clamp);
        let derivative = (error - self.last_error) / dt;
        self.last_error = error;

        self.kp * error + self.ki * self.integral + self.kd * derivative
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proportional_only() {
        let mut pid = Pid::new(9.0, 0.0, 0.0, 25.0);
        let out = pid.update(0.5, 0.033);
        assert!((out - 4.5).abs() < 1e-5);
    }

    #[test]
    fn test_anti_windup_bounds_integral() {
        let mut pid = Pid::new(0.0, 1.0, 0.0, 30.0);
        for _ in 0..1000 {
            pid.update(1.0, 0.1);
        }
        assert!(pid.integral() <= 30.0);
        assert!((pid.integral() - 30.0).abs() < 1e-4);

        // And symmetrically for sustained negative error
        let mut pid = Pid::new(0.0, 1.0, 0.0, 30.0);
        for _ in 0..1000 {
            pid.update(-1.0, 0.1);
        }
        assert!(pid.integral() >= -30.0);
    }

    #[test]
    fn test_derivative_reacts_to_error_change() {
        let mut pid = Pid::new(0.0, 0.0, 1.0, 25.0);
        pid.update(0.0, 0.1);
        let out = pid.update(0.2, 0.1);
        assert!((out - 2.0).abs() < 1e-5);
        // Constant error: derivative term vanishes
        let out = pid.update(0.2, 0.1);
        assert!(out.abs() < 1e-5);
    }

    #[test]
    fn test_dt_floored() {
        let mut pid = Pid::new(0.0, 0.0, 1.0, 25.0);
        // dt = 0 must not divide by zero; floored to 1 ms
        let out = pid.update(0.001, 0.0);
        assert!(out.is_finite());
        assert!((out - 1.0).abs() < 1e-5);
    }
}
