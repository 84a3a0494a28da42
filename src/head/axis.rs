//! Axis state and the commit path to the servo driver.

use crate::config::AxisConfig;
use crate::servo::ServoDriver;

/// Handle to an axis registered in an [`AxisBank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisId(usize);

/// One physical degree of freedom with calibrated travel.
///
/// Invariant: `current` stays within `[min, max]` for the life of the axis.
#[derive(Debug, Clone, Copy)]
pub struct Axis {
    channel: u8,
    min: f32,
    max: f32,
    center: f32,
    current: f32,
}

impl Axis {
    fn from_config(cfg: &AxisConfig) -> Self {
        Self {
            channel: cfg.channel,
            min: cfg.min,
            max: cfg.max,
            center: cfg.center,
            current: cfg.center,
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub fn center(&self) -> f32 {
        self.center
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    /// Half the travel range; used for displacement fractions.
    pub fn half_range(&self) -> f32 {
        (self.max - self.min) / 2.0
    }

    /// Midpoint of the travel range (not necessarily the rest angle).
    pub fn range_center(&self) -> f32 {
        (self.max + self.min) / 2.0
    }

    pub fn clamp(&self, angle: f32) -> f32 {
        angle.clamp(self.min, self.max)
    }

    pub fn at_center(&self, epsilon: f32) -> bool {
        (self.current - self.center).abs() < epsilon
    }
}

/// Owns every axis and the single commit path to the driver.
///
/// `set_target` silently clamps out-of-range requests; callers must not
/// assume the requested angle was honored unmodified. A driver failure on one
/// channel is logged and skipped so the remaining axes still move that tick.
pub struct AxisBank {
    axes: Vec<Axis>,
    driver: Box<dyn ServoDriver>,
}

impl AxisBank {
    pub fn new(driver: Box<dyn ServoDriver>) -> Self {
        Self {
            axes: Vec::new(),
            driver,
        }
    }

    /// Register an axis at its rest angle. The first hardware write happens
    /// via [`AxisBank::center_all`] at startup.
    pub fn add(&mut self, cfg: &AxisConfig) -> AxisId {
        self.axes.push(Axis::from_config(cfg));
        AxisId(self.axes.len() - 1)
    }

    pub fn axis(&self, id: AxisId) -> &Axis {
        &self.axes[id.0]
    }

    pub fn angle(&self, id: AxisId) -> f32 {
        self.axes[id.0].current
    }

    /// Clamp `angle` into the axis travel, record it, and command the servo.
    pub fn set_target(&mut self, id: AxisId, angle: f32) {
        let axis = &mut self.axes[id.0];
        let clamped = angle.clamp(axis.min, axis.max);
        axis.current = clamped;

        if let Err(e) = self.driver.set_angle(axis.channel, clamped) {
            tracing::warn!(channel = axis.channel, "servo write failed: {}", e);
        }
    }

    /// Current angle by hardware channel; None if no axis uses that channel.
    pub fn angle_for_channel(&self, channel: u8) -> Option<f32> {
        self.axes
            .iter()
            .find(|a| a.channel == channel)
            .map(|a| a.current)
    }

    /// Snap every axis to its rest angle. Used at startup and as the
    /// best-effort safety action on shutdown.
    pub fn center_all(&mut self) {
        for i in 0..self.axes.len() {
            let center = self.axes[i].center;
            self.set_target(AxisId(i), center);
        }
    }
}
