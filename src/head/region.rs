//! Tracking policy and loss handling for one region (eyes, neck).
//!
//! A region groups the axes that share one policy and one loss-handling
//! state. The same `Region` type drives both the eyes (fast, small travel,
//! absolute-gaze blend) and the neck (slow, wide travel, plain incremental
//! PID) — the difference is entirely configuration.

use crate::config::{DimensionTuning, LossTuning, NearGainConfig};
use crate::head::axis::{AxisBank, AxisId};
use crate::head::filter::{ema, limit_step, near_gain, LowPass};
use crate::head::gaze;
use crate::head::pid::Pid;

/// Region lifecycle while the face is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Face visible, normal control
    Tracking,
    /// Face recently lost; sweeping in the last-known direction
    Searching,
    /// Given up; easing back to the rest pose
    Centering,
    /// At rest, waiting for reacquisition
    Centered,
}

/// One axis driven by a dimension, with its mechanical sign.
#[derive(Debug, Clone, Copy)]
pub struct AxisBinding {
    pub id: AxisId,
    /// Detector-to-servo direction flip (+1.0 or -1.0)
    pub invert: f32,
}

/// Absolute-gaze blending parameters for a dimension.
///
/// Blends a direct error→angle mapping with the incremental PID target. The
/// weight itself shrinks near zero error, so large errors snap while small
/// ones stay on the stable incremental path.
#[derive(Debug, Clone, Copy)]
pub struct AbsBlend {
    /// Degrees of travel mapped per unit of normalized error
    pub gain_deg: f32,
    /// Base mix weight of the absolute component
    pub weight: f32,
    pub near: NearGainConfig,
}

/// One tracked error dimension (horizontal or vertical) and the axes it
/// drives.
pub struct Dimension {
    tuning: DimensionTuning,
    pid: Pid,
    err_filter: Option<LowPass>,
    abs_blend: Option<AbsBlend>,
    axes: Vec<AxisBinding>,
}

impl Dimension {
    pub fn new(tuning: DimensionTuning, axes: Vec<AxisBinding>, abs_blend: Option<AbsBlend>) -> Self {
        Self {
            pid: Pid::new(tuning.kp, tuning.ki, tuning.kd, tuning.i_clamp),
            err_filter: tuning.err_lp_alpha.map(LowPass::new),
            tuning,
            abs_blend,
            axes,
        }
    }

    /// Run the full pipeline for one tick: deadband → normalize → low-pass →
    /// PID (near-gain scaled) → per-axis target (abs/incremental blend) →
    /// smoothing → step limit → clamp-and-commit.
    fn update(&mut self, bank: &mut AxisBank, err_px: f32, half_dim: f32, dt: f32) {
        let mut err = gaze::normalize(err_px, self.tuning.deadband_px, half_dim);
        if let Some(f) = &mut self.err_filter {
            err = f.filter(err);
        }

        let g = match self.tuning.near_gain {
            Some(n) => near_gain(err, n.e0, n.min_gain),
            None => 1.0,
        };
        let pid_out = self.pid.update(err, dt) * g;

        for binding in &self.axes {
            let axis = *bank.axis(binding.id);
            let incremental = axis.clamp(axis.current() + binding.invert * pid_out);

            let desired = match &self.abs_blend {
                Some(ab) => {
                    let absolute =
                        axis.clamp(axis.center() + binding.invert * (ab.gain_deg * g) * err);
                    let w = ab.weight * near_gain(err, ab.near.e0, ab.near.min_gain);
                    w * absolute + (1.0 - w) * incremental
                }
                None => incremental,
            };

            let mut smoothed = ema(self.tuning.smooth_alpha, desired, axis.current());
            if let Some(step) = self.tuning.max_step_deg {
                smoothed = limit_step(axis.current(), smoothed, step);
            }
            bank.set_target(binding.id, smoothed);
        }
    }

    /// Sweep every axis of this dimension at `rate_dps` in `dir`.
    /// No reversal once a limit is hit; clamping simply pins the sweep there.
    fn sweep(&self, bank: &mut AxisBank, dir: f32, rate_dps: f32, dt: f32) {
        for binding in &self.axes {
            let current = bank.angle(binding.id);
            bank.set_target(binding.id, current + dir * binding.invert * rate_dps * dt);
        }
    }

    /// Ease every axis toward its rest angle; true when all are within
    /// `epsilon` of it.
    fn ease_to_center(&self, bank: &mut AxisBank, ease_factor: f32, epsilon: f32) -> bool {
        let mut all_centered = true;
        for binding in &self.axes {
            let axis = *bank.axis(binding.id);
            let diff = axis.center() - axis.current();
            if diff.abs() >= epsilon {
                all_centered = false;
                bank.set_target(binding.id, axis.current() + diff * ease_factor);
            }
        }
        all_centered
    }

    fn snap_to_center(&self, bank: &mut AxisBank) {
        for binding in &self.axes {
            let center = bank.axis(binding.id).center();
            bank.set_target(binding.id, center);
        }
    }

    /// Mean displacement of this dimension's axes from their range midpoint,
    /// as a fraction of the half-range. Drives the neck activation check.
    fn mean_displacement(&self, bank: &AxisBank) -> f32 {
        if self.axes.is_empty() {
            return 0.0;
        }
        let sum: f32 = self
            .axes
            .iter()
            .map(|b| {
                let axis = bank.axis(b.id);
                (axis.current() - axis.range_center()).abs() / axis.half_range()
            })
            .sum();
        sum / self.axes.len() as f32
    }
}

/// A slaved axis driven by another axis's position through an inverse linear
/// map of the source travel onto the follower travel. The reference head
/// counter-rotates its shoulder roll pair against neck pitch this way.
#[derive(Debug, Clone, Copy)]
pub struct Follower {
    pub source: AxisId,
    pub target: AxisId,
}

impl Follower {
    fn apply(&self, bank: &mut AxisBank) {
        let src = *bank.axis(self.source);
        let dst = *bank.axis(self.target);
        let span = src.max() - src.min();
        if span <= 0.0 {
            return;
        }
        let frac = (src.current() - src.min()) / span;
        let angle = dst.max() - frac * (dst.max() - dst.min());
        bank.set_target(self.target, angle);
    }
}

/// Which dimensions of a region are allowed to move this tick.
///
/// The eyes are always fully engaged; the neck engages per dimension only
/// while the eyes are pushed past the activation threshold.
#[derive(Debug, Clone, Copy)]
pub struct Engagement {
    pub horizontal: bool,
    pub vertical: bool,
}

impl Engagement {
    pub const FULL: Engagement = Engagement {
        horizontal: true,
        vertical: true,
    };
}

/// A named group of axes sharing one tracking policy and one loss state.
pub struct Region {
    name: &'static str,
    phase: Phase,
    last_seen_ms: f64,
    /// Sign of the last observed horizontal/vertical error; 0 = unknown
    dir_x: f32,
    dir_y: f32,
    horizontal: Option<Dimension>,
    vertical: Option<Dimension>,
    followers: Vec<Follower>,
    loss: LossTuning,
}

impl Region {
    pub fn new(
        name: &'static str,
        loss: LossTuning,
        horizontal: Option<Dimension>,
        vertical: Option<Dimension>,
        followers: Vec<Follower>,
    ) -> Self {
        Self {
            name,
            phase: Phase::Tracking,
            last_seen_ms: 0.0,
            dir_x: 0.0,
            dir_y: 0.0,
            horizontal,
            vertical,
            followers,
            loss,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn mean_displacement_h(&self, bank: &AxisBank) -> f32 {
        self.horizontal
            .as_ref()
            .map(|d| d.mean_displacement(bank))
            .unwrap_or(0.0)
    }

    pub fn mean_displacement_v(&self, bank: &AxisBank) -> f32 {
        self.vertical
            .as_ref()
            .map(|d| d.mean_displacement(bank))
            .unwrap_or(0.0)
    }

    /// One tick with a face present. Reacquisition is immediate from any
    /// phase. `err_px_*` is the raw pixel error from this region's target
    /// point; `engage` masks dimensions that should hold still.
    pub fn on_face(
        &mut self,
        bank: &mut AxisBank,
        err_px_x: f32,
        err_px_y: f32,
        half_w: f32,
        half_h: f32,
        dt: f32,
        now_ms: f64,
        engage: Engagement,
    ) {
        if self.phase != Phase::Tracking {
            tracing::debug!(region = self.name, from = ?self.phase, "face reacquired");
            self.phase = Phase::Tracking;
        }

        if engage.horizontal {
            if let Some(dim) = &mut self.horizontal {
                dim.update(bank, err_px_x, half_w, dt);
            }
        }
        if engage.vertical {
            if let Some(dim) = &mut self.vertical {
                dim.update(bank, err_px_y, half_h, dt);
            }
        }
        for f in &self.followers {
            f.apply(bank);
        }

        self.last_seen_ms = now_ms;
        self.dir_x = if err_px_x < 0.0 { -1.0 } else { 1.0 };
        self.dir_y = if err_px_y < 0.0 { -1.0 } else { 1.0 };
    }

    /// One tick without a face: hold, search, or ease back to center
    /// depending on how long the face has been gone.
    pub fn on_lost(&mut self, bank: &mut AxisBank, dt: f32, now_ms: f64) {
        let elapsed = now_ms - self.last_seen_ms;

        if elapsed > self.loss.return_center_after_ms {
            if self.phase == Phase::Centered {
                return;
            }
            if self.phase != Phase::Centering {
                tracing::info!(
                    region = self.name,
                    lost_for_s = (elapsed / 1000.0) as u32,
                    "no face, returning to center"
                );
                self.phase = Phase::Centering;
            }
            self.ease_all_to_center(bank);
        } else if elapsed > self.loss.lost_after_ms
            && self.phase != Phase::Centered
            && (self.dir_x != 0.0 || self.dir_y != 0.0)
        {
            if self.phase != Phase::Searching {
                tracing::debug!(region = self.name, "face lost, searching");
                self.phase = Phase::Searching;
            }
            self.sweep_all(bank, dt);
        }
        // Within the grace period: hold the last position.
    }

    fn sweep_all(&mut self, bank: &mut AxisBank, dt: f32) {
        if self.dir_x != 0.0 && self.loss.search_rate_dps_x > 0.0 {
            if let Some(dim) = &self.horizontal {
                dim.sweep(bank, self.dir_x, self.loss.search_rate_dps_x, dt);
            }
        }
        if self.dir_y != 0.0 && self.loss.search_rate_dps_y > 0.0 {
            if let Some(dim) = &self.vertical {
                dim.sweep(bank, self.dir_y, self.loss.search_rate_dps_y, dt);
            }
        }
        for f in &self.followers {
            f.apply(bank);
        }
    }

    fn ease_all_to_center(&mut self, bank: &mut AxisBank) {
        let eps = self.loss.centered_epsilon_deg;
        let mut done = true;
        if let Some(dim) = &self.horizontal {
            done &= dim.ease_to_center(bank, self.loss.ease_factor, eps);
        }
        if let Some(dim) = &self.vertical {
            done &= dim.ease_to_center(bank, self.loss.ease_factor, eps);
        }
        for f in &self.followers {
            f.apply(bank);
        }

        if done {
            if let Some(dim) = &self.horizontal {
                dim.snap_to_center(bank);
            }
            if let Some(dim) = &self.vertical {
                dim.snap_to_center(bank);
            }
            for f in &self.followers {
                f.apply(bank);
            }
            tracing::info!(region = self.name, "centered");
            self.phase = Phase::Centered;
            self.dir_x = 0.0;
            self.dir_y = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AxisConfig, Config};
    use crate::servo::RecordingDriver;

    /// A neck-like single-axis region with the reference yaw tuning.
    fn yaw_region(bank: &mut AxisBank) -> (Region, AxisId) {
        let config = Config::default();
        let yaw = bank.add(&AxisConfig::new(13, 90.0, 180.0, 135.0));
        let dim = Dimension::new(
            config.neck.yaw_tuning,
            vec![AxisBinding {
                id: yaw,
                invert: -1.0,
            }],
            None,
        );
        let region = Region::new(
            "neck",
            LossTuning {
                lost_after_ms: 300.0,
                return_center_after_ms: 8000.0,
                search_rate_dps_x: 25.0,
                search_rate_dps_y: 0.0,
                ease_factor: 0.15,
                centered_epsilon_deg: 1.0,
            },
            Some(dim),
            None,
            vec![],
        );
        (region, yaw)
    }

    #[test]
    fn test_deadband_produces_no_motion() {
        let mut bank = AxisBank::new(Box::new(RecordingDriver::new()));
        let (mut region, yaw) = yaw_region(&mut bank);

        // 35 px error, 40 px deadband: zero input, zero output, no movement
        region.on_face(&mut bank, 35.0, 0.0, 320.0, 240.0, 0.033, 0.0, Engagement::FULL);
        assert_eq!(bank.angle(yaw), 135.0);
    }

    #[test]
    fn test_face_left_moves_yaw_up() {
        let mut bank = AxisBank::new(Box::new(RecordingDriver::new()));
        let (mut region, yaw) = yaw_region(&mut bank);

        // Face left of center: negative error, invert -1 flips it positive
        let mut now = 0.0;
        for _ in 0..10 {
            region.on_face(&mut bank, -300.0, 0.0, 320.0, 240.0, 0.033, now, Engagement::FULL);
            now += 33.0;
        }
        assert!(bank.angle(yaw) > 135.0, "yaw stuck at {}", bank.angle(yaw));
    }

    #[test]
    fn test_loss_state_machine_timing() {
        let mut bank = AxisBank::new(Box::new(RecordingDriver::new()));
        let (mut region, _) = yaw_region(&mut bank);

        // Track a far-left face for a while so the axis is well off center,
        // then lose it
        let mut now = -330.0;
        for _ in 0..10 {
            region.on_face(&mut bank, -300.0, 0.0, 320.0, 240.0, 0.033, now, Engagement::FULL);
            now += 33.0;
        }
        region.on_face(&mut bank, -300.0, 0.0, 320.0, 240.0, 0.033, 0.0, Engagement::FULL);
        assert_eq!(region.phase(), Phase::Tracking);

        region.on_lost(&mut bank, 0.033, 200.0);
        assert_eq!(region.phase(), Phase::Tracking); // grace period

        region.on_lost(&mut bank, 0.033, 500.0);
        assert_eq!(region.phase(), Phase::Searching);

        region.on_lost(&mut bank, 0.033, 8500.0);
        assert_eq!(region.phase(), Phase::Centering);

        // Keep ticking until fully centered
        let mut now = 8500.0;
        for _ in 0..200 {
            now += 33.0;
            region.on_lost(&mut bank, 0.033, now);
        }
        assert_eq!(region.phase(), Phase::Centered);
    }

    #[test]
    fn test_reacquisition_is_immediate_from_any_phase() {
        let mut bank = AxisBank::new(Box::new(RecordingDriver::new()));
        let (mut region, _) = yaw_region(&mut bank);

        region.on_face(&mut bank, 100.0, 0.0, 320.0, 240.0, 0.033, 0.0, Engagement::FULL);
        region.on_lost(&mut bank, 0.033, 9000.0);
        assert_eq!(region.phase(), Phase::Centering);

        region.on_face(&mut bank, 50.0, 0.0, 320.0, 240.0, 0.033, 9033.0, Engagement::FULL);
        assert_eq!(region.phase(), Phase::Tracking);
    }

    #[test]
    fn test_search_sweeps_in_last_direction_and_pins_at_limit() {
        let mut bank = AxisBank::new(Box::new(RecordingDriver::new()));
        let (mut region, yaw) = yaw_region(&mut bank);

        // Face was to the left (dir -1); invert -1 makes the sweep positive
        region.on_face(&mut bank, -100.0, 0.0, 320.0, 240.0, 0.033, 0.0, Engagement::FULL);
        let start = bank.angle(yaw);

        let mut now = 400.0;
        let mut last = start;
        for _ in 0..100 {
            region.on_lost(&mut bank, 0.1, now);
            let angle = bank.angle(yaw);
            assert!(angle >= last, "sweep reversed");
            last = angle;
            now += 100.0;
            if now > 7900.0 {
                break;
            }
        }
        // 25 deg/s for several seconds pins the axis at its max
        assert_eq!(bank.angle(yaw), 180.0);
    }

    #[test]
    fn test_centered_holds_and_clears_direction() {
        let mut bank = AxisBank::new(Box::new(RecordingDriver::new()));
        let (mut region, yaw) = yaw_region(&mut bank);

        region.on_face(&mut bank, -300.0, 0.0, 320.0, 240.0, 0.033, 0.0, Engagement::FULL);
        let mut now = 8100.0;
        for _ in 0..300 {
            region.on_lost(&mut bank, 0.033, now);
            now += 33.0;
        }
        assert_eq!(region.phase(), Phase::Centered);
        assert_eq!(bank.angle(yaw), 135.0);

        // Further lost ticks change nothing
        region.on_lost(&mut bank, 0.033, now + 10_000.0);
        assert_eq!(bank.angle(yaw), 135.0);
        assert_eq!(region.phase(), Phase::Centered);
    }

    #[test]
    fn test_disengaged_dimension_holds() {
        let mut bank = AxisBank::new(Box::new(RecordingDriver::new()));
        let (mut region, yaw) = yaw_region(&mut bank);

        region.on_face(
            &mut bank,
            -300.0,
            0.0,
            320.0,
            240.0,
            0.033,
            0.0,
            Engagement {
                horizontal: false,
                vertical: true,
            },
        );
        assert_eq!(bank.angle(yaw), 135.0);
    }

    #[test]
    fn test_follower_tracks_source_inversely() {
        let mut bank = AxisBank::new(Box::new(RecordingDriver::new()));
        let pitch = bank.add(&AxisConfig::new(14, 60.0, 180.0, 120.0));
        let roll = bank.add(&AxisConfig::new(12, 130.0, 180.0, 155.0));
        let follower = Follower {
            source: pitch,
            target: roll,
        };

        // Pitch at min → roll at max
        bank.set_target(pitch, 60.0);
        follower.apply(&mut bank);
        assert_eq!(bank.angle(roll), 180.0);

        // Pitch at max → roll at min
        bank.set_target(pitch, 180.0);
        follower.apply(&mut bank);
        assert_eq!(bank.angle(roll), 130.0);

        // Pitch at rest (midpoint of travel) → roll at its own rest
        bank.set_target(pitch, 120.0);
        follower.apply(&mut bank);
        assert_eq!(bank.angle(roll), 155.0);
    }

    #[test]
    fn test_mean_displacement_fraction() {
        let mut bank = AxisBank::new(Box::new(RecordingDriver::new()));
        let left = bank.add(&AxisConfig::new(10, 15.0, 165.0, 90.0));
        let right = bank.add(&AxisConfig::new(11, 15.0, 165.0, 90.0));
        let dim = Dimension::new(
            DimensionTuning::default(),
            vec![
                AxisBinding {
                    id: left,
                    invert: -1.0,
                },
                AxisBinding {
                    id: right,
                    invert: -1.0,
                },
            ],
            None,
        );

        assert_eq!(dim.mean_displacement(&bank), 0.0);

        bank.set_target(left, 165.0); // full throw on one of two axes
        assert!((dim.mean_displacement(&bank) - 0.5).abs() < 1e-6);

        bank.set_target(right, 15.0); // full throw both sides
        assert!((dim.mean_displacement(&bank) - 1.0).abs() < 1e-6);
    }
}
