//! Per-tick orchestration of the whole head.
//!
//! Ordering within a tick is fixed: eyes first (primary responder), then the
//! neck (compensation), then the blink animator. Each axis is written by
//! exactly one of those, so no locking is needed anywhere in the core.

use rand::rngs::StdRng;

use crate::config::{Config, TargetOffset};
use crate::head::axis::{AxisBank, AxisId};
use crate::head::blink::BlinkAnimator;
use crate::head::gaze;
use crate::head::region::{AbsBlend, AxisBinding, Dimension, Engagement, Follower, Phase, Region};
use crate::servo::ServoDriver;
use crate::vision::detector::FaceObservation;

/// Owns every axis and behavior of the animatronic head.
pub struct HeadController {
    bank: AxisBank,
    eyes: Region,
    neck: Region,
    blink: Option<BlinkAnimator>,
    eyes_target: TargetOffset,
    activation_threshold: f32,
}

impl HeadController {
    pub fn new(config: &Config, driver: Box<dyn ServoDriver>, now_ms: f64, rng: StdRng) -> Self {
        let mut bank = AxisBank::new(driver);

        let eyes_cfg = &config.eyes;
        let left_h = bank.add(&eyes_cfg.left_h);
        let right_h = bank.add(&eyes_cfg.right_h);
        let left_v = bank.add(&eyes_cfg.left_v);
        let right_v = bank.add(&eyes_cfg.right_v);

        let neck_cfg = &config.neck;
        let yaw = bank.add(&neck_cfg.yaw);
        let pitch = bank.add(&neck_cfg.pitch);
        let roll_left = bank.add(&neck_cfg.roll_left);
        let roll_right = bank.add(&neck_cfg.roll_right);

        let upper_lid = bank.add(&config.blink.upper.axis);
        let lower_lid = bank.add(&config.blink.lower.axis);

        let eyes = Region::new(
            "eyes",
            eyes_cfg.loss,
            Some(Dimension::new(
                eyes_cfg.horizontal,
                vec![
                    binding(left_h, eyes_cfg.invert_h),
                    binding(right_h, eyes_cfg.invert_h),
                ],
                Some(AbsBlend {
                    gain_deg: eyes_cfg.abs_gain_deg,
                    weight: eyes_cfg.abs_mix_weight,
                    near: eyes_cfg.abs_near,
                }),
            )),
            Some(Dimension::new(
                eyes_cfg.vertical,
                vec![
                    binding(left_v, eyes_cfg.invert_v_left),
                    binding(right_v, eyes_cfg.invert_v_right),
                ],
                None,
            )),
            vec![],
        );

        let mut followers = Vec::new();
        if neck_cfg.roll_follows_pitch {
            followers.push(Follower {
                source: pitch,
                target: roll_left,
            });
            followers.push(Follower {
                source: pitch,
                target: roll_right,
            });
        }

        let neck = Region::new(
            "neck",
            neck_cfg.loss,
            Some(Dimension::new(
                neck_cfg.yaw_tuning,
                vec![binding(yaw, neck_cfg.invert_yaw)],
                None,
            )),
            Some(Dimension::new(
                neck_cfg.pitch_tuning,
                vec![binding(pitch, neck_cfg.invert_pitch)],
                None,
            )),
            followers,
        );

        let blink = if config.blink.enabled {
            Some(BlinkAnimator::new(
                config.blink.clone(),
                upper_lid,
                lower_lid,
                now_ms,
                rng,
            ))
        } else {
            None
        };

        Self {
            bank,
            eyes,
            neck,
            blink,
            eyes_target: eyes_cfg.target,
            activation_threshold: neck_cfg.activation_threshold,
        }
    }

    /// Advance one frame.
    ///
    /// `face` is the primary face for this frame, if any; `frame_w`/`frame_h`
    /// are the capture dimensions; `dt` is seconds since the previous tick;
    /// `now_ms` is wall-clock milliseconds.
    pub fn tick(
        &mut self,
        face: Option<FaceObservation>,
        frame_w: f32,
        frame_h: f32,
        dt: f32,
        now_ms: f64,
    ) {
        let half_w = frame_w / 2.0;
        let half_h = frame_h / 2.0;

        match face {
            Some(face) => {
                // Eyes first: they establish the primary correction.
                let (tx, ty) = gaze::target_point(&self.eyes_target, frame_w, frame_h);
                let (ex, ey) = gaze::pixel_error(&face, tx, ty);
                self.eyes
                    .on_face(&mut self.bank, ex, ey, half_w, half_h, dt, now_ms, Engagement::FULL);

                // Neck compensates only once the eyes run out of range.
                let engage = Engagement {
                    horizontal: self.eyes.mean_displacement_h(&self.bank)
                        > self.activation_threshold,
                    vertical: self.eyes.mean_displacement_v(&self.bank)
                        > self.activation_threshold,
                };
                let (nx, ny) = gaze::pixel_error(&face, frame_w / 2.0, frame_h / 2.0);
                self.neck
                    .on_face(&mut self.bank, nx, ny, half_w, half_h, dt, now_ms, engage);
            }
            None => {
                self.eyes.on_lost(&mut self.bank, dt, now_ms);
                self.neck.on_lost(&mut self.bank, dt, now_ms);
            }
        }

        // Blink always advances, independent of tracking.
        if let Some(blink) = &mut self.blink {
            blink.update(&mut self.bank, now_ms);
        }
    }

    /// Best-effort safety action on shutdown: every axis back to rest.
    pub fn center_all(&mut self) {
        self.bank.center_all();
    }

    pub fn eyes_phase(&self) -> Phase {
        self.eyes.phase()
    }

    pub fn neck_phase(&self) -> Phase {
        self.neck.phase()
    }

    pub fn bank(&self) -> &AxisBank {
        &self.bank
    }

    /// Axis angle by PCA9685 channel; None if no axis uses that channel.
    pub fn angle_for_channel(&self, channel: u8) -> Option<f32> {
        self.bank.angle_for_channel(channel)
    }
}

fn binding(id: AxisId, invert: f32) -> AxisBinding {
    AxisBinding { id, invert }
}
