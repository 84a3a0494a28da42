//! Face error extraction: pixel error from a target point, deadband,
//! normalization to [-1, 1].

use crate::config::TargetOffset;
use crate::vision::detector::FaceObservation;

/// Resolve the gaze target point for a frame.
///
/// Defaults to the frame center; the configured offset compensates for a
/// camera mounted away from the eye line (the reference head has it on the
/// forehead).
pub fn target_point(offset: &TargetOffset, frame_w: f32, frame_h: f32) -> (f32, f32) {
    let cx = frame_w / 2.0;
    let cy = frame_h / 2.0;

    if offset.use_frac {
        (cx + offset.x_frac * frame_w, cy + offset.y_frac * frame_h)
    } else {
        (cx + offset.x_px as f32, cy + offset.y_px as f32)
    }
}

/// Raw pixel error of the face center from the target point.
pub fn pixel_error(face: &FaceObservation, tx: f32, ty: f32) -> (f32, f32) {
    (face.cx - tx, face.cy - ty)
}

/// Apply the deadband and normalize a pixel error by half the frame
/// dimension.
///
/// An error at or below the deadband is exactly zero; that keeps the PID
/// input quiet near the setpoint instead of oscillating over single pixels.
pub fn normalize(err_px: f32, deadband_px: f32, half_dim: f32) -> f32 {
    if err_px.abs() <= deadband_px {
        0.0
    } else {
        err_px / half_dim
    }
}
