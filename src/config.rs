//! Configuration parsing and management for animatron
//!
//! All calibration data lives here: servo channels and travel limits, PID
//! gains, deadbands, smoothing factors, loss-handling timeouts and blink
//! timing. Defaults match the reference InMoov-style head so the binary runs
//! without a config file on that hardware.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AnimatronError, ConfigError};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub vision: VisionConfig,
    pub servo: ServoConfig,
    pub eyes: EyesConfig,
    pub neck: NeckConfig,
    pub blink: BlinkConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AnimatronError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_toml(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(s: &str) -> Result<Self, AnimatronError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load configuration from default paths
    pub fn load() -> Result<Self, AnimatronError> {
        let paths = [
            PathBuf::from("config.toml"),
            PathBuf::from("config/default.toml"),
        ];

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using built-in calibration");
        Ok(Self::default())
    }

    /// Validate the configuration.
    ///
    /// Inconsistent calibration is rejected at startup; clamping against a
    /// reversed range would be undefined at runtime.
    pub fn validate(&self) -> Result<(), AnimatronError> {
        for (name, axis) in self.axes() {
            axis.validate(name)?;
        }
        self.check_channel_ownership()?;

        self.eyes.horizontal.validate("eyes.horizontal")?;
        self.eyes.vertical.validate("eyes.vertical")?;
        self.neck.yaw_tuning.validate("neck.yaw_tuning")?;
        self.neck.pitch_tuning.validate("neck.pitch_tuning")?;

        if !(0.0..=1.0).contains(&self.neck.activation_threshold) {
            return Err(invalid(
                "neck.activation_threshold",
                "must be between 0.0 and 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.blink.double_blink_prob) {
            return Err(invalid(
                "blink.double_blink_prob",
                "must be between 0.0 and 1.0",
            ));
        }
        for (field, range) in [
            ("blink.interval_s", self.blink.interval_s),
            ("blink.double_pause_s", self.blink.double_pause_s),
            ("blink.hold_s", self.blink.hold_s),
            ("blink.upper.close_ms", self.blink.upper.close_ms),
            ("blink.upper.open_ms", self.blink.upper.open_ms),
            ("blink.lower.close_ms", self.blink.lower.close_ms),
            ("blink.lower.open_ms", self.blink.lower.open_ms),
        ] {
            if range[0] > range[1] || range[0] < 0.0 {
                return Err(invalid(field, "range must be non-negative with lo <= hi"));
            }
        }
        for (field, scale) in [
            ("blink.upper.close_scale", self.blink.upper.close_scale),
            ("blink.lower.close_scale", self.blink.lower.close_scale),
        ] {
            if !(0.0..=1.0).contains(&scale) {
                return Err(invalid(field, "must be between 0.0 and 1.0"));
            }
        }
        if !(0.0..=1.0).contains(&self.vision.min_confidence) {
            return Err(invalid("vision.min_confidence", "must be between 0.0 and 1.0"));
        }
        if self.eyes.loss.ease_factor <= 0.0 || self.eyes.loss.ease_factor > 1.0 {
            return Err(invalid("eyes.loss.ease_factor", "must be in (0.0, 1.0]"));
        }
        if self.neck.loss.ease_factor <= 0.0 || self.neck.loss.ease_factor > 1.0 {
            return Err(invalid("neck.loss.ease_factor", "must be in (0.0, 1.0]"));
        }

        Ok(())
    }

    /// All configured axes with their config-path names, in commit order.
    pub fn axes(&self) -> Vec<(&'static str, &AxisConfig)> {
        vec![
            ("eyes.left_h", &self.eyes.left_h),
            ("eyes.right_h", &self.eyes.right_h),
            ("eyes.left_v", &self.eyes.left_v),
            ("eyes.right_v", &self.eyes.right_v),
            ("neck.yaw", &self.neck.yaw),
            ("neck.pitch", &self.neck.pitch),
            ("neck.roll_left", &self.neck.roll_left),
            ("neck.roll_right", &self.neck.roll_right),
            ("blink.upper", &self.blink.upper.axis),
            ("blink.lower", &self.blink.lower.axis),
        ]
    }

    /// Every axis is written by exactly one component per tick, so a channel
    /// appearing twice would break exclusive ownership.
    fn check_channel_ownership(&self) -> Result<(), AnimatronError> {
        let axes = self.axes();
        for (i, (name_a, a)) in axes.iter().enumerate() {
            for (name_b, b) in axes.iter().skip(i + 1) {
                if a.channel == b.channel {
                    return Err(ConfigError::DuplicateChannel {
                        channel: a.channel,
                        first: name_a.to_string(),
                        second: name_b.to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> AnimatronError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

/// One physical degree of freedom: a PCA9685 channel with calibrated travel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AxisConfig {
    /// PCA9685 channel number
    pub channel: u8,
    /// Minimum angle in degrees
    pub min: f32,
    /// Maximum angle in degrees
    pub max: f32,
    /// Rest/center angle in degrees
    pub center: f32,
}

impl AxisConfig {
    pub const fn new(channel: u8, min: f32, max: f32, center: f32) -> Self {
        Self {
            channel,
            min,
            max,
            center,
        }
    }

    fn validate(&self, name: &str) -> Result<(), AnimatronError> {
        if self.min > self.max {
            return Err(invalid(name, "min must not exceed max"));
        }
        if self.center < self.min || self.center > self.max {
            return Err(invalid(name, "center must lie within [min, max]"));
        }
        Ok(())
    }
}

/// Aggressiveness taper near zero error: full gain beyond `e0`, tapering
/// linearly down to `min_gain` at zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NearGainConfig {
    pub e0: f32,
    pub min_gain: f32,
}

/// Per-dimension control tuning: PID gains plus the smoothing pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionTuning {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
    /// Anti-windup bound on the accumulated integral
    pub i_clamp: f32,
    /// Error magnitudes at or below this many pixels are treated as zero
    pub deadband_px: f32,
    /// Exponential smoothing factor toward the desired angle (1.0 = none)
    pub smooth_alpha: f32,
    /// Worst-case slew per tick in degrees; absent = unlimited
    pub max_step_deg: Option<f32>,
    /// Cross-frame low-pass on the normalized error; absent = unfiltered
    pub err_lp_alpha: Option<f32>,
    /// Optional taper of the PID output near zero error
    pub near_gain: Option<NearGainConfig>,
}

impl Default for DimensionTuning {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            i_clamp: 25.0,
            deadband_px: 0.0,
            smooth_alpha: 1.0,
            max_step_deg: None,
            err_lp_alpha: None,
            near_gain: None,
        }
    }
}

impl DimensionTuning {
    fn validate(&self, name: &str) -> Result<(), AnimatronError> {
        if self.smooth_alpha <= 0.0 || self.smooth_alpha > 1.0 {
            return Err(invalid(name, "smooth_alpha must be in (0.0, 1.0]"));
        }
        if let Some(a) = self.err_lp_alpha {
            if a <= 0.0 || a > 1.0 {
                return Err(invalid(name, "err_lp_alpha must be in (0.0, 1.0]"));
            }
        }
        if self.i_clamp < 0.0 {
            return Err(invalid(name, "i_clamp must be non-negative"));
        }
        if self.deadband_px < 0.0 {
            return Err(invalid(name, "deadband_px must be non-negative"));
        }
        if let Some(step) = self.max_step_deg {
            if step <= 0.0 {
                return Err(invalid(name, "max_step_deg must be positive"));
            }
        }
        Ok(())
    }
}

/// Loss-handling timing for one region. All wall-clock, not frame-count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LossTuning {
    /// Face absent for longer than this starts the search sweep
    pub lost_after_ms: f64,
    /// Face absent for longer than this starts easing back to center
    pub return_center_after_ms: f64,
    /// Horizontal sweep rate in degrees/second (0 disables the sweep)
    pub search_rate_dps_x: f32,
    /// Vertical sweep rate in degrees/second (0 disables the sweep)
    pub search_rate_dps_y: f32,
    /// Proportional easing step toward center per tick
    pub ease_factor: f32,
    /// Every axis within this many degrees of center counts as centered
    pub centered_epsilon_deg: f32,
}

impl Default for LossTuning {
    fn default() -> Self {
        Self {
            lost_after_ms: 300.0,
            return_center_after_ms: 8000.0,
            search_rate_dps_x: 0.0,
            search_rate_dps_y: 0.0,
            ease_factor: 0.15,
            centered_epsilon_deg: 1.0,
        }
    }
}

/// Gaze target point, offset from the frame center. The reference head has
/// its camera on the forehead, above the eye line, so the eyes aim slightly
/// below the optical center.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetOffset {
    /// Use the fractional offsets instead of the pixel offsets
    pub use_frac: bool,
    /// Horizontal offset as a fraction of frame width
    pub x_frac: f32,
    /// Vertical offset as a fraction of frame height (+ is down)
    pub y_frac: f32,
    /// Horizontal offset in pixels
    pub x_px: i32,
    /// Vertical offset in pixels (+ is down)
    pub y_px: i32,
}

impl Default for TargetOffset {
    fn default() -> Self {
        Self {
            use_frac: true,
            x_frac: 0.0,
            y_frac: 0.0,
            x_px: 0,
            y_px: 80,
        }
    }
}

/// Eye region: four axes, fast gains, small travel, primary responder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EyesConfig {
    pub left_h: AxisConfig,
    pub right_h: AxisConfig,
    pub left_v: AxisConfig,
    pub right_v: AxisConfig,
    /// Detector-to-servo sign for both horizontal axes
    pub invert_h: f32,
    /// Vertical sign per side; the two eye mechanisms mirror each other
    pub invert_v_left: f32,
    pub invert_v_right: f32,
    pub horizontal: DimensionTuning,
    pub vertical: DimensionTuning,
    /// Absolute-gaze span in degrees for the horizontal blend
    pub abs_gain_deg: f32,
    /// Base weight of the absolute component in the abs/incremental mix
    pub abs_mix_weight: f32,
    /// Near-gain shaping of the abs/incremental mix weight
    pub abs_near: NearGainConfig,
    pub target: TargetOffset,
    pub loss: LossTuning,
}

impl Default for EyesConfig {
    fn default() -> Self {
        Self {
            left_h: AxisConfig::new(10, 15.0, 165.0, 90.0),
            right_h: AxisConfig::new(11, 15.0, 165.0, 90.0),
            left_v: AxisConfig::new(8, 90.0, 120.0, 90.0),
            right_v: AxisConfig::new(9, 70.0, 110.0, 90.0),
            invert_h: -1.0,
            invert_v_left: -1.0,
            invert_v_right: 1.0,
            horizontal: DimensionTuning {
                kp: 9.0,
                ki: 0.0,
                kd: 0.25,
                i_clamp: 25.0,
                deadband_px: 20.0,
                smooth_alpha: 0.48,
                max_step_deg: Some(3.0),
                err_lp_alpha: Some(0.28),
                near_gain: Some(NearGainConfig {
                    e0: 0.25,
                    min_gain: 0.35,
                }),
            },
            vertical: DimensionTuning {
                kp: 9.0,
                ki: 0.0,
                kd: 0.10,
                i_clamp: 25.0,
                deadband_px: 22.0,
                smooth_alpha: 0.35,
                max_step_deg: Some(2.0),
                err_lp_alpha: Some(0.28),
                near_gain: Some(NearGainConfig {
                    e0: 0.25,
                    min_gain: 0.40,
                }),
            },
            abs_gain_deg: 65.0,
            abs_mix_weight: 0.6,
            abs_near: NearGainConfig {
                e0: 0.35,
                min_gain: 0.25,
            },
            target: TargetOffset::default(),
            loss: LossTuning {
                lost_after_ms: 300.0,
                return_center_after_ms: 6000.0,
                // The eyes never sweep; they hold and then re-center.
                search_rate_dps_x: 0.0,
                search_rate_dps_y: 0.0,
                ease_factor: 0.15,
                centered_epsilon_deg: 1.0,
            },
        }
    }
}

/// Neck region: yaw + pitch tracked, roll pair following pitch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NeckConfig {
    pub yaw: AxisConfig,
    pub pitch: AxisConfig,
    pub roll_left: AxisConfig,
    pub roll_right: AxisConfig,
    pub invert_yaw: f32,
    pub invert_pitch: f32,
    pub yaw_tuning: DimensionTuning,
    pub pitch_tuning: DimensionTuning,
    /// Mean eye displacement (fraction of the eye half-range) above which the
    /// neck engages on that dimension
    pub activation_threshold: f32,
    /// Drive the shoulder roll pair from the pitch angle
    pub roll_follows_pitch: bool,
    pub loss: LossTuning,
}

impl Default for NeckConfig {
    fn default() -> Self {
        Self {
            yaw: AxisConfig::new(13, 90.0, 180.0, 135.0),
            pitch: AxisConfig::new(14, 60.0, 180.0, 120.0),
            roll_left: AxisConfig::new(12, 130.0, 180.0, 155.0),
            roll_right: AxisConfig::new(15, 130.0, 180.0, 155.0),
            invert_yaw: -1.0,
            invert_pitch: -1.0,
            yaw_tuning: DimensionTuning {
                kp: 7.0,
                ki: 0.01,
                kd: 0.0,
                i_clamp: 30.0,
                deadband_px: 40.0,
                smooth_alpha: 0.25,
                max_step_deg: None,
                err_lp_alpha: None,
                near_gain: None,
            },
            pitch_tuning: DimensionTuning {
                kp: 20.0,
                ki: 0.05,
                kd: 1.0,
                i_clamp: 30.0,
                deadband_px: 15.0,
                smooth_alpha: 0.5,
                max_step_deg: None,
                err_lp_alpha: None,
                near_gain: None,
            },
            activation_threshold: 0.70,
            roll_follows_pitch: true,
            loss: LossTuning {
                lost_after_ms: 300.0,
                return_center_after_ms: 8000.0,
                search_rate_dps_x: 25.0,
                search_rate_dps_y: 30.0,
                ease_factor: 0.15,
                centered_epsilon_deg: 1.0,
            },
        }
    }
}

/// One eyelid: travel plus randomized motion timing ranges.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LidConfig {
    pub axis: AxisConfig,
    /// Fraction of the open→max travel used as the closed position
    pub close_scale: f32,
    /// Closing duration range in milliseconds [lo, hi]
    pub close_ms: [f32; 2],
    /// Opening duration range in milliseconds [lo, hi]
    pub open_ms: [f32; 2],
}

impl LidConfig {
    /// Angle when the lid is fully open (the axis min, by calibration).
    pub fn open_angle(&self) -> f32 {
        self.axis.min
    }

    /// Angle when the lid is closed, scaled into the calibrated travel.
    pub fn closed_angle(&self) -> f32 {
        self.axis.min + self.close_scale * (self.axis.max - self.axis.min)
    }
}

/// Blink animator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkConfig {
    pub enabled: bool,
    pub upper: LidConfig,
    pub lower: LidConfig,
    /// Idle interval between blinks in seconds [lo, hi]
    pub interval_s: [f32; 2],
    /// Probability that a scheduled blink is a double blink
    pub double_blink_prob: f64,
    /// Pause between the two blinks of a double blink, seconds [lo, hi]
    pub double_pause_s: [f32; 2],
    /// Closed hold duration in seconds [lo, hi]
    pub hold_s: [f32; 2],
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            upper: LidConfig {
                axis: AxisConfig::new(7, 90.0, 140.0, 90.0),
                close_scale: 1.0,
                close_ms: [45.0, 70.0],
                open_ms: [90.0, 130.0],
            },
            lower: LidConfig {
                axis: AxisConfig::new(6, 60.0, 130.0, 60.0),
                close_scale: 1.0,
                close_ms: [55.0, 85.0],
                open_ms: [110.0, 160.0],
            },
            interval_s: [2.0, 6.0],
            double_blink_prob: 0.30,
            double_pause_s: [0.09, 0.18],
            hold_s: [0.02, 0.06],
        }
    }
}

/// Face-observation bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// UDP port to receive observations on
    pub port: u16,
    /// Listen address for the UDP socket
    pub listen_address: String,
    /// Auto-launch the Python detector bridge
    pub auto_launch: bool,
    /// Path to the face_bridge.py script
    pub bridge_script: String,
    /// Camera device index
    pub camera_device: u32,
    /// Camera capture width
    pub capture_width: u32,
    /// Camera capture height
    pub capture_height: u32,
    /// Camera capture FPS
    pub capture_fps: u32,
    /// Detector confidence floor
    pub min_confidence: f32,
    /// Auto-restart the bridge subprocess on crash
    pub auto_restart: bool,
    /// Delay before restarting a crashed subprocess (seconds)
    pub restart_delay_secs: u64,
    /// Treat the source as dead after this long without any datagram
    pub silent_after_ms: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            port: 12460,
            listen_address: "127.0.0.1".to_string(),
            auto_launch: true,
            bridge_script: "scripts/face_bridge.py".to_string(),
            camera_device: 0,
            capture_width: 640,
            capture_height: 480,
            capture_fps: 30,
            min_confidence: 0.45,
            auto_restart: true,
            restart_delay_secs: 3,
            silent_after_ms: 10_000,
        }
    }
}

/// Servo bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    /// Servo bridge UDP host
    pub host: String,
    /// Servo bridge UDP port
    pub port: u16,
    /// Log angles instead of sending them anywhere
    pub dry_run: bool,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 12461,
            dry_run: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.neck.yaw.channel, 13);
        assert_eq!(config.eyes.left_h.min, 15.0);
        assert!(config.blink.enabled);
    }

    #[test]
    fn test_reversed_axis_rejected() {
        let mut config = Config::default();
        config.neck.yaw.min = 200.0; // above max
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("neck.yaw"));
    }

    #[test]
    fn test_center_outside_travel_rejected() {
        let mut config = Config::default();
        config.eyes.left_v.center = 10.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_channel_rejected() {
        let mut config = Config::default();
        config.neck.pitch.channel = config.eyes.left_h.channel;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("assigned to both"));
    }

    #[test]
    fn test_parse_toml_overrides() {
        let toml = r#"
            [neck]
            activation_threshold = 0.5

            [neck.yaw]
            channel = 3
            min = 100.0
            max = 170.0
            center = 135.0

            [blink]
            enabled = false
        "#;

        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.neck.activation_threshold, 0.5);
        assert_eq!(config.neck.yaw.channel, 3);
        assert_eq!(config.neck.yaw.min, 100.0);
        assert!(!config.blink.enabled);
        // Untouched sections keep their defaults
        assert_eq!(config.eyes.abs_gain_deg, 65.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_probability_rejected() {
        let mut config = Config::default();
        config.blink.double_blink_prob = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lid_angles() {
        let config = BlinkConfig::default();
        assert_eq!(config.upper.open_angle(), 90.0);
        assert_eq!(config.upper.closed_angle(), 140.0);
        assert_eq!(config.lower.open_angle(), 60.0);
        assert_eq!(config.lower.closed_angle(), 130.0);
    }
}
