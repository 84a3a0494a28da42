//! Animatron - Face-Tracking Animatronic Head Controller
//!
//! A control service for a servo-driven animatronic head that:
//! - Tracks the most confident detected face with per-axis PID control
//! - Layers eyes-first tracking with threshold-activated neck compensation
//! - Searches, then recenters, when the face is lost
//! - Blinks on its own schedule, independent of tracking
//!
//! Camera/detector input arrives as JSON over UDP from a Python bridge;
//! servo commands leave the same way toward the PCA9685 bridge.

pub mod config;
pub mod error;
pub mod head;
pub mod servo;
pub mod vision;

pub use config::Config;
pub use error::{AnimatronError, Result};
pub use head::HeadController;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
