//! Error types for animatron

use thiserror::Error;

/// Main error type
#[derive(Error, Debug)]
pub enum AnimatronError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),

    #[error("Servo error: {0}")]
    Servo(#[from] ServoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {field} - {message}")]
    InvalidValue { field: String, message: String },

    #[error("Servo channel {channel} assigned to both {first} and {second}")]
    DuplicateChannel {
        channel: u8,
        first: String,
        second: String,
    },
}

/// Face-observation source errors
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Receiver error: {0}")]
    Receiver(String),

    #[error("Detector subprocess error: {0}")]
    Subprocess(String),

    #[error("Observation source went silent (no frames for {0} ms)")]
    SourceSilent(u64),
}

/// Servo driver errors
#[derive(Error, Debug)]
pub enum ServoError {
    #[error("Failed to open servo bridge socket: {0}")]
    Open(String),

    #[error("Write to channel {channel} failed: {message}")]
    Write { channel: u8, message: String },
}

/// Result type alias for animatron operations
pub type Result<T> = std::result::Result<T, AnimatronError>;
