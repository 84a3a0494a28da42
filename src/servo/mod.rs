//! Servo driver abstraction.
//!
//! The control core never talks to hardware directly; it hands clamped angles
//! to a [`ServoDriver`]. The default driver forwards them as JSON datagrams to
//! `scripts/servo_bridge.py`, which owns the PCA9685 and applies the PWM
//! safety margins once at startup. Electrical limits are the bridge's
//! problem, not the controller's.

use std::net::UdpSocket;

use serde::Serialize;

use crate::error::ServoError;

/// A sink for joint-angle commands.
///
/// Implementations must be safe to call at camera frame rate (>= 20 Hz) and
/// idempotent for repeated identical angles.
pub trait ServoDriver: Send {
    fn set_angle(&mut self, channel: u8, angle: f32) -> Result<(), ServoError>;
}

#[derive(Serialize)]
struct AnglePacket {
    channel: u8,
    angle: f32,
}

/// Sends angle commands to the servo bridge as JSON-over-UDP.
pub struct UdpServoDriver {
    socket: UdpSocket,
    target: String,
}

impl UdpServoDriver {
    pub fn new(host: &str, port: u16) -> Result<Self, ServoError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| ServoError::Open(format!("bind failed: {}", e)))?;
        let target = format!("{}:{}", host, port);

        tracing::info!("Servo bridge driver sending to {}", target);
        Ok(Self { socket, target })
    }
}

impl ServoDriver for UdpServoDriver {
    fn set_angle(&mut self, channel: u8, angle: f32) -> Result<(), ServoError> {
        let packet = AnglePacket { channel, angle };
        let payload = serde_json::to_vec(&packet).map_err(|e| ServoError::Write {
            channel,
            message: format!("encode failed: {}", e),
        })?;

        self.socket
            .send_to(&payload, &self.target)
            .map_err(|e| ServoError::Write {
                channel,
                message: e.to_string(),
            })?;
        Ok(())
    }
}

/// Logs angle commands at debug level instead of sending them anywhere.
/// Used for bench runs without the head attached.
pub struct DryRunDriver;

impl ServoDriver for DryRunDriver {
    fn set_angle(&mut self, channel: u8, angle: f32) -> Result<(), ServoError> {
        tracing::debug!(channel, angle, "dry-run servo write");
        Ok(())
    }
}

/// Records every write; optionally fails selected channels to exercise the
/// per-axis error isolation path.
#[cfg(test)]
pub struct RecordingDriver {
    pub writes: Vec<(u8, f32)>,
    pub failing_channels: Vec<u8>,
}

#[cfg(test)]
impl RecordingDriver {
    pub fn new() -> Self {
        Self {
            writes: Vec::new(),
            failing_channels: Vec::new(),
        }
    }

    /// Last angle written to `channel`, if any.
    pub fn last_for(&self, channel: u8) -> Option<f32> {
        self.writes
            .iter()
            .rev()
            .find(|(c, _)| *c == channel)
            .map(|(_, a)| *a)
    }
}

#[cfg(test)]
impl ServoDriver for RecordingDriver {
    fn set_angle(&mut self, channel: u8, angle: f32) -> Result<(), ServoError> {
        if self.failing_channels.contains(&channel) {
            return Err(ServoError::Write {
                channel,
                message: "simulated failure".to_string(),
            });
        }
        self.writes.push((channel, angle));
        Ok(())
    }
}
