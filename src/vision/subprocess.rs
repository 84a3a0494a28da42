//! Detector bridge subprocess manager.
//!
//! Launches `scripts/face_bridge.py` as a child process with automatic
//! cleanup on drop. The bridge owns the camera and the detector model and
//! streams frame packets back over UDP.

use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use crate::config::VisionConfig;
use crate::error::{AnimatronError, VisionError};

/// Manages the Python detector bridge subprocess.
pub struct BridgeSubprocess {
    child: Option<Child>,
    config: VisionConfig,
}

impl BridgeSubprocess {
    /// Create a new subprocess manager (does not start the process).
    pub fn new(config: &VisionConfig) -> Self {
        Self {
            child: None,
            config: config.clone(),
        }
    }

    /// Launch the bridge subprocess.
    ///
    /// Runs: `python3 <bridge_script> --ip <listen_address> --port <port>
    ///        --capture <camera_device> --width <capture_width>
    ///        --height <capture_height> --fps <capture_fps>
    ///        --confidence <min_confidence>`
    pub fn start(&mut self) -> Result<(), AnimatronError> {
        if self.is_running() {
            return Ok(());
        }

        let mut child = Command::new("python3")
            .arg(&self.config.bridge_script)
            .args(["--ip", &self.config.listen_address])
            .args(["--port", &self.config.port.to_string()])
            .args(["--capture", &self.config.camera_device.to_string()])
            .args(["--width", &self.config.capture_width.to_string()])
            .args(["--height", &self.config.capture_height.to_string()])
            .args(["--fps", &self.config.capture_fps.to_string()])
            .args(["--confidence", &self.config.min_confidence.to_string()])
            .kill_on_drop(true)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| {
                VisionError::Subprocess(format!(
                    "Failed to launch detector bridge at '{}': {}",
                    self.config.bridge_script, e
                ))
            })?;

        // MediaPipe logs heavily to stderr; if the pipe is never read the
        // child eventually blocks on a full pipe buffer and stops sending
        // frames while still counting as alive. Drain it continuously.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(stderr));
        }

        tracing::info!(
            "detector bridge started (pid: {:?}, camera: {}, port: {})",
            child.id(),
            self.config.camera_device,
            self.config.port,
        );

        self.child = Some(child);
        Ok(())
    }

    /// Check if the subprocess is still running (non-blocking).
    pub fn is_running(&mut self) -> bool {
        match &mut self.child {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    tracing::warn!("detector bridge exited with: {}", status);
                    self.child = None;
                    false
                }
                Err(e) => {
                    tracing::error!("Failed to check detector bridge status: {}", e);
                    false
                }
            },
            None => false,
        }
    }

    /// Stop the subprocess by killing it.
    pub async fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            tracing::info!("stopping detector bridge (pid: {:?})", child.id());
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
    }
}

async fn drain_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "face_bridge", "{}", line);
    }
}

/// Schedules a delayed subprocess restart without blocking the caller.
///
/// The control loop polls this once per tick; the delay elapses on the loop's
/// clock, so shutdown signals and the silence watchdog stay responsive while
/// a restart is pending.
pub struct RestartGate {
    delay: Duration,
    due_at: Option<Instant>,
}

impl RestartGate {
    pub fn new(delay_secs: u64) -> Self {
        Self {
            delay: Duration::from_secs(delay_secs),
            due_at: None,
        }
    }

    /// Report the subprocess state; returns true exactly once per outage,
    /// when the restart delay has elapsed.
    pub fn poll(&mut self, running: bool, now: Instant) -> bool {
        if running {
            self.due_at = None;
            return false;
        }
        match self.due_at {
            None => {
                self.due_at = Some(now + self.delay);
                false
            }
            Some(due) if now >= due => {
                self.due_at = None;
                true
            }
            Some(_) => false,
        }
    }
}

/// Check if the `mediapipe` Python package is available.
///
/// Runs `python3 -c "import mediapipe"` and returns true if it succeeds.
pub fn check_mediapipe_available() -> bool {
    match std::process::Command::new("python3")
        .args(["-c", "import mediapipe"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_gate_waits_out_the_delay() {
        let mut gate = RestartGate::new(3);
        let t0 = Instant::now();

        assert!(!gate.poll(false, t0)); // outage arms the gate
        assert!(!gate.poll(false, t0 + Duration::from_secs(1)));
        assert!(gate.poll(false, t0 + Duration::from_secs(3)));
        // Fires once per outage, then re-arms
        assert!(!gate.poll(false, t0 + Duration::from_secs(3)));
    }

    #[test]
    fn test_restart_gate_disarms_when_process_recovers() {
        let mut gate = RestartGate::new(3);
        let t0 = Instant::now();

        assert!(!gate.poll(false, t0));
        assert!(!gate.poll(true, t0 + Duration::from_secs(1)));

        // A later outage starts a fresh delay from its own first poll
        assert!(!gate.poll(false, t0 + Duration::from_secs(10)));
        assert!(!gate.poll(false, t0 + Duration::from_secs(12)));
        assert!(gate.poll(false, t0 + Duration::from_secs(13)));
    }

    #[test]
    fn test_restart_gate_never_fires_while_running() {
        let mut gate = RestartGate::new(0);
        let t0 = Instant::now();
        for i in 0..10 {
            assert!(!gate.poll(true, t0 + Duration::from_secs(i)));
        }
    }

    /// A bridge that floods stderr must still run to completion; a full,
    /// undrained pipe would block it inside write() with the child counting
    /// as alive but sending no frames.
    #[tokio::test]
    async fn test_chatty_bridge_stderr_does_not_wedge_child() {
        let script = std::env::temp_dir().join("animatron_test_stderr_flood.py");
        // ~260 KB of stderr, several times the usual 64 KB pipe buffer
        std::fs::write(
            &script,
            "import sys\nfor _ in range(4096):\n    sys.stderr.write('x' * 64 + '\\n')\nsys.stderr.flush()\n",
        )
        .unwrap();

        let mut config = VisionConfig::default();
        config.bridge_script = script.to_string_lossy().into_owned();

        let mut sp = BridgeSubprocess::new(&config);
        sp.start().unwrap();

        let mut exited = false;
        for _ in 0..200 {
            if !sp.is_running() {
                exited = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        let _ = std::fs::remove_file(&script);
        assert!(exited, "bridge stayed wedged on a full stderr pipe");
    }
}
