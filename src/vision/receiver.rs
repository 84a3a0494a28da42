//! Face-observation receiver.
//!
//! Receives JSON-over-UDP frame packets from the `scripts/face_bridge.py`
//! Python helper. The socket is non-blocking and drained once per control
//! tick; when several datagrams queued up, only the newest frame matters.

use std::net::UdpSocket;

use crate::config::VisionConfig;
use crate::error::{AnimatronError, VisionError};
use crate::vision::detector::FramePacket;

/// JSON-over-UDP receiver for detector frame packets.
pub struct FrameReceiver {
    config: VisionConfig,
    socket: Option<UdpSocket>,
    /// Timestamp of the last datagram, valid or not; drives the silence watchdog
    last_packet_ms: Option<f64>,
}

impl FrameReceiver {
    /// Create a new receiver (does not bind yet).
    pub fn new(config: &VisionConfig) -> Self {
        Self {
            config: config.clone(),
            socket: None,
            last_packet_ms: None,
        }
    }

    /// Bind the UDP socket and start receiving.
    pub fn start(&mut self) -> Result<(), AnimatronError> {
        let addr = format!("{}:{}", self.config.listen_address, self.config.port);

        let socket = UdpSocket::bind(&addr)
            .map_err(|e| VisionError::Receiver(format!("Failed to bind to {}: {}", addr, e)))?;

        socket
            .set_nonblocking(true)
            .map_err(|e| VisionError::Receiver(format!("Failed to set non-blocking: {}", e)))?;

        tracing::info!("observation receiver listening on {}", addr);
        self.socket = Some(socket);

        Ok(())
    }

    /// Drain all queued datagrams and return the newest frame, if any arrived
    /// since the last poll.
    ///
    /// A datagram that fails to parse is logged and dropped; the tick then
    /// proceeds as a no-face tick rather than killing the loop. Only socket
    /// failures other than an empty queue are errors.
    pub fn poll(&mut self, now_ms: f64) -> Result<Option<FramePacket>, AnimatronError> {
        let socket = match &self.socket {
            Some(s) => s,
            None => return Ok(None),
        };

        let mut buf = [0u8; 65536];
        let mut latest: Option<FramePacket> = None;

        loop {
            match socket.recv(&mut buf) {
                Ok(size) if size > 0 => {
                    self.last_packet_ms = Some(now_ms);
                    match serde_json::from_slice::<FramePacket>(&buf[..size]) {
                        Ok(packet) => latest = Some(packet),
                        Err(e) => {
                            tracing::warn!("dropping malformed observation packet: {}", e);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    return Err(VisionError::Receiver(format!("Receive error: {}", e)).into());
                }
            }
        }

        Ok(latest)
    }

    /// Check the silence watchdog. Errors once no datagram at all has arrived
    /// for the configured window; before the first datagram the clock runs
    /// from the `started_ms` the caller passes in.
    pub fn check_silence(&self, now_ms: f64, started_ms: f64) -> Result<(), AnimatronError> {
        let since = now_ms - self.last_packet_ms.unwrap_or(started_ms);
        if since > self.config.silent_after_ms as f64 {
            return Err(VisionError::SourceSilent(since as u64).into());
        }
        Ok(())
    }

    /// Stop the receiver.
    pub fn stop(&mut self) {
        self.socket = None;
        tracing::info!("observation receiver stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::time::Duration;

    fn receiver_on_free_port() -> (FrameReceiver, UdpSocket, std::net::SocketAddr) {
        // Bind port 0 first to learn a free port, then hand it to the receiver
        let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let mut config = Config::default().vision;
        config.listen_address = "127.0.0.1".into();
        config.port = port;

        let mut receiver = FrameReceiver::new(&config);
        receiver.start().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let dest = format!("127.0.0.1:{}", port).parse().unwrap();
        (receiver, sender, dest)
    }

    fn send_and_settle(sender: &UdpSocket, dest: &std::net::SocketAddr, payload: &str) {
        sender.send_to(payload.as_bytes(), dest).unwrap();
        // Loopback delivery is fast but not instant
        std::thread::sleep(Duration::from_millis(30));
    }

    #[test]
    fn test_poll_returns_newest_frame() {
        let (mut receiver, sender, dest) = receiver_on_free_port();

        send_and_settle(
            &sender,
            &dest,
            r#"{"frame_width":640,"frame_height":480,"detections":[]}"#,
        );
        send_and_settle(
            &sender,
            &dest,
            r#"{"frame_width":640,"frame_height":480,"detections":[{"score":0.9,"xmin":0.4,"ymin":0.4,"width":0.2,"height":0.2}]}"#,
        );

        let frame = receiver.poll(0.0).unwrap().expect("no frame received");
        assert_eq!(frame.detections.len(), 1);
    }

    #[test]
    fn test_malformed_packet_is_dropped_not_fatal() {
        let (mut receiver, sender, dest) = receiver_on_free_port();

        send_and_settle(&sender, &dest, "this is not json");
        assert!(receiver.poll(0.0).unwrap().is_none());

        // The receiver still works afterwards
        send_and_settle(
            &sender,
            &dest,
            r#"{"frame_width":640,"frame_height":480,"detections":[]}"#,
        );
        assert!(receiver.poll(50.0).unwrap().is_some());
    }

    #[test]
    fn test_empty_queue_is_not_an_error() {
        let (mut receiver, _sender, _dest) = receiver_on_free_port();
        assert!(receiver.poll(0.0).unwrap().is_none());
    }

    #[test]
    fn test_silence_watchdog() {
        let (mut receiver, sender, dest) = receiver_on_free_port();

        // Default window is 10 s; any datagram (even malformed) feeds the dog
        assert!(receiver.check_silence(5_000.0, 0.0).is_ok());
        assert!(receiver.check_silence(15_000.0, 0.0).is_err());

        send_and_settle(&sender, &dest, "junk");
        receiver.poll(15_000.0).unwrap();
        assert!(receiver.check_silence(20_000.0, 0.0).is_ok());
    }
}
