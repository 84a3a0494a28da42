//! Face observation source: wire types, UDP receiver, detector subprocess.

pub mod detector;
pub mod receiver;
pub mod subprocess;

pub use detector::{FaceObservation, FramePacket};
pub use receiver::FrameReceiver;
pub use subprocess::BridgeSubprocess;
