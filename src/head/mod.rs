//! Head control: axes, PID pipeline, tracking regions, blink.

pub mod axis;
pub mod blink;
pub mod controller;
pub mod filter;
pub mod gaze;
pub mod pid;
pub mod region;

pub use controller::HeadController;
pub use region::Phase;
