//! shadematch-hw — Hardware abstraction for live try-on video.
//!
//! Provides V4L2-based camera capture into RGB frames, a still-image
//! source, and the [`VideoSource`] trait the overlay session consumes.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
pub use source::{StillSource, VideoSource};
