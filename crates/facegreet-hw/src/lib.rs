//! facegreet-hw — V4L2 webcam capture.
//!
//! Opens a capture device, negotiates a pixel format and yields grayscale
//! frames through the [`FrameSource`] trait.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, FrameSource, FrameStream, PixelFormat};
pub use frame::{Frame, FrameError};
