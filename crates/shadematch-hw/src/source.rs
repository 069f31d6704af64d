//! Video sources feeding the live overlay.

use crate::camera::CameraError;
use crate::frame::Frame;

/// A stream of color frames owned by exactly one session.
pub trait VideoSource: Send {
    /// Native frame size, once the stream has produced a usable frame.
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// The current frame. `Ok(None)` means no decodable frame is available
    /// yet, which is not an error.
    fn grab(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Release the underlying hardware. Must be safe to call more than once.
    fn stop(&mut self);
}

impl<V: VideoSource + ?Sized> VideoSource for Box<V> {
    fn dimensions(&self) -> Option<(u32, u32)> {
        (**self).dimensions()
    }

    fn grab(&mut self) -> Result<Option<Frame>, CameraError> {
        (**self).grab()
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

/// Replays one still image as an endless stream.
pub struct StillSource {
    frame: Option<Frame>,
    sequence: u32,
}

impl StillSource {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame: Some(frame),
            sequence: 0,
        }
    }

    /// Decode an image file into a still source.
    pub fn open(path: &std::path::Path) -> Result<Self, CameraError> {
        let image = image::open(path)
            .map_err(|e| CameraError::DeviceNotFound(format!("{}: {e}", path.display())))?
            .to_rgb8();
        tracing::info!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "opened still image source"
        );
        Ok(Self::new(Frame::from_image(&image, 0)))
    }
}

impl VideoSource for StillSource {
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.frame.as_ref().map(|f| (f.width, f.height))
    }

    fn grab(&mut self) -> Result<Option<Frame>, CameraError> {
        let frame = self.frame.as_ref().ok_or(CameraError::Released)?;
        self.sequence = self.sequence.wrapping_add(1);
        let mut next = frame.clone();
        next.sequence = self.sequence;
        next.timestamp = std::time::Instant::now();
        Ok(Some(next))
    }

    fn stop(&mut self) {
        self.frame = None;
    }
}
