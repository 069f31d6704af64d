//! Landmark detector contract.

use crate::landmarks::FaceLandmarks;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("detector unavailable: {0}")]
    Unavailable(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("frame buffer too short: expected {expected} bytes, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

impl DetectorError {
    /// Whether the detector can never produce output again.
    ///
    /// Everything else is a per-frame failure that the render loop skips.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DetectorError::ModelNotFound(_) | DetectorError::Unavailable(_))
    }
}

/// Produces face landmarks for a packed RGB frame (`width * height * 3`
/// bytes, row-major, unmirrored).
pub trait LandmarkDetector: Send {
    fn detect(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<FaceLandmarks>, DetectorError>;
}

impl<D: LandmarkDetector + ?Sized> LandmarkDetector for Box<D> {
    fn detect(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<FaceLandmarks>, DetectorError> {
        (**self).detect(rgb, width, height)
    }
}

pub(crate) fn check_frame_len(rgb: &[u8], width: u32, height: u32) -> Result<(), DetectorError> {
    let expected = width as usize * height as usize * 3;
    if rgb.len() < expected || expected == 0 {
        return Err(DetectorError::InvalidFrame {
            expected,
            actual: rgb.len(),
        });
    }
    Ok(())
}
