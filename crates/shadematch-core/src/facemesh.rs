//! Face-mesh landmark detector via ONNX Runtime.
//!
//! Runs a single-face 468-point face-mesh model on the whole frame,
//! letterboxed to the model's square input. Works best on selfie framing
//! where the face fills most of the picture.

use crate::detector::{check_frame_len, DetectorError, LandmarkDetector};
use crate::landmarks::{FaceLandmarks, Point, FACE_MESH_POINTS};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

const FACEMESH_INPUT_SIZE: usize = 192;
const FACEMESH_MEAN: f32 = 127.5;
const FACEMESH_STD: f32 = 127.5;
const FACEMESH_VALUES_PER_POINT: usize = 3;
const FACEMESH_LANDMARK_VALUES: usize = FACE_MESH_POINTS * FACEMESH_VALUES_PER_POINT;

/// Letterbox placement of the frame inside the model input.
#[derive(Debug, Clone, Copy)]
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl LetterboxInfo {
    fn fit(width: usize, height: usize, target: usize) -> (Self, usize, usize) {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = ((width as f32 * scale).round() as usize).clamp(1, target);
        let new_h = ((height as f32 * scale).round() as usize).clamp(1, target);
        let info = Self {
            scale,
            pad_x: (target - new_w) as f32 / 2.0,
            pad_y: (target - new_h) as f32 / 2.0,
        };
        (info, new_w, new_h)
    }

    fn to_frame(self, x: f32, y: f32) -> Point {
        Point::new((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Face-mesh detector backed by an ONNX session.
pub struct FaceMeshDetector {
    session: Session,
    score_threshold: f32,
}

impl FaceMeshDetector {
    /// Load the face-mesh ONNX model. The model must take a
    /// `1x3x192x192` float input normalized to `[-1, 1]`.
    pub fn load(model_path: &str, score_threshold: f32) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| i.name().to_string()).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name().to_string()).collect::<Vec<_>>(),
            "loaded face-mesh model"
        );

        if session.outputs().is_empty() {
            return Err(DetectorError::Unavailable(format!(
                "{model_path}: model has no outputs"
            )));
        }

        Ok(Self {
            session,
            score_threshold,
        })
    }

    fn preprocess(&self, rgb: &[u8], width: u32, height: u32) -> Result<(Array4<f32>, LetterboxInfo), DetectorError> {
        let size = FACEMESH_INPUT_SIZE;
        let (letterbox, new_w, new_h) = LetterboxInfo::fit(width as usize, height as usize, size);

        let frame = RgbImage::from_raw(width, height, rgb[..width as usize * height as usize * 3].to_vec())
            .ok_or_else(|| DetectorError::InferenceFailed("frame does not fit its dimensions".into()))?;
        let resized = imageops::resize(&frame, new_w as u32, new_h as u32, FilterType::Triangle);

        let pad_x = letterbox.pad_x.floor() as usize;
        let pad_y = letterbox.pad_y.floor() as usize;

        // Padding stays 0.0, which is FACEMESH_MEAN after normalization.
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, px) in resized.enumerate_pixels() {
            let (tx, ty) = (x as usize + pad_x, y as usize + pad_y);
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = (f32::from(px[c]) - FACEMESH_MEAN) / FACEMESH_STD;
            }
        }

        Ok((tensor, letterbox))
    }
}

impl LandmarkDetector for FaceMeshDetector {
    fn detect(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<FaceLandmarks>, DetectorError> {
        check_frame_len(rgb, width, height)?;
        let (input, letterbox) = self.preprocess(rgb, width, height)?;
        let output_count = self.session.outputs().len();

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut lengths = Vec::with_capacity(output_count);
        for i in 0..output_count {
            let (_, data) = outputs[i]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("output {i}: {e}")))?;
            lengths.push(data.len());
        }

        let (landmark_idx, score_idx) = classify_outputs(&lengths).ok_or_else(|| {
            DetectorError::Unavailable(format!("no output with {FACEMESH_LANDMARK_VALUES} landmark values: {lengths:?}"))
        })?;

        let score = match score_idx {
            Some(i) => {
                let (_, data) = outputs[i]
                    .try_extract_tensor::<f32>()
                    .map_err(|e| DetectorError::InferenceFailed(format!("score: {e}")))?;
                sigmoid(data[0])
            }
            None => 1.0,
        };
        if score < self.score_threshold {
            tracing::trace!(score, "no face in frame");
            return Ok(Vec::new());
        }

        let (_, raw) = outputs[landmark_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("landmarks: {e}")))?;

        Ok(vec![FaceLandmarks::new(decode_landmarks(raw, letterbox), score)])
    }
}

/// Pick the landmark tensor (at least 468*3 values) and the optional
/// single-value face-presence tensor from the output lengths.
fn classify_outputs(lengths: &[usize]) -> Option<(usize, Option<usize>)> {
    let landmarks = lengths.iter().position(|&n| n >= FACEMESH_LANDMARK_VALUES)?;
    let score = lengths.iter().position(|&n| n == 1);
    Some((landmarks, score))
}

fn decode_landmarks(raw: &[f32], letterbox: LetterboxInfo) -> Vec<Point> {
    raw.chunks_exact(FACEMESH_VALUES_PER_POINT)
        .take(FACE_MESH_POINTS)
        .map(|v| letterbox.to_frame(v[0], v[1]))
        .collect()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_landscape_frame() {
        let (lb, new_w, new_h) = LetterboxInfo::fit(640, 480, 192);
        assert_eq!(new_w, 192);
        assert_eq!(new_h, 144);
        assert!((lb.pad_x).abs() < 1e-6);
        assert!((lb.pad_y - 24.0).abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_roundtrip() {
        let (lb, _, _) = LetterboxInfo::fit(640, 480, 192);
        let (ox, oy) = (320.0f32, 400.0f32);
        let p = lb.to_frame(ox * lb.scale + lb.pad_x, oy * lb.scale + lb.pad_y);
        assert!((p.x - ox).abs() < 0.01, "x: {}", p.x);
        assert!((p.y - oy).abs() < 0.01, "y: {}", p.y);
    }

    #[test]
    fn test_classify_outputs() {
        assert_eq!(classify_outputs(&[1404, 1]), Some((0, Some(1))));
        assert_eq!(classify_outputs(&[1, 1404]), Some((1, Some(0))));
        assert_eq!(classify_outputs(&[1404]), Some((0, None)));
        assert_eq!(classify_outputs(&[10, 1]), None);
    }

    #[test]
    fn test_decode_landmarks_maps_to_frame() {
        let (lb, _, _) = LetterboxInfo::fit(640, 480, 192);
        let mut raw = vec![0.0f32; FACEMESH_LANDMARK_VALUES];
        raw[0] = 96.0; // center x
        raw[1] = 96.0; // center y
        raw[2] = -3.0; // depth is ignored
        let points = decode_landmarks(&raw, lb);
        assert_eq!(points.len(), FACE_MESH_POINTS);
        assert!((points[0].x - 320.0).abs() < 0.01);
        assert!((points[0].y - 240.0).abs() < 0.01);
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn test_load_missing_model() {
        let err = FaceMeshDetector::load("/nonexistent/face_mesh.onnx", 0.5)
            .err()
            .expect("missing model must fail");
        assert!(matches!(err, DetectorError::ModelNotFound(_)));
        assert!(err.is_fatal());
    }
}
