//! Face-mesh landmark sets and the outer lip contour.

use serde::{Deserialize, Serialize};

/// Number of points in a face-mesh landmark set.
pub const FACE_MESH_POINTS: usize = 468;

/// Upper outer lip, left mouth corner to right mouth corner.
pub const LIPS_UPPER_OUTER: [usize; 11] = [61, 185, 40, 39, 37, 0, 267, 269, 270, 409, 291];

/// Lower outer lip, left side to right mouth corner.
pub const LIPS_LOWER_OUTER: [usize; 10] = [146, 91, 181, 84, 17, 314, 405, 321, 375, 291];

/// Outer lip boundary as one closed path: the upper contour, then the lower
/// contour walked backwards so the polygon never crosses itself.
pub const LIPS_OUTER_CONTOUR: [usize; 21] = {
    let mut out = [0usize; 21];
    let mut i = 0;
    while i < LIPS_UPPER_OUTER.len() {
        out[i] = LIPS_UPPER_OUTER[i];
        i += 1;
    }
    let mut j = 0;
    while j < LIPS_LOWER_OUTER.len() {
        out[i + j] = LIPS_LOWER_OUTER[LIPS_LOWER_OUTER.len() - 1 - j];
        j += 1;
    }
    out
};

/// A 2D point in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Landmarks for one detected face in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub points: Vec<Point>,
    /// Detector confidence that a face is present.
    pub score: f32,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point>, score: f32) -> Self {
        Self { points, score }
    }

    /// Resolve `indices` against this face.
    ///
    /// A missing first point yields an empty path; later missing points are
    /// skipped.
    pub fn path(&self, indices: &[usize]) -> Vec<Point> {
        let Some(&first) = indices.first() else {
            return Vec::new();
        };
        if first >= self.points.len() {
            return Vec::new();
        }
        indices
            .iter()
            .filter_map(|&i| self.points.get(i).copied())
            .collect()
    }

    pub fn lip_contour(&self) -> Vec<Point> {
        self.path(&LIPS_OUTER_CONTOUR)
    }
}
