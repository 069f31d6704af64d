//! Lip overlay compositing onto a drawing surface.
//!
//! Detection runs on the raw camera frame while the video is shown
//! mirrored, so every face is drawn under a horizontal mirror transform.

use crate::color::{Rgb, Rgba};
use crate::landmarks::{FaceLandmarks, Point, LIPS_OUTER_CONTOUR};

/// Fill opacity of the lip overlay.
pub const OVERLAY_OPACITY: f32 = 0.6;

/// 2D affine transform:
/// ```text
/// | a  c  e |
/// | b  d  f |
/// ```
/// Builder methods post-multiply, so `identity().scale(..).translate(..)`
/// applies the translation to a point first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub const fn identity() -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 }
    }

    /// `self * other`.
    pub fn then(self, o: Transform) -> Self {
        Self {
            a: self.a * o.a + self.c * o.b,
            b: self.b * o.a + self.d * o.b,
            c: self.a * o.c + self.c * o.d,
            d: self.b * o.c + self.d * o.d,
            e: self.a * o.e + self.c * o.f + self.e,
            f: self.b * o.e + self.d * o.f + self.f,
        }
    }

    pub fn scale(self, sx: f32, sy: f32) -> Self {
        self.then(Self { a: sx, d: sy, ..Self::identity() })
    }

    pub fn translate(self, tx: f32, ty: f32) -> Self {
        self.then(Self { e: tx, f: ty, ..Self::identity() })
    }

    /// Flip about the vertical center line of a surface `width` wide.
    pub fn mirror_horizontal(width: f32) -> Self {
        Self::identity().scale(-1.0, 1.0).translate(-width, 0.0)
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x + self.c * p.y + self.e,
            self.b * p.x + self.d * p.y + self.f,
        )
    }
}

/// A 2D drawing target sized in device pixels.
pub trait Surface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Resize and clear.
    fn resize(&mut self, width: u32, height: u32);
    /// Make every pixel fully transparent. Ignores the transform.
    fn clear(&mut self);
    fn transform(&self) -> Transform;
    fn set_transform(&mut self, transform: Transform);
    /// Fill the closed polygon `points` (user space) with `color`.
    fn fill_polygon(&mut self, points: &[Point], color: Rgba);
}

/// Draws the lip overlay for one frame.
#[derive(Debug, Clone)]
pub struct Compositor {
    opacity: f32,
}

impl Default for Compositor {
    fn default() -> Self {
        Self { opacity: OVERLAY_OPACITY }
    }
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grow or shrink `surface` to match the frame. Returns true when it
    /// changed.
    pub fn fit_surface<S: Surface + ?Sized>(&self, surface: &mut S, width: u32, height: u32) -> bool {
        if surface.width() == width && surface.height() == height {
            return false;
        }
        tracing::debug!(width, height, "resizing overlay surface");
        surface.resize(width, height);
        true
    }

    /// Clear `surface` and fill one mirrored lip polygon per face.
    ///
    /// Returns the number of polygons drawn.
    pub fn compose<S: Surface + ?Sized>(&self, surface: &mut S, faces: &[FaceLandmarks], shade: Rgb) -> usize {
        surface.clear();

        let saved = surface.transform();
        surface.set_transform(saved.then(Transform::mirror_horizontal(surface.width() as f32)));

        let fill = shade.with_alpha(self.opacity);
        let mut drawn = 0;
        for face in faces {
            let contour = face.path(&LIPS_OUTER_CONTOUR);
            if contour.len() < 3 {
                continue;
            }
            surface.fill_polygon(&contour, fill);
            drawn += 1;
        }

        surface.set_transform(saved);
        drawn
    }
}
