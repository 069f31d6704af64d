//! Software RGBA canvas.

use crate::color::Rgba;
use crate::compositor::{Surface, Transform};
use crate::landmarks::Point;
use image::RgbaImage;

/// CPU raster surface backed by an [`RgbaImage`].
///
/// Polygons are filled with the even-odd rule, sampling at pixel centers,
/// and blended source-over onto the existing pixels.
#[derive(Debug, Clone)]
pub struct Canvas {
    image: RgbaImage,
    transform: Transform,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            transform: Transform::identity(),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    fn blend(&mut self, x: u32, y: u32, color: Rgba) {
        let dst = self.image.get_pixel_mut(x, y);
        let sa = color.a;
        let da = f32::from(dst[3]) / 255.0;
        let out_a = sa + da * (1.0 - sa);
        if out_a <= 0.0 {
            return;
        }
        let mix = |s: u8, d: u8| {
            let v = (f32::from(s) * sa + f32::from(d) * da * (1.0 - sa)) / out_a;
            v.round().clamp(0.0, 255.0) as u8
        };
        dst[0] = mix(color.r, dst[0]);
        dst[1] = mix(color.g, dst[1]);
        dst[2] = mix(color.b, dst[2]);
        dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}

impl Surface for Canvas {
    fn width(&self) -> u32 {
        self.image.width()
    }

    fn height(&self) -> u32 {
        self.image.height()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
    }

    fn clear(&mut self) {
        for px in self.image.pixels_mut() {
            px.0 = [0, 0, 0, 0];
        }
    }

    fn transform(&self) -> Transform {
        self.transform
    }

    fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    fn fill_polygon(&mut self, points: &[Point], color: Rgba) {
        if points.len() < 3 || color.a <= 0.0 {
            return;
        }
        let (w, h) = (self.width(), self.height());
        if w == 0 || h == 0 {
            return;
        }

        let device: Vec<Point> = points.iter().map(|&p| self.transform.apply(p)).collect();
        let min_y = device.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
        let max_y = device.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);
        let y0 = (min_y - 0.5).ceil().max(0.0) as u32;
        let y1 = ((max_y - 0.5).floor().min(h as f32 - 1.0)).max(-1.0) as i64;

        let mut crossings: Vec<f32> = Vec::with_capacity(device.len());
        for y in y0 as i64..=y1 {
            let sy = y as f32 + 0.5;
            crossings.clear();
            for (i, a) in device.iter().enumerate() {
                let b = device[(i + 1) % device.len()];
                // Half-open rule so shared vertices count once.
                if (a.y <= sy && b.y > sy) || (b.y <= sy && a.y > sy) {
                    let t = (sy - a.y) / (b.y - a.y);
                    crossings.push(a.x + t * (b.x - a.x));
                }
            }
            crossings.sort_by(f32::total_cmp);

            for span in crossings.chunks_exact(2) {
                let x0 = (span[0] - 0.5).ceil().max(0.0);
                let x1 = (span[1] - 0.5).floor().min(w as f32 - 1.0);
                if x1 < x0 {
                    continue;
                }
                for x in x0 as u32..=x1 as u32 {
                    self.blend(x, y as u32, color);
                }
            }
        }
    }
}
