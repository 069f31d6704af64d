//! shadematch-core — Lipstick color matching and lip overlay compositing.
//!
//! Ranks a product catalog by RGB distance to a detected color, keeps the
//! try-on shade list, and draws a mirrored lip polygon from face-mesh
//! landmarks. Landmarks come from an ONNX face-mesh model or any other
//! [`LandmarkDetector`].

pub mod canvas;
pub mod catalog;
pub mod classifier;
pub mod color;
pub mod compositor;
pub mod detector;
pub mod facemesh;
pub mod landmarks;
pub mod matcher;
pub mod shades;

pub use canvas::Canvas;
pub use catalog::{Catalog, Finish, Product};
pub use color::{Rgb, Rgba};
pub use compositor::{Compositor, Surface, Transform};
pub use detector::{DetectorError, LandmarkDetector};
pub use facemesh::FaceMeshDetector;
pub use landmarks::{FaceLandmarks, Point};
pub use matcher::{rank_by_similarity, ColorDistance, DEFAULT_TOP_N};
pub use shades::{Shade, ShadeBook, ShadeCategory, ToneCategory};
