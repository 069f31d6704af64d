//! Upload-driven shade matching and recommendations.

use crate::config::Config;
use serde::Serialize;
use shadematch_core::classifier::{
    ColorClassifier, ColorDetection, ImageData, ProductMatch, ProductMatcher, RecommendationResponse,
    ShadeRecommender, TaggedProduct,
};
use shadematch_core::matcher::rank_by_similarity;
use shadematch_core::{Catalog, Product, Rgb};
use thiserror::Error;

pub const NO_IMAGE: &str = "No image provided.";
pub const INVALID_TYPE: &str = "Invalid file type. Please upload an image.";
pub const NO_COLOR: &str = "Could not detect a color in the image. Please try a clearer picture.";
pub const NO_MATCH: &str = "Could not find a matching lipstick. Please try another shade.";
pub const UNEXPECTED: &str = "An unexpected error occurred. Please try again later.";

/// Failures reported back to the uploader. `Display` is the user-facing
/// message; internal causes only reach the log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("No image provided.")]
    NoImage,
    #[error("Please upload an image smaller than {}.", size_label(.limit))]
    TooLarge { size: usize, limit: usize },
    #[error("Invalid file type. Please upload an image.")]
    InvalidType,
    /// The classifier's own explanation, or the generic no-color message.
    #[error("{0}")]
    NoColor(String),
    #[error("Could not find a matching lipstick. Please try another shade.")]
    NoMatch,
    #[error("{0}")]
    NoRecommendations(String),
    #[error("An unexpected error occurred. Please try again later.")]
    Unexpected,
}

/// A user-supplied image.
#[derive(Debug, Clone)]
pub struct Upload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(flatten)]
    pub product: Product,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShadeMatch {
    pub detected_color: Rgb,
    #[serde(rename = "match")]
    pub product: ProductMatch,
    pub candidates: Vec<Candidate>,
}

/// Color detection, catalog ranking and product matching over one catalog.
pub struct ShadeMatchService<C, M> {
    classifier: C,
    matcher: M,
    catalog: Catalog,
    top_n: usize,
    max_upload_bytes: usize,
}

impl<C: ColorClassifier, M: ProductMatcher> ShadeMatchService<C, M> {
    pub fn new(classifier: C, matcher: M, catalog: Catalog, config: &Config) -> Self {
        Self {
            classifier,
            matcher,
            catalog,
            top_n: config.top_n,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Detect the lipstick color in `upload` and find the closest product.
    pub async fn match_upload(&self, upload: Option<&Upload>) -> Result<ShadeMatch, ServiceError> {
        let image = self.validate(upload)?;

        let detection = self
            .classifier
            .detect_color(&image)
            .await
            .and_then(|r| r.into_detection())
            .map_err(|e| {
                tracing::error!(error = %e, "color detection failed");
                ServiceError::Unexpected
            })?;
        let color = match detection {
            ColorDetection::Detected(color) => color,
            ColorDetection::Rejected(message) => {
                tracing::info!(%message, "no color detected");
                let message = if message.trim().is_empty() { NO_COLOR.to_string() } else { message };
                return Err(ServiceError::NoColor(message));
            }
        };

        let hex = color.to_hex();
        let ranked = rank_by_similarity(&hex, self.catalog.products(), self.top_n);
        let candidates: Vec<Candidate> = ranked
            .iter()
            .map(|r| Candidate {
                product: r.product.clone(),
                distance: r.distance,
            })
            .collect();
        let shortlist: Vec<Product> = candidates.iter().map(|c| c.product.clone()).collect();

        let product = self
            .matcher
            .match_product(&hex, &shortlist)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "product matching failed");
                ServiceError::Unexpected
            })?
            .filter(|m| !m.brand.is_empty())
            .ok_or(ServiceError::NoMatch)?;

        tracing::info!(color = %hex, brand = %product.brand, product = %product.product_name, "shade matched");
        Ok(ShadeMatch {
            detected_color: color,
            product,
            candidates,
        })
    }

    /// Ask `recommender` for up to three shades suiting the face in `upload`.
    pub async fn recommend<R: ShadeRecommender>(
        &self,
        recommender: &R,
        upload: Option<&Upload>,
    ) -> Result<RecommendationResponse, ServiceError> {
        let image = self.validate(upload)?;
        let tagged = TaggedProduct::tag_all(self.catalog.products());
        let response = recommender.recommend(&image, &tagged).await.map_err(|e| {
            tracing::error!(error = %e, "recommendation failed");
            ServiceError::Unexpected
        })?;

        if let Some(message) = response.error {
            return Err(ServiceError::NoRecommendations(message));
        }
        if response.recommendations.is_empty() {
            return Err(ServiceError::NoRecommendations(
                "Couldn't find recommendations. Try a photo with different lighting.".to_string(),
            ));
        }
        Ok(response)
    }

    fn validate(&self, upload: Option<&Upload>) -> Result<ImageData, ServiceError> {
        let upload = upload.filter(|u| !u.bytes.is_empty()).ok_or(ServiceError::NoImage)?;

        if upload.bytes.len() > self.max_upload_bytes {
            return Err(ServiceError::TooLarge {
                size: upload.bytes.len(),
                limit: self.max_upload_bytes,
            });
        }
        if !upload.mime_type.starts_with("image/") {
            return Err(ServiceError::InvalidType);
        }
        if let Err(e) = image::guess_format(&upload.bytes) {
            tracing::debug!(mime = %upload.mime_type, error = %e, "upload is not a recognizable image");
            return Err(ServiceError::InvalidType);
        }

        Ok(ImageData {
            mime_type: upload.mime_type.clone(),
            bytes: upload.bytes.clone(),
        })
    }
}

/// Upload limit as shown to users: whole MB rounded up, KB below 1 MiB.
fn size_label(bytes: &usize) -> String {
    let bytes = *bytes;
    const KIB: usize = 1024;
    const MIB: usize = 1024 * KIB;
    if bytes >= MIB {
        format!("{}MB", bytes.div_ceil(MIB))
    } else {
        format!("{}KB", bytes.div_ceil(KIB).max(1))
    }
}
