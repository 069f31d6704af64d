//! Contracts of the external AI classifiers.
//!
//! The classifiers are opaque request/response services. This module fixes
//! their wire shapes (camelCase JSON) and the validation applied to what
//! they return; transport is up to the implementor.

use crate::catalog::{Finish, Product};
use crate::color::Rgb;
use crate::shades::{RecommendedShade, ToneCategory};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClassifierError {
    /// The service answered, but the answer breaks the contract.
    #[error("malformed classifier response: {0}")]
    MalformedResponse(String),
    #[error("classifier transport failed: {0}")]
    Transport(String),
    #[error("invalid classifier JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// An encoded still image handed to a classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// `{hexColor}` or `{error}`; exactly one of the two is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorDetectionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A validated color detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorDetection {
    Detected(Rgb),
    /// The classifier looked and reported why it found nothing usable.
    Rejected(String),
}

impl ColorDetectionResponse {
    pub fn detected(hex: impl Into<String>) -> Self {
        Self { hex_color: Some(hex.into()), error: None }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self { hex_color: None, error: Some(message.into()) }
    }

    pub fn into_detection(self) -> Result<ColorDetection, ClassifierError> {
        match (self.hex_color, self.error) {
            (Some(hex), None) => Rgb::parse_hex(&hex)
                .map(ColorDetection::Detected)
                .map_err(|e| ClassifierError::MalformedResponse(format!("hexColor: {e}"))),
            (None, Some(message)) => Ok(ColorDetection::Rejected(message)),
            (Some(_), Some(_)) => Err(ClassifierError::MalformedResponse(
                "both hexColor and error are set".into(),
            )),
            (None, None) => Err(ClassifierError::MalformedResponse(
                "neither hexColor nor error is set".into(),
            )),
        }
    }
}

/// The product a matcher settled on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMatch {
    pub brand: String,
    pub product_name: String,
    pub finish: String,
    pub buy_link: String,
}

impl From<&Product> for ProductMatch {
    fn from(p: &Product) -> Self {
        let finish = match p.finish {
            Finish::Matte => "Matte",
            Finish::Satin => "Satin",
            Finish::Glossy => "Glossy",
            Finish::Creme => "Creme",
            Finish::Liquid => "Liquid",
        };
        Self {
            brand: p.brand.clone(),
            product_name: p.product_name.clone(),
            finish: finish.to_string(),
            buy_link: p.buy_link.clone(),
        }
    }
}

/// Catalog entry as sent to the recommender, pre-tagged with a tone guess.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedProduct {
    #[serde(flatten)]
    pub product: Product,
    pub tone: Option<ToneCategory>,
}

impl TaggedProduct {
    pub fn tag_all(products: &[Product]) -> Vec<TaggedProduct> {
        products
            .iter()
            .map(|p| TaggedProduct {
                tone: ToneCategory::guess(&p.product_name),
                product: p.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    #[serde(default)]
    pub recommendations: Vec<RecommendedShade>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Detects the dominant lipstick color in a photo.
pub trait ColorClassifier: Send + Sync {
    fn detect_color(
        &self,
        image: &ImageData,
    ) -> impl Future<Output = Result<ColorDetectionResponse, ClassifierError>> + Send;
}

/// Chooses the best product for a color among pre-ranked candidates.
pub trait ProductMatcher: Send + Sync {
    fn match_product(
        &self,
        hex_color: &str,
        candidates: &[Product],
    ) -> impl Future<Output = Result<Option<ProductMatch>, ClassifierError>> + Send;
}

/// Recommends up to three shades (one per tone) for a face photo.
pub trait ShadeRecommender: Send + Sync {
    fn recommend(
        &self,
        image: &ImageData,
        catalog: &[TaggedProduct],
    ) -> impl Future<Output = Result<RecommendationResponse, ClassifierError>> + Send;
}

/// Offline matcher: trusts the color ranking and takes the top candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestCandidate;

impl ProductMatcher for NearestCandidate {
    async fn match_product(
        &self,
        _hex_color: &str,
        candidates: &[Product],
    ) -> Result<Option<ProductMatch>, ClassifierError> {
        Ok(candidates.first().map(ProductMatch::from))
    }
}
