//! Lipstick product catalog.
//!
//! The built-in catalog is embedded at compile time from
//! `data/catalog.json`. A replacement catalog with the same JSON shape can
//! be loaded at startup; either way the catalog is read-only once built.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

const BUILTIN_CATALOG: &str = include_str!("../data/catalog.json");

static BUILTIN: OnceLock<Catalog> = OnceLock::new();

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate product id {0}")]
    DuplicateId(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Finish {
    Matte,
    Satin,
    Glossy,
    Creme,
    Liquid,
}

/// A catalog entry. The reference color is kept as the raw hex string so
/// that a malformed entry degrades to "never matches" instead of failing
/// the load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: u32,
    pub brand: String,
    pub product_name: String,
    pub hex: String,
    pub finish: Finish,
    pub buy_link: String,
}

/// Immutable product list with unique ids, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    pub fn new(products: Vec<Product>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(products.len());
        for p in &products {
            if !seen.insert(p.id) {
                return Err(CatalogError::DuplicateId(p.id));
            }
        }
        Ok(Self { products })
    }

    pub fn from_json(src: &str) -> Result<Self, CatalogError> {
        Self::new(serde_json::from_str(src)?)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let src = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_json(&src)?;
        tracing::info!(path = %path.display(), products = catalog.len(), "loaded catalog");
        Ok(catalog)
    }

    /// The embedded catalog.
    pub fn builtin() -> &'static Catalog {
        BUILTIN.get_or_init(|| match Catalog::from_json(BUILTIN_CATALOG) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "embedded catalog is invalid");
                Catalog::default()
            }
        })
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn get(&self, id: u32) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
