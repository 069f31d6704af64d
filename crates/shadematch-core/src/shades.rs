//! Try-on shade swatches and the recommended-shade set.

use crate::color::{ColorError, Rgb};
use serde::{Deserialize, Serialize};

/// Swatch grouping shown in the try-on picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShadeCategory {
    Reds,
    Pinks,
    Nudes,
    Recommended,
}

/// Tone tag returned by the recommendation classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToneCategory {
    Red,
    Pink,
    Nude,
}

impl ToneCategory {
    pub const ALL: [ToneCategory; 3] = [ToneCategory::Red, ToneCategory::Pink, ToneCategory::Nude];

    /// Best-effort tone guess from a product name.
    ///
    /// Substring heuristic only; names that hit several families resolve in
    /// the order Nude, Pink, Red.
    pub fn guess(product_name: &str) -> Option<ToneCategory> {
        const NUDE: &[&str] = &["nude", "taupe", "beige", "peach", "pillow talk", "honey"];
        const PINK: &[&str] = &["pink", "rose", "mauve", "berry", "blush", "fuchsia"];
        const RED: &[&str] = &["red", "rouge", "ruby", "cherry", "crimson", "scarlet", "999"];

        let name = product_name.to_lowercase();
        let hit = |words: &[&str]| words.iter().any(|w| name.contains(w));
        if hit(NUDE) {
            Some(ToneCategory::Nude)
        } else if hit(PINK) {
            Some(ToneCategory::Pink)
        } else if hit(RED) {
            Some(ToneCategory::Red)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shade {
    pub name: String,
    pub color: Rgb,
    pub category: ShadeCategory,
}

impl Shade {
    fn fixed(name: &str, color: Rgb, category: ShadeCategory) -> Self {
        Self {
            name: name.to_string(),
            color,
            category,
        }
    }
}

/// The twelve swatches available before any recommendation.
pub fn static_shades() -> Vec<Shade> {
    use ShadeCategory::*;
    vec![
        Shade::fixed("Classic Red", Rgb::new(0xC0, 0x1A, 0x29), Reds),
        Shade::fixed("Deep Berry", Rgb::new(0x82, 0x37, 0x51), Reds),
        Shade::fixed("Cherry Bomb", Rgb::new(0x9B, 0x2C, 0x30), Reds),
        Shade::fixed("Vivid Coral", Rgb::new(0xE8, 0x6F, 0x68), Reds),
        Shade::fixed("Hot Pink", Rgb::new(0xD8, 0x3E, 0x58), Pinks),
        Shade::fixed("Dusty Rose", Rgb::new(0xC3, 0x89, 0x89), Pinks),
        Shade::fixed("Soft Mauve", Rgb::new(0xB8, 0x7E, 0x81), Pinks),
        Shade::fixed("Baby Pink", Rgb::new(0xE4, 0xB4, 0xB9), Pinks),
        Shade::fixed("Pillow Talk", Rgb::new(0xAB, 0x78, 0x6E), Nudes),
        Shade::fixed("Warm Nude", Rgb::new(0xC9, 0x9A, 0x8E), Nudes),
        Shade::fixed("Cool Taupe", Rgb::new(0xA0, 0x6B, 0x62), Nudes),
        Shade::fixed("Peachy Nude", Rgb::new(0xD7, 0x90, 0x7C), Nudes),
    ]
}

/// One entry of a recommendation classifier response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedShade {
    pub category: ToneCategory,
    pub hex_color: String,
    pub product_name: String,
    pub brand: String,
}

impl RecommendedShade {
    pub fn to_shade(&self) -> Result<Shade, ColorError> {
        Ok(Shade {
            name: format!("{} - {}", self.brand, self.product_name),
            color: Rgb::parse_hex(&self.hex_color)?,
            category: ShadeCategory::Recommended,
        })
    }
}

/// Keep at most one usable shade per tone, in Red, Pink, Nude order.
///
/// Entries with unparseable colors are dropped; a tone with no usable
/// entry is simply missing from the result.
pub fn select_recommendations(entries: &[RecommendedShade]) -> Vec<Shade> {
    ToneCategory::ALL
        .iter()
        .filter_map(|&tone| {
            entries
                .iter()
                .filter(|e| e.category == tone)
                .find_map(|e| match e.to_shade() {
                    Ok(shade) => Some(shade),
                    Err(err) => {
                        tracing::warn!(?tone, hex = %e.hex_color, error = %err, "dropping recommendation");
                        None
                    }
                })
        })
        .collect()
}

/// The shade list of a try-on session.
///
/// Static swatches never change; the Recommended category is only ever
/// swapped as a whole.
#[derive(Debug, Clone)]
pub struct ShadeBook {
    shades: Vec<Shade>,
}

impl Default for ShadeBook {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadeBook {
    pub fn new() -> Self {
        Self {
            shades: static_shades(),
        }
    }

    pub fn shades(&self) -> &[Shade] {
        &self.shades
    }

    pub fn by_category(&self, category: ShadeCategory) -> impl Iterator<Item = &Shade> {
        self.shades.iter().filter(move |s| s.category == category)
    }

    pub fn find(&self, name: &str) -> Option<&Shade> {
        self.shades.iter().find(|s| s.name == name)
    }

    pub fn has_recommended(&self) -> bool {
        self.by_category(ShadeCategory::Recommended).next().is_some()
    }

    /// The shade selected when a session starts.
    pub fn default_shade(&self) -> Shade {
        self.shades
            .iter()
            .find(|s| s.category != ShadeCategory::Recommended)
            .cloned()
            .unwrap_or_else(|| Shade::fixed("Classic Red", Rgb::new(0xC0, 0x1A, 0x29), ShadeCategory::Reds))
    }

    /// Drop every Recommended shade and put `fresh` in front.
    ///
    /// Entries of `fresh` are forced into the Recommended category.
    pub fn replace_recommended(&mut self, fresh: Vec<Shade>) {
        let mut next: Vec<Shade> = fresh
            .into_iter()
            .map(|mut s| {
                s.category = ShadeCategory::Recommended;
                s
            })
            .collect();
        next.extend(
            self.shades
                .drain(..)
                .filter(|s| s.category != ShadeCategory::Recommended),
        );
        self.shades = next;
    }
}
