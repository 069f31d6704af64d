//! Nearest-color ranking of catalog products.

use crate::catalog::Product;
use crate::color::Rgb;

/// Number of candidates returned when the caller has no preference.
pub const DEFAULT_TOP_N: usize = 3;

/// A product paired with its distance to the query color.
#[derive(Debug, Clone, Copy)]
pub struct ColorDistance<'a> {
    pub product: &'a Product,
    pub distance: f64,
}

/// Strategy for measuring how far two colors are apart.
pub trait ColorMetric {
    fn distance(&self, a: Rgb, b: Rgb) -> f64;
}

/// Straight Euclidean distance over the three RGB channels.
pub struct EuclideanRgb;

impl ColorMetric for EuclideanRgb {
    fn distance(&self, a: Rgb, b: Rgb) -> f64 {
        a.distance(b)
    }
}

/// Rank `catalog` by Euclidean RGB distance to `target`, keeping `top_n`.
///
/// Unparseable colors (target or entry) score `+inf` rather than erroring,
/// so a malformed target leaves the catalog in its original order. An empty
/// target yields no results.
pub fn rank_by_similarity<'a>(
    target: &str,
    catalog: &'a [Product],
    top_n: usize,
) -> Vec<ColorDistance<'a>> {
    rank_with(&EuclideanRgb, target, catalog, top_n)
}

/// [`rank_by_similarity`] with an explicit metric.
pub fn rank_with<'a, M: ColorMetric + ?Sized>(
    metric: &M,
    target: &str,
    catalog: &'a [Product],
    top_n: usize,
) -> Vec<ColorDistance<'a>> {
    if target.is_empty() {
        return Vec::new();
    }

    let target = Rgb::parse_hex(target).ok();
    if target.is_none() {
        tracing::debug!("unparseable target color; ranking falls back to catalog order");
    }

    let mut ranked: Vec<ColorDistance<'a>> = catalog
        .iter()
        .map(|product| {
            let distance = match (target, Rgb::parse_hex(&product.hex)) {
                (Some(t), Ok(c)) => metric.distance(t, c),
                _ => f64::INFINITY,
            };
            ColorDistance { product, distance }
        })
        .collect();

    // `sort_by` is stable: equal distances keep catalog order.
    ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    ranked.truncate(top_n);
    ranked
}

/// The single closest product, if any.
pub fn top_match<'a>(target: &str, catalog: &'a [Product]) -> Option<ColorDistance<'a>> {
    rank_by_similarity(target, catalog, 1).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Finish};

    fn product(id: u32, hex: &str) -> Product {
        Product {
            id,
            brand: "Test".into(),
            product_name: format!("Shade {id}"),
            hex: hex.into(),
            finish: Finish::Satin,
            buy_link: String::new(),
        }
    }

    fn hexes(ranked: &[ColorDistance<'_>]) -> Vec<String> {
        ranked.iter().map(|c| c.product.hex.clone()).collect()
    }

    #[test]
    fn test_example_ranking() {
        let catalog = vec![product(1, "#FF0000"), product(2, "#00FF00"), product(3, "#FE0101")];
        let ranked = rank_by_similarity("#FF0000", &catalog, 2);
        assert_eq!(hexes(&ranked), vec!["#FF0000", "#FE0101"]);
        assert_eq!(ranked[0].distance, 0.0);
        assert!(ranked[1].distance > 0.0 && ranked[1].distance < 2.0);
    }

    #[test]
    fn test_result_length_is_min_of_top_n_and_catalog() {
        let catalog: Vec<Product> = (0..5u8)
            .map(|i| product(u32::from(i), &Rgb::new(i * 40, 10, 200).to_hex()))
            .collect();
        for n in 0..=catalog.len() {
            for top_n in 0..8 {
                let ranked = rank_by_similarity("#102030", &catalog[..n], top_n);
                assert_eq!(ranked.len(), top_n.min(n));
                assert!(ranked.windows(2).all(|w| w[0].distance <= w[1].distance));
            }
        }
    }

    #[test]
    fn test_empty_target_yields_nothing() {
        let catalog = vec![product(1, "#FF0000")];
        assert!(rank_by_similarity("", &catalog, 3).is_empty());
    }

    #[test]
    fn test_malformed_target_keeps_catalog_order() {
        let catalog = vec![product(1, "#FF0000"), product(2, "#00FF00"), product(3, "#0000FF")];
        let ranked = rank_by_similarity("notacolor", &catalog, 3);
        let ids: Vec<u32> = ranked.iter().map(|c| c.product.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(ranked.iter().all(|c| c.distance.is_infinite()));
    }

    #[test]
    fn test_malformed_entry_never_ranks_first() {
        let catalog = vec![product(1, "garbage"), product(2, "#000000")];
        let ranked = rank_by_similarity("#FFFFFF", &catalog, 2);
        assert_eq!(ranked[0].product.id, 2);
        assert!(ranked[1].distance.is_infinite());
    }

    #[test]
    fn test_ties_resolve_by_catalog_order() {
        let catalog = vec![product(1, "#101010"), product(2, "#101010"), product(3, "#101010")];
        let first = rank_by_similarity("#000000", &catalog, 3);
        let second = rank_by_similarity("#000000", &catalog, 3);
        let ids = |r: &[ColorDistance<'_>]| r.iter().map(|c| c.product.id).collect::<Vec<_>>();
        assert_eq!(ids(&first), vec![1, 2, 3]);
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_top_match_against_builtin() {
        let best = top_match("#c01a29", Catalog::builtin().products()).unwrap();
        assert_eq!(best.product.product_name, "Retro Matte Lipstick in Ruby Woo");
        assert_eq!(best.distance, 0.0);
    }
}
