//! OSM building tags and the height/roof analysis derived from them

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::BuildingConfig;

const FEET: f64 = 0.3048;
const INCHES: f64 = 0.0254;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoofKind {
    /// Planar cap at the top of the walls
    #[default]
    Flat,
    /// Single apex above the centroid
    Dome,
}

/// The tags the generator reads. Unparseable values are `None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildingTags {
    pub height: Option<f64>,
    pub min_height: Option<f64>,
    pub levels: Option<f64>,
    pub roof_shape: Option<String>,
    pub roof_height: Option<f64>,
    pub colour: Option<[u8; 4]>,
}

impl BuildingTags {
    pub fn from_tags(tags: &HashMap<String, String>) -> Self {
        let get = |key: &str| tags.get(key).map(String::as_str);
        Self {
            height: get("height").and_then(parse_height),
            min_height: get("min_height").and_then(parse_height),
            levels: get("building:levels").and_then(parse_levels),
            roof_shape: get("roof:shape").map(|s| s.trim().to_ascii_lowercase()),
            roof_height: get("roof:height").and_then(parse_height),
            colour: get("building:colour")
                .or_else(|| get("building:color"))
                .and_then(parse_colour),
        }
    }

    fn has_dome_shape(&self) -> bool {
        matches!(self.roof_shape.as_deref(), Some("dome" | "pyramidal"))
    }
}

/// Heights in meters
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeightProfile {
    pub total: f64,
    /// Top of the walls
    pub wall: f64,
    /// Apex above the wall top, zero for flat roofs
    pub roof: f64,
    pub roof_kind: RoofKind,
}

/// Work out wall and roof heights.
///
/// Total height comes from the first available of: `height`, levels times
/// level height, `generated`, `min_height`, a random level count. A
/// `roof:height` tag or a dome/pyramidal shape turns the top into a dome
/// carved out of the total.
pub fn analyze(
    tags: &BuildingTags,
    config: &BuildingConfig,
    generated: impl FnOnce() -> Option<f64>,
    rng: &mut impl Rng,
) -> HeightProfile {
    let total = match (tags.height, tags.levels) {
        (Some(h), _) => h,
        (None, Some(levels)) => levels * config.level_height,
        (None, None) => generated()
            .filter(|h| h.is_finite() && *h > 0.0)
            .or(tags.min_height)
            .unwrap_or_else(|| {
                let (lo, hi) = config.levels_range.ordered();
                rng.random_range(lo..=hi) as f64 * config.level_height
            }),
    };
    let total = total.max(config.min_height);

    if tags.roof_height.is_none() && !tags.has_dome_shape() {
        return HeightProfile { total, wall: total, roof: 0.0, roof_kind: RoofKind::Flat };
    }

    let mut roof = match (tags.roof_height, tags.min_height) {
        (Some(r), _) => r,
        (None, Some(min)) if min < total => total - min,
        _ => config.level_height.min(total / 2.0),
    };
    if roof >= total {
        roof = total / 2.0;
    }
    if roof <= 0.0 {
        return HeightProfile { total, wall: total, roof: 0.0, roof_kind: RoofKind::Flat };
    }

    HeightProfile { total, wall: total - roof, roof, roof_kind: RoofKind::Dome }
}

/// Parse an OSM length: `12`, `12.5 m`, `40 ft`, `40'`, `12'6"`, `12,5`
pub fn parse_height(raw: &str) -> Option<f64> {
    let s = raw.trim().to_ascii_lowercase().replace(',', ".");
    if s.is_empty() {
        return None;
    }

    let meters = if let Some((feet, rest)) = s.split_once('\'') {
        let feet: f64 = feet.trim().parse().ok()?;
        let inches = rest.trim().trim_end_matches('"').trim();
        let inches: f64 = if inches.is_empty() { 0.0 } else { inches.parse().ok()? };
        feet * FEET + inches * INCHES
    } else if let Some(feet) = s.strip_suffix("ft") {
        feet.trim().parse::<f64>().ok()? * FEET
    } else if let Some(m) = s.strip_suffix('m') {
        m.trim().parse().ok()?
    } else {
        s.parse().ok()?
    };

    (meters.is_finite() && meters >= 0.0).then_some(meters)
}

fn parse_levels(raw: &str) -> Option<f64> {
    let levels: f64 = raw.trim().replace(',', ".").parse().ok()?;
    (levels.is_finite() && levels > 0.0).then_some(levels)
}

/// Parse `#rgb`, `#rrggbb` or a common colour name into RGBA
pub fn parse_colour(raw: &str) -> Option<[u8; 4]> {
    let s = raw.trim().to_ascii_lowercase();
    if let Some(hex) = s.strip_prefix('#') {
        let digits = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect::<String>(),
            6 => hex.to_string(),
            _ => return None,
        };
        let v = u32::from_str_radix(&digits, 16).ok()?;
        return Some([(v >> 16) as u8, (v >> 8) as u8, v as u8, 255]);
    }

    let rgb: [u8; 3] = match s.as_str() {
        "white" => [255, 255, 255],
        "black" => [0, 0, 0],
        "gray" | "grey" => [128, 128, 128],
        "lightgray" | "lightgrey" => [211, 211, 211],
        "darkgray" | "darkgrey" => [169, 169, 169],
        "silver" => [192, 192, 192],
        "red" => [255, 0, 0],
        "maroon" => [128, 0, 0],
        "green" => [0, 128, 0],
        "blue" => [0, 0, 255],
        "yellow" => [255, 255, 0],
        "orange" => [255, 165, 0],
        "brown" => [165, 42, 42],
        "beige" => [245, 245, 220],
        "tan" => [210, 180, 140],
        "ivory" => [255, 255, 240],
        "pink" => [255, 192, 203],
        _ => return None,
    };
    Some([rgb[0], rgb[1], rgb[2], 255])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LevelsRange;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn tags(pairs: &[(&str, &str)]) -> BuildingTags {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BuildingTags::from_tags(&map)
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_parse_height() {
        assert_eq!(parse_height("12"), Some(12.0));
        assert_eq!(parse_height(" 12.5 m"), Some(12.5));
        assert_eq!(parse_height("12,5"), Some(12.5));
        assert!((parse_height("10 ft").unwrap() - 3.048).abs() < 1e-9);
        assert!((parse_height("10'6\"").unwrap() - (3.048 + 0.1524)).abs() < 1e-9);
        assert_eq!(parse_height("tall"), None);
        assert_eq!(parse_height("-3"), None);
        assert_eq!(parse_height(""), None);
    }

    #[test]
    fn test_parse_colour() {
        assert_eq!(parse_colour("#ff8000"), Some([255, 128, 0, 255]));
        assert_eq!(parse_colour("#f80"), Some([255, 136, 0, 255]));
        assert_eq!(parse_colour("Grey"), Some([128, 128, 128, 255]));
        assert_eq!(parse_colour("#12345"), None);
        assert_eq!(parse_colour("plaid"), None);
    }

    #[test]
    fn test_height_priority() {
        let config = BuildingConfig::default();
        let tagged = tags(&[("height", "20"), ("building:levels", "2")]);
        let h = analyze(&tagged, &config, || None, &mut rng());
        assert_eq!(h.total, 20.0);

        let h = analyze(&tags(&[("building:levels", "5")]), &config, || Some(99.0), &mut rng());
        assert_eq!(h.total, 15.0);

        let h = analyze(&tags(&[("min_height", "8")]), &config, || Some(42.0), &mut rng());
        assert_eq!(h.total, 42.0);

        let h = analyze(&tags(&[("min_height", "8")]), &config, || None, &mut rng());
        assert_eq!(h.total, 8.0);
        assert_eq!(h.roof_kind, RoofKind::Flat);
    }

    #[test]
    fn test_random_height_in_levels_range() {
        let config = BuildingConfig::default();
        let mut rng = rng();
        for _ in 0..50 {
            let h = analyze(&BuildingTags::default(), &config, || None, &mut rng);
            let levels = h.total / config.level_height;
            assert!((3.0..=7.0).contains(&levels));
            assert_eq!(levels.fract(), 0.0);
        }
    }

    #[test]
    fn test_inverted_levels_range_is_ordered() {
        let mut config = BuildingConfig::default();
        config.levels_range = LevelsRange { min: 7, max: 3 };
        let mut rng = rng();
        for _ in 0..20 {
            let h = analyze(&BuildingTags::default(), &config, || None, &mut rng);
            let levels = h.total / config.level_height;
            assert!((3.0..=7.0).contains(&levels));
        }
        assert_eq!(LevelsRange::new(9, 2), LevelsRange { min: 2, max: 9 });
    }

    #[test]
    fn test_min_height_clamp() {
        let config = BuildingConfig::default();
        let h = analyze(&tags(&[("height", "1")]), &config, || None, &mut rng());
        assert_eq!(h.total, config.min_height);
        assert_eq!(h.wall, config.min_height);
    }

    #[test]
    fn test_dome_roofs() {
        let config = BuildingConfig::default();
        let tagged = tags(&[("height", "17"), ("roof:height", "5")]);
        let h = analyze(&tagged, &config, || None, &mut rng());
        assert_eq!(h.roof_kind, RoofKind::Dome);
        assert_eq!((h.wall, h.roof), (12.0, 5.0));

        let h = analyze(
            &tags(&[("height", "20"), ("min_height", "14"), ("roof:shape", "pyramidal")]),
            &config,
            || None,
            &mut rng(),
        );
        assert_eq!((h.wall, h.roof), (14.0, 6.0));

        let tagged = tags(&[("height", "12"), ("roof:shape", "dome")]);
        let h = analyze(&tagged, &config, || None, &mut rng());
        assert_eq!((h.wall, h.roof), (9.0, 3.0));

        // a gabled roof without a roof height stays flat
        let tagged = tags(&[("height", "12"), ("roof:shape", "gabled")]);
        let h = analyze(&tagged, &config, || None, &mut rng());
        assert_eq!(h.roof_kind, RoofKind::Flat);
    }
}
