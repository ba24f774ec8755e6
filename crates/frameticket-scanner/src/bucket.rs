use frameticket_common::ScanConfig;
use frameticket_core::{Color, Shadow, StyleCategory, StyleValue, Typography};
use serde::{Deserialize, Serialize};

/// Quantized form of a style value. Values with equal keys are the same token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "category", content = "key", rename_all = "snake_case")]
pub enum BucketKey {
    /// Hex of the palette representative.
    Color(String),
    /// Number of spacing steps.
    Spacing(i64),
    Typography {
        family: String,
        size: i64,
        weight: u16,
    },
    /// Number of radius steps.
    Radius(i64),
    Shadow {
        x: i64,
        y: i64,
        blur: i64,
        color: String,
    },
}

impl BucketKey {
    pub fn category(&self) -> StyleCategory {
        match self {
            BucketKey::Color(_) => StyleCategory::Color,
            BucketKey::Spacing(_) => StyleCategory::Spacing,
            BucketKey::Typography { .. } => StyleCategory::Typography,
            BucketKey::Radius(_) => StyleCategory::Radius,
            BucketKey::Shadow { .. } => StyleCategory::Shadow,
        }
    }
}

const SHADOW_STEP: f64 = 2.0;

/// Assigns style values to buckets.
///
/// Colors are clustered greedily: a color joins the first palette entry within
/// `color_merge_distance`, otherwise (while learning) it opens a new entry. The
/// outcome only depends on the order colors are seen in, which is document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucketer {
    config: ScanConfig,
    palette: Vec<Color>,
}

impl Bucketer {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            palette: Vec::new(),
        }
    }

    /// Bucketer over a finished palette; [`Bucketer::lookup`] will not extend it.
    pub fn with_palette(config: ScanConfig, palette: Vec<Color>) -> Self {
        Self { config, palette }
    }

    pub fn palette(&self) -> &[Color] {
        &self.palette
    }

    pub fn into_palette(self) -> Vec<Color> {
        self.palette
    }

    /// Bucket a value, growing the palette when a color matches no entry.
    /// Returns the key and the bucket's representative value.
    pub fn learn(&mut self, value: &StyleValue) -> (BucketKey, StyleValue) {
        if let StyleValue::Color(color) = value {
            let representative = match self.palette_entry(color) {
                Some(existing) => existing,
                None => {
                    self.palette.push(*color);
                    *color
                }
            };
            return (
                BucketKey::Color(representative.to_hex()),
                StyleValue::Color(representative),
            );
        }
        self.quantize(value)
    }

    /// Bucket a value without touching the palette.
    pub fn lookup(&self, value: &StyleValue) -> BucketKey {
        if let StyleValue::Color(color) = value {
            let representative = self.palette_entry(color).unwrap_or(*color);
            return BucketKey::Color(representative.to_hex());
        }
        self.quantize(value).0
    }

    fn palette_entry(&self, color: &Color) -> Option<Color> {
        self.palette
            .iter()
            .find(|entry| entry.distance(color) <= self.config.color_merge_distance)
            .copied()
    }

    fn quantize(&self, value: &StyleValue) -> (BucketKey, StyleValue) {
        match value {
            StyleValue::Color(color) => (
                BucketKey::Color(color.to_hex()),
                StyleValue::Color(*color),
            ),
            StyleValue::Spacing(v) => {
                let n = steps(*v, self.config.spacing_step);
                (
                    BucketKey::Spacing(n),
                    StyleValue::Spacing(n as f64 * self.config.spacing_step),
                )
            }
            StyleValue::Radius(v) => {
                let n = steps(*v, self.config.radius_step);
                (
                    BucketKey::Radius(n),
                    StyleValue::Radius(n as f64 * self.config.radius_step),
                )
            }
            StyleValue::Typography(t) => {
                let size = t.size.round() as i64;
                let weight = ((t.weight as f64 / 100.0).round() * 100.0) as u16;
                (
                    BucketKey::Typography {
                        family: t.family.trim().to_lowercase(),
                        size,
                        weight,
                    },
                    StyleValue::Typography(Typography {
                        family: t.family.trim().to_string(),
                        size: size as f64,
                        weight,
                    }),
                )
            }
            StyleValue::Shadow(s) => {
                let (x, y, blur) = (
                    steps(s.x, SHADOW_STEP),
                    steps(s.y, SHADOW_STEP),
                    steps(s.blur, SHADOW_STEP),
                );
                (
                    BucketKey::Shadow {
                        x,
                        y,
                        blur,
                        color: s.color.to_hex(),
                    },
                    StyleValue::Shadow(Shadow {
                        x: x as f64 * SHADOW_STEP,
                        y: y as f64 * SHADOW_STEP,
                        blur: blur as f64 * SHADOW_STEP,
                        color: s.color,
                    }),
                )
            }
        }
    }
}

fn steps(value: f64, step: f64) -> i64 {
    (value / step).round() as i64
}

/// Distance between two values of the same category; `None` across categories.
pub fn distance(a: &StyleValue, b: &StyleValue) -> Option<f64> {
    match (a, b) {
        (StyleValue::Color(x), StyleValue::Color(y)) => Some(x.distance(y)),
        (StyleValue::Spacing(x), StyleValue::Spacing(y)) => Some((x - y).abs()),
        (StyleValue::Radius(x), StyleValue::Radius(y)) => Some((x - y).abs()),
        (StyleValue::Typography(x), StyleValue::Typography(y)) => {
            let family = if x.family.trim().eq_ignore_ascii_case(y.family.trim()) {
                0.0
            } else {
                4.0
            };
            let weight = (x.weight as f64 - y.weight as f64).abs() / 100.0;
            Some((x.size - y.size).abs() + weight + family)
        }
        (StyleValue::Shadow(x), StyleValue::Shadow(y)) => Some(
            (x.x - y.x).abs()
                + (x.y - y.y).abs()
                + (x.blur - y.blur).abs()
                + x.color.distance(&y.color) / 32.0,
        ),
        _ => None,
    }
}
