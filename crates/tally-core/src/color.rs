//! Category colors: explicit entries from the rule file, hashed otherwise.

use std::collections::HashMap;

use serde::Serialize;

/// Red, green and blue in `0.0..=1.0`.
pub type Rgb = [f32; 3];

/// White, given to the root category.
pub const WHITE: Rgb = [1.0, 1.0, 1.0];

/// Colors keyed by category name.
///
/// Names without an explicit entry get a stable color derived from a hash of
/// the name, so the same category is drawn the same way on every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ColorMap {
    explicit: HashMap<String, Rgb>,
}

impl ColorMap {
    #[must_use]
    pub fn new(explicit: HashMap<String, Rgb>) -> Self {
        Self { explicit }
    }

    /// Returns the configured color, or the hashed fallback.
    #[must_use]
    pub fn get(&self, name: &str) -> Rgb {
        self.explicit
            .get(name)
            .copied()
            .unwrap_or_else(|| hashed_color(name))
    }

    /// True when the rule file configured a color for `name`.
    #[must_use]
    pub fn is_explicit(&self, name: &str) -> bool {
        self.explicit.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.explicit.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.explicit.is_empty()
    }
}

/// Parses `#RRGGBB` (either case).
#[must_use]
pub fn parse_hex(s: &str) -> Option<Rgb> {
    let hex = s.strip_prefix('#')?;
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([
        f32::from(channel(0)?) / 255.0,
        f32::from(channel(2)?) / 255.0,
        f32::from(channel(4)?) / 255.0,
    ])
}

/// Formats as `#rrggbb`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_hex(rgb: Rgb) -> String {
    let byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!("#{:02x}{:02x}{:02x}", byte(rgb[0]), byte(rgb[1]), byte(rgb[2]))
}

/// Low three bytes of the classic `31 * h + c` string hash over UTF-16 units.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hashed_color(name: &str) -> Rgb {
    let h = name
        .encode_utf16()
        .fold(0_i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)));
    let byte = |shift: u32| f32::from(((h >> shift) & 0xFF) as u8) / 255.0;
    [byte(0), byte(8), byte(16)]
}
