use std::str::FromStr;

use crate::error::{Error, Result};

/// 8 bit RGB color as stored in a quantized image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const WHITE: Rgb = Rgb([255, 255, 255]);
    pub const BLACK: Rgb = Rgb([0, 0, 0]);
    pub const RED: Rgb = Rgb([255, 0, 0]);

    /// Perceptual luminance `0.299 R + 0.587 G + 0.114 B`, rounded to the
    /// nearest level.
    ///
    /// Computed in integer arithmetic so white maps to exactly 255.
    pub fn luminance(&self) -> u8 {
        let [r, g, b] = self.0;
        let weighted = 299 * r as u32 + 587 * g as u32 + 114 * b as u32;
        ((weighted + 500) / 1000) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaletteEntry {
    pub color: Rgb,
    pub luminance: f32,
}

/// Ordered set of display native colors.
///
/// Index order is the tie-break order for nearest matches: the lowest index
/// wins.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    entries: Vec<PaletteEntry>,
}

impl Palette {
    pub fn new(colors: &[Rgb]) -> Result<Self> {
        if colors.is_empty() {
            return Err(Error::InvalidPalette("palette has no entries".to_string()));
        }
        Ok(Self::from_colors(colors))
    }

    pub fn black_white() -> Self {
        Self::from_colors(&[Rgb::WHITE, Rgb::BLACK])
    }

    pub fn red_white() -> Self {
        Self::from_colors(&[Rgb::WHITE, Rgb::RED])
    }

    pub fn red_black_white() -> Self {
        Self::from_colors(&[Rgb::WHITE, Rgb::BLACK, Rgb::RED])
    }

    fn from_colors(colors: &[Rgb]) -> Self {
        Palette {
            entries: colors
                .iter()
                .map(|&color| PaletteEntry {
                    color,
                    luminance: color.luminance() as f32,
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[PaletteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, color: Rgb) -> bool {
        self.entries.iter().any(|e| e.color == color)
    }

    /// Entry whose luminance is closest to `value`.
    ///
    /// Ties resolve to the lowest index since only a strictly smaller
    /// distance replaces the current best.
    pub fn nearest(&self, value: f32) -> &PaletteEntry {
        let mut best = &self.entries[0];
        let mut best_distance = (value - best.luminance).abs();
        for entry in &self.entries[1..] {
            let distance = (value - entry.luminance).abs();
            if distance < best_distance {
                best = entry;
                best_distance = distance;
            }
        }
        best
    }
}

/// Color combination supported by the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    BlackWhite,
    RedWhite,
    RedBlackWhite,
}

impl ColorMode {
    pub fn palette(&self) -> Palette {
        match self {
            Self::BlackWhite => Palette::black_white(),
            Self::RedWhite => Palette::red_white(),
            Self::RedBlackWhite => Palette::red_black_white(),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::BlackWhite => "bw",
            Self::RedWhite => "rw",
            Self::RedBlackWhite => "rbw",
        }
    }
}

impl Default for ColorMode {
    fn default() -> Self {
        Self::BlackWhite
    }
}

impl FromStr for ColorMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bw" | "black-white" => Ok(Self::BlackWhite),
            "rw" | "red-white" => Ok(Self::RedWhite),
            "rbw" | "red-black-white" => Ok(Self::RedBlackWhite),
            _ => Err(Error::UnknownMode(s.to_string())),
        }
    }
}
