//! Pixel grids passed between the quantizer and the plane encoder.
//!
//! All grids are row-major with the origin at the top-left corner.

use crate::{
    error::{Error, Result},
    palette::Rgb,
};

fn check_geometry(width: u32, height: u32, len: usize, channels: usize) -> Result<()> {
    if width == 0 || height == 0 || len != width as usize * height as usize * channels {
        return Err(Error::UnsupportedGeometry { width, height });
    }
    Ok(())
}

/// Decoded input image. Immutable once loaded.
///
/// Keeps both the RGB pixels and their luminance, the generic quantizer only
/// reads the latter.
#[derive(Debug, Clone)]
pub struct SourceImage {
    width: u32,
    height: u32,
    rgb: Vec<Rgb>,
    luma: Vec<u8>,
}

impl SourceImage {
    /// Build from a grayscale buffer, one byte per pixel.
    pub fn from_luma(width: u32, height: u32, luma: Vec<u8>) -> Result<Self> {
        check_geometry(width, height, luma.len(), 1)?;
        let rgb = luma.iter().map(|&v| Rgb([v, v, v])).collect();
        Ok(SourceImage {
            width,
            height,
            rgb,
            luma,
        })
    }

    /// Build from packed RGB8 bytes.
    pub fn from_rgb(width: u32, height: u32, bytes: Vec<u8>) -> Result<Self> {
        check_geometry(width, height, bytes.len(), 3)?;
        let rgb: Vec<Rgb> = bytes
            .chunks_exact(3)
            .map(|px| Rgb([px[0], px[1], px[2]]))
            .collect();
        let luma = rgb.iter().map(Rgb::luminance).collect();
        Ok(SourceImage {
            width,
            height,
            rgb,
            luma,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn luma(&self) -> &[u8] {
        &self.luma
    }

    pub fn rgb(&self) -> &[Rgb] {
        &self.rgb
    }
}

/// Image whose every pixel is exactly one palette color.
///
/// The geometry helpers only move whole pixels or fill with a constant, so
/// they never introduce a color that was not already present.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedImage {
    width: u32,
    height: u32,
    pixels: Vec<Rgb>,
}

impl QuantizedImage {
    pub fn new(width: u32, height: u32, pixels: Vec<Rgb>) -> Result<Self> {
        check_geometry(width, height, pixels.len(), 1)?;
        Ok(QuantizedImage {
            width,
            height,
            pixels,
        })
    }

    pub fn filled(width: u32, height: u32, color: Rgb) -> Result<Self> {
        Self::new(width, height, vec![color; width as usize * height as usize])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    pub fn get(&self, x: u32, y: u32) -> Rgb {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Rotate a quarter turn clockwise. Width and height swap.
    pub fn rotate90(&self) -> QuantizedImage {
        let (w, h) = (self.width, self.height);
        let mut pixels = Vec::with_capacity(self.pixels.len());
        // destination (x, y) comes from source (y, h - 1 - x)
        for y in 0..w {
            for x in 0..h {
                pixels.push(self.get(y, h - 1 - x));
            }
        }
        QuantizedImage {
            width: h,
            height: w,
            pixels,
        }
    }

    /// Copy out the `width` x `height` window starting at (`x`, `y`).
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<QuantizedImage> {
        if width == 0 || height == 0 || x + width > self.width || y + height > self.height {
            return Err(Error::UnsupportedGeometry { width, height });
        }
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for row in y..y + height {
            let start = (row * self.width + x) as usize;
            pixels.extend_from_slice(&self.pixels[start..start + width as usize]);
        }
        Ok(QuantizedImage {
            width,
            height,
            pixels,
        })
    }

    /// Append `rows` rows of `color` at the bottom.
    pub fn pad_bottom(mut self, rows: u32, color: Rgb) -> QuantizedImage {
        self.pixels
            .extend(std::iter::repeat(color).take(rows as usize * self.width as usize));
        self.height += rows;
        self
    }

    /// Packed RGB8 bytes, for handing back to the image layer.
    pub fn to_rgb_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flat_map(|px| px.0.iter().copied()).collect()
    }
}
