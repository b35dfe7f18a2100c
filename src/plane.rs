//! Conversion of a quantized image into the panel's two monochrome planes.
//!
//! The controller takes a primary plane (bit set = white) and a secondary
//! plane (bit set = black, cleared = white or red). Both are packed column by
//! column, eight rows per byte, most significant bit on top.

use log::{debug, info};

use crate::{
    error::{Error, Result},
    palette::Rgb,
    panel::Panel,
    raster::QuantizedImage,
};

/// Relative aspect deviation tolerated before cropping.
const ASPECT_TOLERANCE: f64 = 0.01;

/// One bit per pixel of a normalized image. Height is a multiple of 8.
#[derive(Debug, Clone, PartialEq)]
pub struct BitPlane {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl BitPlane {
    fn from_image(image: &QuantizedImage, predicate: impl Fn(Rgb) -> bool) -> Self {
        BitPlane {
            width: image.width(),
            height: image.height(),
            bits: image.pixels().iter().map(|&px| predicate(px)).collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[(y * self.width + x) as usize]
    }

    /// Pack column-major: for each column, groups of 8 rows from the top,
    /// first row of a group in bit 7.
    pub fn pack(&self) -> PackedPlane {
        let mut packed = Vec::with_capacity((self.width * self.height / 8) as usize);
        for x in 0..self.width {
            for y in (0..self.height).step_by(8) {
                let mut byte: u8 = 0x00;
                for i in 0..8 {
                    if y + i < self.height && self.get(x, y + i) {
                        byte |= 1 << (7 - i);
                    }
                }
                packed.push(byte);
            }
        }
        PackedPlane(packed)
    }
}

/// Wire ready plane bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedPlane(Vec<u8>);

impl PackedPlane {
    pub fn new(bytes: Vec<u8>) -> Self {
        PackedPlane(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPlanes {
    pub primary: PackedPlane,
    pub secondary: PackedPlane,
    pub width: u32,
    pub height: u32,
}

impl EncodedPlanes {
    /// Unpack both planes and render them the way the panel will show them.
    pub fn preview(&self) -> Result<QuantizedImage> {
        let primary = unpack(&self.primary, self.width, self.height)?;
        let secondary = unpack(&self.secondary, self.width, self.height)?;
        preview(&primary, &secondary)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PlaneEncoder {
    panel: Panel,
}

impl PlaneEncoder {
    pub fn new(panel: Panel) -> Self {
        PlaneEncoder { panel }
    }

    /// Normalize `image` for the panel and derive both packed planes.
    pub fn encode(&self, image: QuantizedImage) -> Result<EncodedPlanes> {
        let image = self.normalize(image)?;
        let (primary, secondary) = Self::planes(&image);
        let encoded = EncodedPlanes {
            primary: primary.pack(),
            secondary: secondary.pack(),
            width: image.width(),
            height: image.height(),
        };
        info!(
            "Encoded {}x{} image into {} + {} bytes",
            encoded.width,
            encoded.height,
            encoded.primary.len(),
            encoded.secondary.len()
        );
        Ok(encoded)
    }

    /// Rotate, crop and pad. Runs before any mask is taken.
    pub fn normalize(&self, image: QuantizedImage) -> Result<QuantizedImage> {
        let portrait = image.width() < image.height();
        let landscape = image.width() > image.height();
        let image = if (self.panel.is_landscape() && portrait)
            || (!self.panel.is_landscape() && landscape)
        {
            debug!("Rotating {}x{} image", image.width(), image.height());
            image.rotate90()
        } else {
            image
        };

        let image = self.crop_to_aspect(image)?;

        let remainder = image.height() % 8;
        let image = if remainder != 0 {
            let pad = 8 - remainder;
            debug!("Padding {} rows", pad);
            image.pad_bottom(pad, Rgb::BLACK)
        } else {
            image
        };

        if image.width() == 0 || image.height() == 0 {
            return Err(Error::UnsupportedGeometry {
                width: image.width(),
                height: image.height(),
            });
        }
        Ok(image)
    }

    fn crop_to_aspect(&self, image: QuantizedImage) -> Result<QuantizedImage> {
        let (w, h) = (image.width(), image.height());
        let target = self.panel.aspect_ratio();
        let current = w as f64 / h as f64;

        if ((current - target) / target).abs() <= ASPECT_TOLERANCE {
            return Ok(image);
        }

        if current > target {
            let new_width = (h as f64 * target) as u32;
            if new_width == 0 {
                return Err(Error::UnsupportedGeometry {
                    width: new_width,
                    height: h,
                });
            }
            debug!("Cropping width {} -> {}", w, new_width);
            image.crop((w - new_width) / 2, 0, new_width, h)
        } else {
            let new_height = (w as f64 / target) as u32;
            if new_height == 0 {
                return Err(Error::UnsupportedGeometry {
                    width: w,
                    height: new_height,
                });
            }
            debug!("Cropping height {} -> {}", h, new_height);
            image.crop(0, (h - new_height) / 2, w, new_height)
        }
    }

    /// Primary is set on white. Secondary is set on black only, white and red
    /// both clear it so the receiver reads a cleared bit as "colored ink".
    fn planes(image: &QuantizedImage) -> (BitPlane, BitPlane) {
        let primary = BitPlane::from_image(image, |px| px == Rgb::WHITE);
        let secondary = BitPlane::from_image(image, |px| !(px == Rgb::WHITE || px == Rgb::RED));
        (primary, secondary)
    }
}

/// Rebuild a displayable image from the two planes.
///
/// A pixel set in the primary plane is white, set in the secondary plane is
/// black, clear in both is red.
pub fn preview(primary: &BitPlane, secondary: &BitPlane) -> Result<QuantizedImage> {
    if primary.width != secondary.width || primary.height != secondary.height {
        return Err(Error::UnsupportedGeometry {
            width: secondary.width,
            height: secondary.height,
        });
    }
    let pixels = primary
        .bits
        .iter()
        .zip(secondary.bits.iter())
        .map(|(&white, &black)| match (white, black) {
            (true, _) => Rgb::WHITE,
            (false, true) => Rgb::BLACK,
            (false, false) => Rgb::RED,
        })
        .collect();
    QuantizedImage::new(primary.width, primary.height, pixels)
}

/// Decode a packed plane back into bits, for previews of received data.
pub fn unpack(plane: &PackedPlane, width: u32, height: u32) -> Result<BitPlane> {
    if height % 8 != 0 || plane.len() != (width * height / 8) as usize {
        return Err(Error::UnsupportedGeometry { width, height });
    }
    let mut bits = vec![false; (width * height) as usize];
    let groups = height / 8;
    for (index, byte) in plane.as_bytes().iter().enumerate() {
        let x = index as u32 / groups;
        let y = (index as u32 % groups) * 8;
        for i in 0..8 {
            bits[((y + i) * width + x) as usize] = byte & (1 << (7 - i)) != 0;
        }
    }
    Ok(BitPlane { width, height, bits })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn portrait_panel(width: u32, height: u32) -> PlaneEncoder {
        PlaneEncoder::new(Panel::Custom { width, height })
    }

    #[test]
    fn all_white_column() {
        let image = QuantizedImage::filled(2, 8, Rgb::WHITE).unwrap();
        let planes = portrait_panel(2, 8).encode(image).unwrap();
        assert_eq!(planes.primary.as_bytes(), &[0xFF, 0xFF]);
        assert_eq!(planes.secondary.as_bytes(), &[0x00, 0x00]);
        assert_eq!((planes.width, planes.height), (2, 8));
    }

    #[test]
    fn polarity_per_color() {
        // one column, rows: white, black, red, then padding
        let image = QuantizedImage::new(1, 3, vec![Rgb::WHITE, Rgb::BLACK, Rgb::RED]).unwrap();
        let (primary, secondary) = PlaneEncoder::planes(&image);
        assert!(primary.get(0, 0));
        assert!(!primary.get(0, 1));
        assert!(!primary.get(0, 2));
        assert!(!secondary.get(0, 0));
        assert!(secondary.get(0, 1));
        assert!(!secondary.get(0, 2));
    }

    #[test]
    fn bit_order_is_msb_first_and_column_major() {
        let mut pixels = vec![Rgb::BLACK; 2 * 16];
        pixels[0] = Rgb::WHITE; // (0, 0)
        pixels[2 * 9 + 1] = Rgb::WHITE; // (1, 9)
        let image = QuantizedImage::new(2, 16, pixels).unwrap();
        let planes = portrait_panel(2, 16).encode(image).unwrap();
        assert_eq!(planes.primary.as_bytes(), &[0x80, 0x00, 0x00, 0x40]);
    }

    #[test]
    fn portrait_image_is_rotated_for_landscape_panel() {
        let image = QuantizedImage::filled(8, 16, Rgb::WHITE).unwrap();
        let planes = PlaneEncoder::new(Panel::Custom {
            width: 16,
            height: 8,
        })
        .encode(image)
        .unwrap();
        assert_eq!((planes.width, planes.height), (16, 8));
    }

    #[test]
    fn height_is_padded_with_black() {
        let image = QuantizedImage::filled(10, 5, Rgb::WHITE).unwrap();
        let planes = PlaneEncoder::new(Panel::Custom {
            width: 2,
            height: 1,
        })
        .encode(image)
        .unwrap();
        assert_eq!((planes.width, planes.height), (10, 8));
        assert!(planes.primary.as_bytes().iter().all(|&b| b == 0b1111_1000));
        assert!(planes.secondary.as_bytes().iter().all(|&b| b == 0b0000_0111));
    }

    #[test]
    fn too_wide_is_center_cropped() {
        // 4:1 image on a 2:1 panel keeps the middle half
        let mut pixels = vec![Rgb::BLACK; 32 * 8];
        for y in 0..8 {
            for x in 8..24 {
                pixels[y * 32 + x] = Rgb::WHITE;
            }
        }
        let image = QuantizedImage::new(32, 8, pixels).unwrap();
        let planes = PlaneEncoder::new(Panel::Custom {
            width: 2,
            height: 1,
        })
        .encode(image)
        .unwrap();
        assert_eq!((planes.width, planes.height), (16, 8));
        assert!(planes.primary.as_bytes().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn too_tall_is_center_cropped() {
        let image = QuantizedImage::filled(16, 16, Rgb::RED).unwrap();
        let planes = PlaneEncoder::new(Panel::Custom {
            width: 2,
            height: 1,
        })
        .encode(image)
        .unwrap();
        assert_eq!((planes.width, planes.height), (16, 8));
        assert!(planes.secondary.as_bytes().iter().all(|&b| b == 0x00));
    }

    #[test]
    fn degenerate_crop_is_rejected() {
        let image = QuantizedImage::filled(1, 1, Rgb::WHITE).unwrap();
        let err = PlaneEncoder::new(Panel::Custom {
            width: 1,
            height: 4,
        })
        .encode(image)
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedGeometry { .. }));
    }

    #[test]
    fn preview_recovers_colors() {
        let image = QuantizedImage::new(1, 8, {
            let mut px = vec![Rgb::WHITE; 8];
            px[3] = Rgb::BLACK;
            px[5] = Rgb::RED;
            px
        })
        .unwrap();
        let planes = portrait_panel(1, 8).encode(image.clone()).unwrap();
        let primary = unpack(&planes.primary, 1, 8).unwrap();
        let secondary = unpack(&planes.secondary, 1, 8).unwrap();
        assert_eq!(preview(&primary, &secondary).unwrap(), image);
        assert_eq!(planes.preview().unwrap(), image);
    }

    #[test]
    fn preview_shows_rotated_frame() {
        // portrait 8x12 lands on a 12x8 panel after a clockwise turn
        let mut pixels = vec![Rgb::WHITE; 8 * 12];
        pixels[0] = Rgb::RED;
        let image = QuantizedImage::new(8, 12, pixels).unwrap();
        let planes = PlaneEncoder::new(Panel::Custom {
            width: 12,
            height: 8,
        })
        .encode(image)
        .unwrap();

        let shown = planes.preview().unwrap();
        assert_eq!((shown.width(), shown.height()), (12, 8));
        assert_eq!(shown.get(11, 0), Rgb::RED);
        assert_eq!(shown.get(0, 0), Rgb::WHITE);
    }

    proptest! {
        #[test]
        fn packed_length_matches_geometry(width in 1u32..40, height in 1u32..40, seed in any::<u8>()) {
            let colors = [Rgb::WHITE, Rgb::BLACK, Rgb::RED];
            let pixels = (0..width * height)
                .map(|i| colors[((i + seed as u32) % 3) as usize])
                .collect();
            let image = QuantizedImage::new(width, height, pixels).unwrap();
            let encoder = PlaneEncoder::new(Panel::Custom { width, height });
            let planes = encoder.encode(image).unwrap();
            prop_assert_eq!(planes.height % 8, 0);
            let expected = (planes.width * ((planes.height + 7) / 8)) as usize;
            prop_assert_eq!(planes.primary.len(), expected);
            prop_assert_eq!(planes.secondary.len(), expected);
        }
    }
}
