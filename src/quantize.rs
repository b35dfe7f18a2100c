//! Palette constrained error diffusion dithering.
//!
//! Two policies are available. [`Policy::NearestLuminance`] is classic
//! Floyd-Steinberg against the palette luminances and works for any palette.
//! [`Policy::RedPriority`] is a three color heuristic that looks at the RGB
//! channels to keep saturated reds red. Its mid-tone branch picks black or
//! white at random; runs through [`quantize`] are therefore not reproducible
//! for that branch, inject a seeded generator with [`quantize_with_rng`] when
//! they need to be.

use std::str::FromStr;

use log::debug;
use rand::{Rng, RngCore};

use crate::{
    error::{Error, Result},
    palette::{ColorMode, Palette, Rgb},
    raster::{QuantizedImage, SourceImage},
};

/// Floyd-Steinberg weights as (dx, dy, weight).
const KERNEL: [(i64, i64, f32); 4] = [
    (1, 0, 7.0 / 16.0),
    (-1, 1, 3.0 / 16.0),
    (0, 1, 5.0 / 16.0),
    (1, 1, 1.0 / 16.0),
];

const RED_DOMINANCE: f32 = 0.2;
const RED_MIDTONE_RATIO: f32 = 1.2;
const RED_ERROR_BOOST: f32 = 1.5;
const DARK_THRESHOLD: f32 = 0.33;
const LIGHT_THRESHOLD: f32 = 0.66;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    NearestLuminance,
    RedPriority,
}

impl Policy {
    pub fn key(&self) -> &'static str {
        match self {
            Self::NearestLuminance => "nearest",
            Self::RedPriority => "red-priority",
        }
    }
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "nearest" | "two-color" => Ok(Self::NearestLuminance),
            "red-priority" | "red" => Ok(Self::RedPriority),
            _ => Err(Error::UnknownPolicy(s.to_string())),
        }
    }
}

impl ColorMode {
    /// Policy used when the caller does not pick one.
    pub fn default_policy(&self) -> Policy {
        Policy::NearestLuminance
    }
}

type QuantizeFn = fn(&SourceImage, &Palette, &mut dyn RngCore) -> Result<QuantizedImage>;

fn routine(policy: Policy) -> QuantizeFn {
    match policy {
        Policy::NearestLuminance => nearest_luminance,
        Policy::RedPriority => red_priority,
    }
}

/// Dither `image` down to `palette` with the given policy.
pub fn quantize(image: &SourceImage, palette: &Palette, policy: Policy) -> Result<QuantizedImage> {
    quantize_with_rng(image, palette, policy, &mut rand::thread_rng())
}

/// Same as [`quantize`] with an explicit random source.
pub fn quantize_with_rng(
    image: &SourceImage,
    palette: &Palette,
    policy: Policy,
    rng: &mut dyn RngCore,
) -> Result<QuantizedImage> {
    if palette.is_empty() {
        return Err(Error::InvalidPalette("palette has no entries".to_string()));
    }
    debug!(
        "quantize {}x{} to {} colors with {}",
        image.width(),
        image.height(),
        palette.len(),
        policy.key()
    );
    routine(policy)(image, palette, rng)
}

/// Float accumulation grid seeded with the source values.
///
/// `C` is the number of channels per pixel. Owned by a single quantizer
/// run and dropped with it.
struct ErrorBuffer<const C: usize> {
    width: usize,
    height: usize,
    values: Vec<[f32; C]>,
}

impl<const C: usize> ErrorBuffer<C> {
    fn new(width: u32, height: u32, values: Vec<[f32; C]>) -> Self {
        ErrorBuffer {
            width: width as usize,
            height: height as usize,
            values,
        }
    }

    fn get(&self, x: usize, y: usize) -> [f32; C] {
        self.values[y * self.width + x]
    }

    /// Push `error` to the unprocessed neighbors of (`x`, `y`).
    ///
    /// Neighbors outside the grid are skipped and the remaining weights are
    /// left as they are.
    fn diffuse(&mut self, x: usize, y: usize, error: [f32; C]) {
        for &(dx, dy, weight) in KERNEL.iter() {
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx < 0 || ny < 0 || nx >= self.width as i64 || ny >= self.height as i64 {
                continue;
            }
            let cell = &mut self.values[ny as usize * self.width + nx as usize];
            for c in 0..C {
                cell[c] += error[c] * weight;
            }
        }
    }
}

fn nearest_luminance(
    image: &SourceImage,
    palette: &Palette,
    _rng: &mut dyn RngCore,
) -> Result<QuantizedImage> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let mut buffer = ErrorBuffer::new(
        image.width(),
        image.height(),
        image.luma().iter().map(|&v| [v as f32]).collect(),
    );
    let mut pixels = Vec::with_capacity(width * height);

    for y in 0..height {
        for x in 0..width {
            let [value] = buffer.get(x, y);
            let entry = palette.nearest(value);
            pixels.push(entry.color);
            buffer.diffuse(x, y, [value - entry.luminance]);
        }
    }

    QuantizedImage::new(image.width(), image.height(), pixels)
}

fn normalized(color: Rgb) -> [f32; 3] {
    let [r, g, b] = color.0;
    [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]
}

fn red_priority(
    image: &SourceImage,
    palette: &Palette,
    rng: &mut dyn RngCore,
) -> Result<QuantizedImage> {
    for (name, color) in [("white", Rgb::WHITE), ("black", Rgb::BLACK), ("red", Rgb::RED)].iter() {
        if !palette.contains(*color) {
            return Err(Error::InvalidPalette(format!(
                "red priority dithering needs {} in a {} color palette",
                name,
                palette.len()
            )));
        }
    }

    let (width, height) = (image.width() as usize, image.height() as usize);
    let mut buffer = ErrorBuffer::new(
        image.width(),
        image.height(),
        image.rgb().iter().map(|&px| normalized(px)).collect(),
    );
    let mut pixels = Vec::with_capacity(width * height);

    for y in 0..height {
        for x in 0..width {
            let current = buffer.get(x, y);
            let [r, g, b] = current;
            let color = if r - g.max(b) > RED_DOMINANCE {
                Rgb::RED
            } else {
                let luminance = 0.299 * r + 0.587 * g + 0.114 * b;
                if luminance < DARK_THRESHOLD {
                    Rgb::BLACK
                } else if luminance > LIGHT_THRESHOLD {
                    Rgb::WHITE
                } else if r > g.max(b) * RED_MIDTONE_RATIO {
                    Rgb::RED
                } else if rng.gen_bool(0.5) {
                    Rgb::BLACK
                } else {
                    Rgb::WHITE
                }
            };
            pixels.push(color);
            buffer.diffuse(x, y, red_priority_residual(current, color));
        }
    }

    QuantizedImage::new(image.width(), image.height(), pixels)
}

/// `current - emitted` per channel, with the red channel amplified when red
/// was emitted.
fn red_priority_residual(current: [f32; 3], color: Rgb) -> [f32; 3] {
    let target = normalized(color);
    let mut error = [
        current[0] - target[0],
        current[1] - target[1],
        current[2] - target[2],
    ];
    if color == Rgb::RED {
        error[0] *= RED_ERROR_BOOST;
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn gray(width: u32, height: u32, value: u8) -> SourceImage {
        SourceImage::from_luma(width, height, vec![value; (width * height) as usize]).unwrap()
    }

    #[test]
    fn uniform_palette_luminance_is_exact() {
        let palette = Palette::red_black_white();
        for entry in palette.entries() {
            let image = gray(5, 4, entry.luminance as u8);
            let out = quantize(&image, &palette, Policy::NearestLuminance).unwrap();
            assert!(out.pixels().iter().all(|&px| px == entry.color));
        }
    }

    #[test]
    fn uniform_image_leaves_zero_error() {
        let image = gray(4, 3, 255);
        let palette = Palette::black_white();
        let mut buffer = ErrorBuffer::new(4, 3, image.luma().iter().map(|&v| [v as f32]).collect());
        for y in 0..3 {
            for x in 0..4 {
                let [value] = buffer.get(x, y);
                let entry = palette.nearest(value);
                buffer.diffuse(x, y, [value - entry.luminance]);
            }
        }
        assert!(buffer.values.iter().all(|&[v]| v == 255.0));
    }

    #[test]
    fn diffusion_weights_in_interior() {
        let mut buffer = ErrorBuffer::new(3, 2, vec![[0.0]; 6]);
        buffer.diffuse(1, 0, [16.0]);
        let values: Vec<f32> = buffer.values.iter().map(|v| v[0]).collect();
        assert_eq!(values, vec![0.0, 0.0, 7.0, 3.0, 5.0, 1.0]);
    }

    #[test]
    fn diffusion_is_clipped_at_every_corner_and_edge() {
        let (w, h) = (3usize, 3usize);
        let cells = [
            (0, 0),
            (1, 0),
            (2, 0),
            (0, 1),
            (2, 1),
            (0, 2),
            (1, 2),
            (2, 2),
        ];
        for &(x, y) in cells.iter() {
            let mut buffer = ErrorBuffer::new(w as u32, h as u32, vec![[0.0]; w * h]);
            buffer.diffuse(x, y, [16.0]);
            let expected: f32 = KERNEL
                .iter()
                .filter(|(dx, dy, _)| {
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    nx >= 0 && nx < w as i64 && ny < h as i64
                })
                .map(|(_, _, weight)| 16.0 * weight)
                .sum();
            let total: f32 = buffer.values.iter().map(|v| v[0]).sum();
            assert_eq!(total, expected, "cell ({}, {})", x, y);
            assert_eq!(buffer.values.len(), w * h);
        }
    }

    #[test]
    fn single_pixel_and_single_row_images() {
        let palette = Palette::black_white();
        let out = quantize(&gray(1, 1, 100), &palette, Policy::NearestLuminance).unwrap();
        assert_eq!(out.pixels(), &[Rgb::BLACK]);
        let out = quantize(&gray(7, 1, 128), &palette, Policy::NearestLuminance).unwrap();
        assert_eq!(out.width(), 7);
        let out = quantize(&gray(1, 7, 128), &palette, Policy::NearestLuminance).unwrap();
        assert_eq!(out.height(), 7);
    }

    #[test]
    fn mid_gray_checkerboards() {
        let palette = Palette::black_white();
        let out = quantize(&gray(4, 1, 128), &palette, Policy::NearestLuminance).unwrap();
        // 128 -> white (err -127), 128 - 55.5625 -> black, ...
        assert_eq!(out.pixels(), &[Rgb::WHITE, Rgb::BLACK, Rgb::WHITE, Rgb::BLACK]);
    }

    #[test]
    fn red_priority_needs_three_colors() {
        let image = gray(2, 2, 10);
        let err = quantize(&image, &Palette::black_white(), Policy::RedPriority).unwrap_err();
        assert!(matches!(err, Error::InvalidPalette(_)));
    }

    #[test]
    fn red_priority_keeps_saturated_red() {
        let mut bytes = Vec::new();
        for _ in 0..4 {
            bytes.extend_from_slice(&[230, 20, 20]);
        }
        let image = SourceImage::from_rgb(2, 2, bytes).unwrap();
        let out = quantize(&image, &Palette::red_black_white(), Policy::RedPriority).unwrap();
        assert_eq!(out.pixels()[0], Rgb::RED);
    }

    #[test]
    fn red_priority_dark_and_light() {
        let palette = Palette::red_black_white();
        let out = quantize(&gray(1, 1, 20), &palette, Policy::RedPriority).unwrap();
        assert_eq!(out.pixels(), &[Rgb::BLACK]);
        let out = quantize(&gray(1, 1, 240), &palette, Policy::RedPriority).unwrap();
        assert_eq!(out.pixels(), &[Rgb::WHITE]);
    }

    #[test]
    fn red_priority_mid_tone_red() {
        // luminance ~0.50, red 0.60 against 1.2 * 0.45
        let image = SourceImage::from_rgb(1, 1, vec![153, 115, 115]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let out = quantize_with_rng(
            &image,
            &Palette::red_black_white(),
            Policy::RedPriority,
            &mut rng,
        )
        .unwrap();
        assert_eq!(out.pixels(), &[Rgb::RED]);
    }

    #[test]
    fn red_error_is_boosted_only_for_red() {
        let current = normalized(Rgb([153, 115, 115]));

        let error = red_priority_residual(current, Rgb::RED);
        assert_eq!(error[0], (current[0] - 1.0) * RED_ERROR_BOOST);
        assert!((error[0] + 0.6).abs() < 1e-6);
        assert_eq!(error[1], current[1]);
        assert_eq!(error[2], current[2]);

        let error = red_priority_residual(current, Rgb::BLACK);
        assert_eq!(error, current);

        let mut buffer = ErrorBuffer::new(2, 1, vec![current; 2]);
        buffer.diffuse(0, 0, red_priority_residual(current, Rgb::RED));
        let raw = current[0] - 1.0;
        let right = buffer.get(1, 0);
        assert!((right[0] - (current[0] + raw * 1.5 * 7.0 / 16.0)).abs() < 1e-6);
        assert!((right[1] - current[1] * (1.0 + 7.0 / 16.0)).abs() < 1e-6);
    }

    #[test]
    fn red_priority_is_reproducible_with_seed() {
        let image = gray(16, 16, 128);
        let palette = Palette::red_black_white();
        let a = quantize_with_rng(
            &image,
            &palette,
            Policy::RedPriority,
            &mut StdRng::seed_from_u64(7),
        )
        .unwrap();
        let b = quantize_with_rng(
            &image,
            &palette,
            Policy::RedPriority,
            &mut StdRng::seed_from_u64(7),
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn policy_keys() {
        assert_eq!("nearest".parse::<Policy>().unwrap(), Policy::NearestLuminance);
        assert_eq!("red-priority".parse::<Policy>().unwrap(), Policy::RedPriority);
        assert!("sierra".parse::<Policy>().is_err());
        assert_eq!(
            ColorMode::RedBlackWhite.default_policy(),
            Policy::NearestLuminance
        );
    }

    proptest! {
        #[test]
        fn output_only_uses_palette_colors(
            width in 1u32..12,
            height in 1u32..12,
            seed in any::<u64>(),
            red_priority in any::<bool>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let bytes: Vec<u8> = (0..width * height * 3).map(|_| rng.gen()).collect();
            let image = SourceImage::from_rgb(width, height, bytes).unwrap();
            let palette = Palette::red_black_white();
            let policy = if red_priority { Policy::RedPriority } else { Policy::NearestLuminance };
            let out = quantize_with_rng(&image, &palette, policy, &mut rng).unwrap();
            prop_assert_eq!(out.pixels().len(), (width * height) as usize);
            prop_assert!(out.pixels().iter().all(|&px| palette.contains(px)));
        }
    }
}
