//! Glue to the `image` crate: decoding, fitting to the panel and saving.

use std::path::Path;

use image::{imageops::FilterType, GenericImageView, RgbImage};
use log::info;

use crate::{
    error::{Error, Result},
    panel::Panel,
    raster::{QuantizedImage, SourceImage},
};

/// Decode `path` and resize it to fill the panel.
///
/// A portrait image on a landscape panel (or the reverse) is filled to the
/// transposed panel size; the plane encoder rotates it afterwards.
pub fn load(path: &Path, panel: Panel) -> Result<SourceImage> {
    let img = image::open(path)?;
    let (width, height) = img.dimensions();
    info!("Opened image {} ({}x{})", path.display(), width, height);

    let mismatched = if panel.is_landscape() {
        width < height
    } else {
        width > height
    };
    let (target_w, target_h) = if mismatched {
        (panel.height(), panel.width())
    } else {
        (panel.width(), panel.height())
    };

    let img = img.resize_to_fill(target_w, target_h, FilterType::Lanczos3);
    info!("Resized to {}x{}", target_w, target_h);
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    SourceImage::from_rgb(width, height, rgb.into_raw())
}

/// Write a quantized image, format picked from the extension.
pub fn save(image: &QuantizedImage, path: &Path) -> Result<()> {
    let buffer = RgbImage::from_raw(image.width(), image.height(), image.to_rgb_bytes()).ok_or(
        Error::UnsupportedGeometry {
            width: image.width(),
            height: image.height(),
        },
    )?;
    buffer.save(path)?;
    info!("Saved {}", path.display());
    Ok(())
}
