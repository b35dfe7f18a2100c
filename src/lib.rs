//! Multi-color e-paper frame preparation and serial upload
//!
//! This crate dithers an image down to the colors of a black/white/red
//! e-paper panel, splits the result into the two bitplanes the panel
//! controller expects and sends them over a serial link.
//!
//! # Example
//!
//! ```rust,no_run
//! use epd_link::{ColorMode, Panel, SessionConfig, SourceImage, TransferSession};
//!
//! let source = SourceImage::from_luma(296, 128, vec![200; 296 * 128]).unwrap();
//! let mode = ColorMode::RedBlackWhite;
//! let (_, planes) = epd_link::convert(&source, mode, mode.default_policy(), Panel::Epd2in9b).unwrap();
//!
//! let config = SessionConfig::new("/dev/ttyUSB0".to_string());
//! let mut session = TransferSession::open(config).unwrap();
//! session.send(planes.primary.as_bytes(), planes.secondary.as_bytes()).unwrap();
//! ```

mod error;
pub mod imaging;
mod link;
mod palette;
mod panel;
mod plane;
mod quantize;
mod raster;
mod session;

pub use crate::{
    error::{Error, Result},
    link::{Link, SerialLink},
    palette::{ColorMode, Palette, PaletteEntry, Rgb},
    panel::Panel,
    plane::{preview, unpack, BitPlane, EncodedPlanes, PackedPlane, PlaneEncoder},
    quantize::{quantize, quantize_with_rng, Policy},
    raster::{QuantizedImage, SourceImage},
    session::{
        checksum, Outcome, Plane, Progress, SessionConfig, SessionState, TransferSession,
        CHUNK_SIZE, DEFAULT_BAUD_RATE, HANDSHAKE,
    },
};

/// Dither `source` for `mode` and encode it for `panel`.
///
/// Returns the dithered image alongside the planes so callers can save or
/// preview it. Fails with [`Error::InvalidChunkLength`] when the planes could
/// not be framed into 16 byte chunks, before any port is touched.
pub fn convert(
    source: &SourceImage,
    mode: ColorMode,
    policy: Policy,
    panel: Panel,
) -> Result<(QuantizedImage, EncodedPlanes)> {
    let dithered = quantize(source, &mode.palette(), policy)?;
    let planes = PlaneEncoder::new(panel).encode(dithered.clone())?;
    if planes.primary.len() % CHUNK_SIZE != 0 {
        return Err(Error::InvalidChunkLength(planes.primary.len()));
    }
    Ok((dithered, planes))
}

/// Ramp test planes: `i % 256` and its inverse, 256 bytes each.
pub fn test_pattern() -> (Vec<u8>, Vec<u8>) {
    let primary: Vec<u8> = (0..256).map(|i| (i % 256) as u8).collect();
    let secondary = primary.iter().map(|b| 255 - b).collect();
    (primary, secondary)
}
