use std::str::FromStr;

use crate::error::Error;

/// Target display geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Epd2in7b, // 264x176
    Epd2in9b, // 296x128
    Epd4in2b, // 400x300
    Epd7in5b, // 800x480
    Custom { width: u32, height: u32 },
}

impl Panel {
    pub const PRESETS: [Panel; 4] = [
        Panel::Epd2in7b,
        Panel::Epd2in9b,
        Panel::Epd4in2b,
        Panel::Epd7in5b,
    ];

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Epd2in7b => (264, 176),
            Self::Epd2in9b => (296, 128),
            Self::Epd4in2b => (400, 300),
            Self::Epd7in5b => (800, 480),
            Self::Custom { width, height } => (*width, *height),
        }
    }

    pub fn width(&self) -> u32 {
        self.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.dimensions().1
    }

    pub fn aspect_ratio(&self) -> f64 {
        let (w, h) = self.dimensions();
        w as f64 / h as f64
    }

    pub fn is_landscape(&self) -> bool {
        let (w, h) = self.dimensions();
        w >= h
    }
}

impl Default for Panel {
    fn default() -> Self {
        Self::Epd2in9b
    }
}

impl FromStr for Panel {
    type Err = Error;

    /// Accepts a preset name or `WIDTHxHEIGHT`.
    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_lowercase().as_str() {
            "2in7b" => Ok(Self::Epd2in7b),
            "2in9b" => Ok(Self::Epd2in9b),
            "4in2b" => Ok(Self::Epd4in2b),
            "7in5b" => Ok(Self::Epd7in5b),
            other => {
                let mut parts = other.splitn(2, 'x');
                let width = parts.next().and_then(|w| w.parse::<u32>().ok());
                let height = parts.next().and_then(|h| h.parse::<u32>().ok());
                match (width, height) {
                    (Some(width), Some(height)) if width > 0 && height > 0 => {
                        Ok(Self::Custom { width, height })
                    }
                    _ => Err(Error::UnknownPanel(s.to_string())),
                }
            }
        }
    }
}
