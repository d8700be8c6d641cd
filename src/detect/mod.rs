use std::cell::Cell;
use std::io::Cursor;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::DataLayout;
use crate::geometry::NormalizedBox;

mod command;
mod precomputed;

pub use command::CommandDetector;
pub use precomputed::PrecomputedDetector;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateUnits {
    #[default]
    Normalized,
    Pixels,
}

/// One box as reported by a detection backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    #[serde(default)]
    pub units: CoordinateUnits,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub text: Option<String>,
}

impl RawDetection {
    pub fn to_normalized(&self, image: &PhotoImage) -> Result<NormalizedBox> {
        match self.units {
            CoordinateUnits::Normalized => {
                Ok(NormalizedBox::new(self.x, self.y, self.w, self.h).clamped())
            }
            CoordinateUnits::Pixels => {
                let (width, height) = image.dimensions()?;
                NormalizedBox::from_pixels(self.x, self.y, self.w, self.h, width, height)
            }
        }
    }
}

/// Raw photo bytes handed to detectors. Dimensions are decoded on first use.
pub struct PhotoImage {
    bytes: Vec<u8>,
    dimensions: Cell<Option<(u32, u32)>>,
}

impl PhotoImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            dimensions: Cell::new(None),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dimensions(&self) -> Result<(u32, u32)> {
        if let Some(dimensions) = self.dimensions.get() {
            return Ok(dimensions);
        }

        let dimensions = image::io::Reader::new(Cursor::new(&self.bytes))
            .with_guessed_format()
            .context("failed to sniff image format")?
            .into_dimensions()
            .context("failed to read image dimensions")?;
        self.dimensions.set(Some(dimensions));
        Ok(dimensions)
    }
}

pub trait Detector {
    fn describe(&self) -> String;

    fn detect(&self, image: &PhotoImage) -> Result<Vec<RawDetection>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorConfig {
    Precomputed {
        path: PathBuf,
    },
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Disabled,
}

/// Builds the configured backend once per run. `Ok(None)` means the dimension
/// is switched off by configuration.
pub fn build_detector(
    config: &DetectorConfig,
    layout: &DataLayout,
) -> Result<Option<Box<dyn Detector>>> {
    match config {
        DetectorConfig::Precomputed { path } => {
            let detector = PrecomputedDetector::load(&layout.resolve(path))?;
            Ok(Some(Box::new(detector)))
        }
        DetectorConfig::Command { program, args } => {
            let detector = CommandDetector::new(program, args)?;
            Ok(Some(Box::new(detector)))
        }
        DetectorConfig::Disabled => Ok(None),
    }
}
