use std::path::Path;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{Analysis, Method},
    buffer::FrameBuffer,
    error::{ForensicsError, Result},
    image_utils::frame_from_image,
    parameters::Parameters,
    source::ImageSource,
};

pub mod analysis;
pub mod buffer;
pub mod error;
pub mod image_utils;
pub mod parameters;
pub mod report;
pub mod source;

pub use analysis::{default_method, find_method, methods};
pub use error::{ErrorKind, error_str};
pub use parameters::default_range;
pub use source::{list_image_readers, read_whole};

/// A candidate dimension. The native dimension carries confidence `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub index: usize,
    pub confidence: f32,
}

impl Resolution {
    pub fn native(length: usize) -> Self {
        Self {
            index: length,
            confidence: -1.0,
        }
    }

    pub fn is_native(&self) -> bool {
        self.confidence < 0.0
    }
}

/// Ranked candidates per axis, most confident first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolutions {
    pub widths: Vec<Resolution>,
    pub heights: Vec<Resolution>,
}

impl Resolutions {
    /// Most likely source dimensions.
    pub fn best(&self) -> Option<(usize, usize)> {
        Some((self.widths.first()?.index, self.heights.first()?.index))
    }

    pub fn is_upsampled(&self) -> bool {
        self.widths.iter().chain(&self.heights).any(|r| !r.is_native())
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

pub fn libversion() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Runs one analysis over `frame_count` frames stored back to back in
/// `samples`.
pub fn detect(
    samples: &[f32],
    frame_count: usize,
    width: usize,
    height: usize,
    method: Option<&'static Method>,
    params: Option<&Parameters>,
) -> Result<Resolutions> {
    if frame_count == 0 {
        return Err(ForensicsError::NoImages);
    }
    let frames = FrameBuffer::wrap(samples, width, height, frame_count)?;
    detect_frames(&frames, method, params)
}

pub fn detect_frames(
    frames: &FrameBuffer<'_>,
    method: Option<&'static Method>,
    params: Option<&Parameters>,
) -> Result<Resolutions> {
    let mut analysis = Analysis::new(method, frames.width(), frames.height(), params)?;
    analysis.ingest(frames)?;
    analysis.extract_results()
}

pub fn detect_image(
    image: &DynamicImage,
    method: Option<&'static Method>,
    params: Option<&Parameters>,
) -> Result<Resolutions> {
    detect_frames(&frame_from_image(image)?, method, params)
}

/// Streams every frame of `path` through one analysis.
pub fn detect_file(
    path: impl AsRef<Path>,
    format_hint: Option<&str>,
    method: Option<&'static Method>,
    params: Option<&Parameters>,
) -> Result<Resolutions> {
    let mut source = ImageSource::open(path, format_hint)?;
    let mut analysis = Analysis::new(method, source.width(), source.height(), params)?;
    let mut frame = source.allocate_frame()?;

    while source.read_frame(&mut frame)? {
        analysis.ingest(&frame)?;
    }
    analysis.extract_results()
}
