//! Still images decoded through the `image` crate. Always a single frame.

use std::io::{Cursor, Read};

use image::{ImageFormat, ImageReader};

use super::{FrameReader, Input};
use crate::{
    error::{ForensicsError, Result},
    image_utils::luma_samples,
};

pub(super) struct DecodedReader {
    width: usize,
    height: usize,
    frame: Option<Vec<f32>>,
}

impl DecodedReader {
    pub(super) fn open(mut input: Input, format: Option<ImageFormat>) -> Result<Self> {
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;

        let reader = match format {
            Some(format) => ImageReader::with_format(Cursor::new(bytes), format),
            None => ImageReader::new(Cursor::new(bytes)).with_guessed_format()?,
        };
        let format = reader
            .format()
            .ok_or_else(|| ForensicsError::invalid_image("unrecognized image data"))?;

        let image = reader.decode()?;
        log::debug!(
            "Decoded {:?} image {}x{}",
            format,
            image.width(),
            image.height()
        );

        Ok(Self {
            width: image.width() as usize,
            height: image.height() as usize,
            frame: Some(luma_samples(&image)),
        })
    }

    pub(super) fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

impl FrameReader for DecodedReader {
    fn read_frame(&mut self, frame: &mut [f32]) -> Result<bool> {
        match self.frame.take() {
            Some(samples) => {
                frame.copy_from_slice(&samples);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn skip_frame(&mut self) -> Result<bool> {
        Ok(self.frame.take().is_some())
    }

    fn frame_count_hint(&self) -> Option<usize> {
        Some(1)
    }
}
