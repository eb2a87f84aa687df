//! Portable float map reader.
//!
//! `Pf` holds one gray channel, `PF` packed RGB which is averaged to gray.
//! Rows are stored bottom to top; a negative scale marks little-endian
//! samples. Concatenated maps must share their dimensions.

use super::{FrameReader, Input, netpbm, read_exact, skip_bytes};
use crate::error::{ForensicsError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Header {
    channels: usize,
    width: usize,
    height: usize,
    little_endian: bool,
}

fn read_header(input: &mut Input) -> Result<Header> {
    let channels = match &netpbm::magic(input)? {
        b"Pf" => 1,
        b"PF" => 3,
        _ => return Err(ForensicsError::invalid_image("not a PFM")),
    };
    let (width, height) = netpbm::dimensions(input)?;
    let scale = netpbm::field::<f32>(input, "scale")?;
    if !scale.is_finite() {
        return Err(ForensicsError::invalid_image("PFM scale must be finite"));
    }
    netpbm::end_of_header(input)?;
    Ok(Header {
        channels,
        width,
        height,
        little_endian: scale < 0.0,
    })
}

pub(super) struct PfmReader {
    input: Input,
    header: Header,
    header_consumed: bool,
    row: Vec<u8>,
}

impl PfmReader {
    pub(super) fn open(mut input: Input) -> Result<Self> {
        let header = read_header(&mut input)?;
        Ok(Self {
            input,
            header,
            header_consumed: true,
            row: Vec::new(),
        })
    }

    pub(super) fn dimensions(&self) -> (usize, usize) {
        (self.header.width, self.header.height)
    }

    fn next_header(&mut self) -> Result<bool> {
        if self.header_consumed {
            return Ok(true);
        }
        if netpbm::at_end(&mut self.input)? {
            return Ok(false);
        }
        let header = read_header(&mut self.input)?;
        if (header.width, header.height) != self.dimensions() {
            return Err(ForensicsError::invalid_image(format!(
                "concatenated PFM is {}x{}, expected {}x{}",
                header.width, header.height, self.header.width, self.header.height
            )));
        }
        self.header = header;
        self.header_consumed = true;
        Ok(true)
    }

    fn raster_len(&self) -> usize {
        self.header.width * self.header.height * self.header.channels * size_of::<f32>()
    }
}

impl FrameReader for PfmReader {
    fn read_frame(&mut self, frame: &mut [f32]) -> Result<bool> {
        if !self.next_header()? {
            return Ok(false);
        }

        let Header {
            channels,
            width,
            height,
            little_endian,
        } = self.header;
        let decode: fn([u8; 4]) -> f32 = if little_endian {
            f32::from_le_bytes
        } else {
            f32::from_be_bytes
        };

        self.row.resize(width * channels * size_of::<f32>(), 0);
        for y in (0..height).rev() {
            read_exact(&mut self.input, &mut self.row, "PFM raster")?;
            let out = &mut frame[y * width..(y + 1) * width];
            for (sample, pixel) in out
                .iter_mut()
                .zip(self.row.chunks_exact(channels * size_of::<f32>()))
            {
                let sum = pixel
                    .chunks_exact(size_of::<f32>())
                    .map(|b| decode([b[0], b[1], b[2], b[3]]))
                    .sum::<f32>();
                *sample = sum / channels as f32;
            }
        }

        self.header_consumed = false;
        Ok(true)
    }

    fn skip_frame(&mut self) -> Result<bool> {
        if !self.next_header()? {
            return Ok(false);
        }
        let len = self.raster_len() as u64;
        skip_bytes(&mut self.input, len, "PFM raster")?;
        self.header_consumed = false;
        Ok(true)
    }
}
