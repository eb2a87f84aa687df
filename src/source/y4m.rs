//! YUV4MPEG2 stream reader. Only the luma plane is decoded; chroma and alpha
//! planes are read past.

use std::io::BufRead;

use super::{FrameReader, Input, read_exact, skip_bytes};
use crate::{
    buffer::check_dimensions,
    error::{ForensicsError, Result},
};

const MAGIC: &[u8] = b"YUV4MPEG2 ";
const FRAME: &[u8] = b"FRAME";

#[derive(Debug, Clone, PartialEq)]
struct StreamHeader {
    width: usize,
    height: usize,
    colorspace: String,
}

fn read_line(input: &mut Input, what: &str) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    input.read_until(b'\n', &mut line)?;
    if line.pop() != Some(b'\n') {
        return Err(ForensicsError::invalid_image(format!("unterminated {}", what)));
    }
    Ok(line)
}

fn parse_header(params: &[u8]) -> Result<StreamHeader> {
    let mut width = None;
    let mut height = None;
    let mut colorspace = "420jpeg".to_string();

    for param in params.split(|&b| b == b' ').filter(|p| !p.is_empty()) {
        let value = String::from_utf8_lossy(&param[1..]);
        let number = || {
            value.parse::<usize>().map_err(|_| {
                ForensicsError::invalid_image(format!("bad Y4M parameter {:?}", value))
            })
        };
        match param[0] {
            b'W' => width = Some(number()?),
            b'H' => height = Some(number()?),
            b'C' => colorspace = value.to_string(),
            _ => {}
        }
    }

    match (width, height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => Ok(StreamHeader {
            width,
            height,
            colorspace,
        }),
        _ => Err(ForensicsError::invalid_image(
            "Y4M header lacks non-zero W and H",
        )),
    }
}

/// Samples per frame across all planes, and bit depth, for a colorspace tag.
fn frame_layout(colorspace: &str, width: usize, height: usize) -> Result<(usize, u32)> {
    let invalid = || ForensicsError::invalid_image(format!("unsupported colorspace {}", colorspace));
    let luma = width * height;
    let half_width = width.div_ceil(2);

    let (extra, depth_suffix) = if let Some(suffix) = colorspace.strip_prefix("mono") {
        (0, Some(suffix))
    } else if colorspace == "444alpha" {
        (luma * 3, None)
    } else {
        let (subsampling, suffix) = colorspace.split_at_checked(3).ok_or_else(invalid)?;
        let extra = match subsampling {
            "420" | "411" => half_width * height.div_ceil(2) * 2,
            "422" => half_width * height * 2,
            "444" => luma * 2,
            _ => return Err(invalid()),
        };
        (extra, suffix.strip_prefix('p'))
    };

    let depth = match depth_suffix {
        Some(digits) if digits.starts_with(|c: char| c.is_ascii_digit()) => {
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            digits[..end].parse::<u32>().map_err(|_| invalid())?
        }
        _ => 8,
    };
    if !(8..=16).contains(&depth) {
        return Err(invalid());
    }

    Ok((luma + extra, depth))
}

pub(super) struct Y4mReader {
    input: Input,
    width: usize,
    height: usize,
    depth: u32,
    frame_bytes: usize,
    raster: Vec<u8>,
}

impl Y4mReader {
    pub(super) fn open(mut input: Input) -> Result<Self> {
        let mut magic = [0u8; MAGIC.len()];
        read_exact(&mut input, &mut magic, "Y4M signature")?;
        if magic != MAGIC {
            return Err(ForensicsError::invalid_image("not a YUV4MPEG2 stream"));
        }
        let header = parse_header(&read_line(&mut input, "Y4M header")?)?;
        check_dimensions(header.width, header.height, 4, 1)?;

        let (samples, depth) = frame_layout(&header.colorspace, header.width, header.height)?;
        let bytes_per_sample = if depth > 8 { 2 } else { 1 };
        let frame_bytes = samples
            .checked_mul(bytes_per_sample)
            .ok_or(ForensicsError::TooLarge)?;

        log::debug!(
            "Y4M stream {}x{} C{} ({} bits, {} bytes per frame)",
            header.width,
            header.height,
            header.colorspace,
            depth,
            frame_bytes
        );

        Ok(Self {
            input,
            width: header.width,
            height: header.height,
            depth,
            frame_bytes,
            raster: Vec::new(),
        })
    }

    pub(super) fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn luma_bytes(&self) -> usize {
        self.width * self.height * if self.depth > 8 { 2 } else { 1 }
    }

    /// Consumes a `FRAME` header. `false` at a clean end of stream.
    fn frame_header(&mut self) -> Result<bool> {
        if self.input.fill_buf()?.is_empty() {
            return Ok(false);
        }
        let mut tag = [0u8; FRAME.len()];
        read_exact(&mut self.input, &mut tag, "Y4M frame header")?;
        if tag != FRAME {
            return Err(ForensicsError::invalid_image("expected FRAME"));
        }
        read_line(&mut self.input, "Y4M frame header")?;
        Ok(true)
    }
}

impl FrameReader for Y4mReader {
    fn read_frame(&mut self, frame: &mut [f32]) -> Result<bool> {
        if !self.frame_header()? {
            return Ok(false);
        }

        let luma_bytes = self.luma_bytes();
        self.raster.resize(luma_bytes, 0);
        read_exact(&mut self.input, &mut self.raster, "Y4M frame")?;
        skip_bytes(
            &mut self.input,
            (self.frame_bytes - luma_bytes) as u64,
            "Y4M frame",
        )?;

        let scale = ((1u32 << self.depth) - 1) as f32;
        if self.depth > 8 {
            for (out, v) in frame.iter_mut().zip(self.raster.chunks_exact(2)) {
                *out = u16::from_le_bytes([v[0], v[1]]) as f32 / scale;
            }
        } else {
            for (out, &v) in frame.iter_mut().zip(&self.raster) {
                *out = v as f32 / scale;
            }
        }
        Ok(true)
    }

    fn skip_frame(&mut self) -> Result<bool> {
        if !self.frame_header()? {
            return Ok(false);
        }
        skip_bytes(&mut self.input, self.frame_bytes as u64, "Y4M frame")?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn reader(bytes: Vec<u8>) -> Result<Y4mReader> {
        Y4mReader::open(Box::new(Cursor::new(bytes)))
    }

    #[test]
    fn test_frame_layout() {
        assert_eq!(frame_layout("mono", 4, 4).unwrap(), (16, 8));
        assert_eq!(frame_layout("mono16", 4, 4).unwrap(), (16, 16));
        assert_eq!(frame_layout("420jpeg", 3, 3).unwrap(), (9 + 8, 8));
        assert_eq!(frame_layout("411", 4, 2).unwrap(), (8 + 4, 8));
        assert_eq!(frame_layout("422", 3, 2).unwrap(), (6 + 8, 8));
        assert_eq!(frame_layout("444p10", 2, 2).unwrap(), (12, 10));
        assert_eq!(frame_layout("444alpha", 2, 2).unwrap(), (16, 8));
        assert!(frame_layout("mono4", 2, 2).is_err());
        assert!(frame_layout("420p20", 2, 2).is_err());
        assert!(frame_layout("yuyv", 2, 2).is_err());
        assert!(frame_layout("42", 2, 2).is_err());
    }

    #[test]
    fn test_reads_mono_frames() {
        let mut bytes = b"YUV4MPEG2 W2 H2 F25:1 Cmono\n".to_vec();
        bytes.extend(b"FRAME\n\xff\x00\x00\xff");
        bytes.extend(b"FRAME Ixyz\n\x00\xff\xff\x00");
        let mut y4m = reader(bytes).unwrap();
        assert_eq!(y4m.dimensions(), (2, 2));

        let mut frame = [0.0f32; 4];
        assert!(y4m.read_frame(&mut frame).unwrap());
        assert_eq!(frame, [1.0, 0.0, 0.0, 1.0]);
        assert!(y4m.read_frame(&mut frame).unwrap());
        assert_eq!(frame, [0.0, 1.0, 1.0, 0.0]);
        assert!(!y4m.read_frame(&mut frame).unwrap());
    }

    #[test]
    fn test_skips_chroma_planes() {
        let mut bytes = b"YUV4MPEG2 W2 H2\n".to_vec();
        bytes.extend(b"FRAME\n\xff\xff\xff\xff\x10\x20");
        bytes.extend(b"FRAME\n\x00\x00\x00\x00\x10\x20");
        let mut y4m = reader(bytes).unwrap();
        assert!(y4m.skip_frame().unwrap());
        let mut frame = [1.0f32; 4];
        assert!(y4m.read_frame(&mut frame).unwrap());
        assert_eq!(frame, [0.0; 4]);
        assert!(!y4m.skip_frame().unwrap());
    }

    #[test]
    fn test_reads_high_depth_little_endian() {
        let mut bytes = b"YUV4MPEG2 W2 H1 Cmono16\n".to_vec();
        bytes.extend(b"FRAME\n\xff\xff\x00\x00");
        let mut y4m = reader(bytes).unwrap();
        let mut frame = [0.5f32; 2];
        assert!(y4m.read_frame(&mut frame).unwrap());
        assert_eq!(frame, [1.0, 0.0]);
    }

    #[test]
    fn test_partial_frame_is_invalid() {
        let mut bytes = b"YUV4MPEG2 W2 H2 Cmono\n".to_vec();
        bytes.extend(b"FRAME\n\xff\x00");
        let mut y4m = reader(bytes).unwrap();
        let mut frame = [0.0f32; 4];
        assert!(matches!(
            y4m.read_frame(&mut frame),
            Err(ForensicsError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_rejects_bad_headers() {
        assert!(reader(b"YUV4MPEG2 W2\n".to_vec()).is_err());
        assert!(reader(b"YUV4MPEG2 W0 H2\n".to_vec()).is_err());
        assert!(reader(b"YUV4MPEG2 W2 H2".to_vec()).is_err());
        assert!(reader(b"YUV4MPEG1 W2 H2\n".to_vec()).is_err());
        assert!(reader(b"YUV4MPEG2 Wx H2\n".to_vec()).is_err());
    }
}
