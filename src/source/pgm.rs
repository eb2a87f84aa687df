//! Binary graymap (`P5`) reader. Several images may be concatenated in one
//! stream; each is one frame.

use super::{FrameReader, Input, netpbm, read_exact, skip_bytes};
use crate::error::{ForensicsError, Result};

pub(super) struct PgmReader {
    input: Input,
    width: usize,
    height: usize,
    maxval: u16,
    header_consumed: bool,
    raster: Vec<u8>,
}

struct Header {
    width: usize,
    height: usize,
    maxval: u16,
}

fn read_header(input: &mut Input) -> Result<Header> {
    if &netpbm::magic(input)? != b"P5" {
        return Err(ForensicsError::invalid_image("not a binary PGM"));
    }
    let (width, height) = netpbm::dimensions(input)?;
    let maxval = netpbm::field::<u16>(input, "maxval")?;
    if maxval == 0 {
        return Err(ForensicsError::invalid_image("PGM maxval must be non-zero"));
    }
    netpbm::end_of_header(input)?;
    Ok(Header {
        width,
        height,
        maxval,
    })
}

impl PgmReader {
    pub(super) fn open(mut input: Input) -> Result<Self> {
        let header = read_header(&mut input)?;
        Ok(Self {
            input,
            width: header.width,
            height: header.height,
            maxval: header.maxval,
            header_consumed: true,
            raster: Vec::new(),
        })
    }

    pub(super) fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn sample_size(&self) -> usize {
        if self.maxval > 255 { 2 } else { 1 }
    }

    /// Positions the input at the next raster. `false` at a clean end of
    /// stream.
    fn next_header(&mut self) -> Result<bool> {
        if self.header_consumed {
            return Ok(true);
        }
        if netpbm::at_end(&mut self.input)? {
            return Ok(false);
        }
        let header = read_header(&mut self.input)?;
        if (header.width, header.height) != (self.width, self.height) {
            return Err(ForensicsError::invalid_image(format!(
                "concatenated PGM is {}x{}, expected {}x{}",
                header.width, header.height, self.width, self.height
            )));
        }
        self.maxval = header.maxval;
        self.header_consumed = true;
        Ok(true)
    }
}

impl FrameReader for PgmReader {
    fn read_frame(&mut self, frame: &mut [f32]) -> Result<bool> {
        if !self.next_header()? {
            return Ok(false);
        }

        let sample_size = self.sample_size();
        self.raster.resize(frame.len() * sample_size, 0);
        read_exact(&mut self.input, &mut self.raster, "PGM raster")?;
        self.header_consumed = false;

        let scale = self.maxval as f32;
        if sample_size == 1 {
            for (out, &v) in frame.iter_mut().zip(&self.raster) {
                *out = v as f32 / scale;
            }
        } else {
            for (out, v) in frame.iter_mut().zip(self.raster.chunks_exact(2)) {
                *out = u16::from_be_bytes([v[0], v[1]]) as f32 / scale;
            }
        }
        Ok(true)
    }

    fn skip_frame(&mut self) -> Result<bool> {
        if !self.next_header()? {
            return Ok(false);
        }
        let len = (self.width * self.height * self.sample_size()) as u64;
        skip_bytes(&mut self.input, len, "PGM raster")?;
        self.header_consumed = false;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn reader(bytes: &[u8]) -> Result<PgmReader> {
        PgmReader::open(Box::new(Cursor::new(bytes.to_vec())))
    }

    #[test]
    fn test_reads_8bit_raster() {
        let mut pgm = reader(b"P5\n2 2\n255\n\xff\x00\x00\xff").unwrap();
        assert_eq!(pgm.dimensions(), (2, 2));
        let mut frame = [0.5f32; 4];
        assert!(pgm.read_frame(&mut frame).unwrap());
        assert_eq!(frame, [1.0, 0.0, 0.0, 1.0]);
        assert!(!pgm.read_frame(&mut frame).unwrap());
    }

    #[test]
    fn test_reads_16bit_big_endian_raster() {
        let mut pgm = reader(b"P5 2 1 65535\n\xff\xff\x00\x00").unwrap();
        let mut frame = [0.5f32; 2];
        assert!(pgm.read_frame(&mut frame).unwrap());
        assert_eq!(frame, [1.0, 0.0]);
    }

    #[test]
    fn test_reads_concatenated_images() {
        let mut pgm =
            reader(b"P5\n2 1\n255\n\xff\x00P5\n# second\n2 1\n1\n\x00\x01\n").unwrap();
        let mut frame = [0.0f32; 2];
        assert!(pgm.read_frame(&mut frame).unwrap());
        assert_eq!(frame, [1.0, 0.0]);
        assert!(pgm.read_frame(&mut frame).unwrap());
        assert_eq!(frame, [0.0, 1.0]);
        assert!(!pgm.read_frame(&mut frame).unwrap());
    }

    #[test]
    fn test_skips_frames() {
        let mut pgm = reader(b"P5\n2 1\n255\n\xff\x00P5\n2 1\n255\n\x00\xff").unwrap();
        assert!(pgm.skip_frame().unwrap());
        let mut frame = [0.0f32; 2];
        assert!(pgm.read_frame(&mut frame).unwrap());
        assert_eq!(frame, [0.0, 1.0]);
        assert!(!pgm.skip_frame().unwrap());
    }

    #[test]
    fn test_rejects_bad_headers() {
        assert!(matches!(
            reader(b"P6\n2 2\n255\n"),
            Err(ForensicsError::InvalidImage(_))
        ));
        assert!(reader(b"P5\n2 2\n0\n").is_err());
        assert!(reader(b"P5\n2").is_err());
    }

    #[test]
    fn test_truncated_raster_is_invalid() {
        let mut pgm = reader(b"P5\n2 2\n255\n\xff").unwrap();
        let mut frame = [0.0f32; 4];
        assert!(matches!(
            pgm.read_frame(&mut frame),
            Err(ForensicsError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_mismatched_concatenated_image_is_invalid() {
        let mut pgm = reader(b"P5\n1 1\n255\n\xffP5\n2 1\n255\n\x00\x00").unwrap();
        let mut frame = [0.0f32; 1];
        assert!(pgm.read_frame(&mut frame).unwrap());
        assert!(pgm.read_frame(&mut frame).is_err());
    }
}
