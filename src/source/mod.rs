//! Sequential frame sources backed by container readers.

mod decoded;
mod netpbm;
mod pfm;
mod pgm;
mod y4m;

use std::{
    fmt,
    fs::File,
    io::{self, BufRead, BufReader, Cursor, Read},
    ops::ControlFlow,
    path::Path,
};

use image::ImageFormat;

use self::{decoded::DecodedReader, pfm::PfmReader, pgm::PgmReader, y4m::Y4mReader};
use crate::{
    buffer::{FrameBuffer, check_dimensions, check_frame_limits},
    error::{ForensicsError, Result},
};

pub(crate) type Input = Box<dyn BufRead + Send>;

/// Decodes frames from one container stream.
pub trait FrameReader: Send {
    /// Decodes the next frame into `frame`, which holds exactly one frame of
    /// samples. Returns `false` without touching `frame` once the stream is
    /// exhausted.
    fn read_frame(&mut self, frame: &mut [f32]) -> Result<bool>;

    /// Advances past the next frame without decoding it.
    fn skip_frame(&mut self) -> Result<bool>;

    /// Total number of frames, when the container knows it up front.
    fn frame_count_hint(&self) -> Option<usize> {
        None
    }
}

/// Container readers this crate ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReaderKind {
    Pgm,
    Pfm,
    Y4m,
    Image,
}

const READERS: [ReaderKind; 4] = [
    ReaderKind::Pgm,
    ReaderKind::Pfm,
    ReaderKind::Y4m,
    ReaderKind::Image,
];

const READER_NAMES: [&str; 4] = ["PGM", "PFM", "Y4M", "image"];

/// Names accepted by [`ImageSource::open_with_reader`].
pub fn list_image_readers() -> &'static [&'static str] {
    &READER_NAMES
}

impl ReaderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ReaderKind::Pgm => READER_NAMES[0],
            ReaderKind::Pfm => READER_NAMES[1],
            ReaderKind::Y4m => READER_NAMES[2],
            ReaderKind::Image => READER_NAMES[3],
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        READERS
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for ReaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A reader choice plus, for the `image` reader, the format to decode as.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Decoder {
    kind: ReaderKind,
    image_format: Option<ImageFormat>,
}

impl Decoder {
    fn native(kind: ReaderKind) -> Self {
        Self {
            kind,
            image_format: None,
        }
    }

    fn image(format: Option<ImageFormat>) -> Self {
        Self {
            kind: ReaderKind::Image,
            image_format: format,
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pgm" => Some(Self::native(ReaderKind::Pgm)),
            "pfm" => Some(Self::native(ReaderKind::Pfm)),
            "y4m" => Some(Self::native(ReaderKind::Y4m)),
            ext => ImageFormat::from_extension(ext)
                .filter(|f| f.reading_enabled())
                .map(|f| Self::image(Some(f))),
        }
    }

    fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.to_ascii_lowercase().as_str() {
            "image/x-portable-graymap" => Some(Self::native(ReaderKind::Pgm)),
            "image/x-portable-floatmap" | "image/x-portable-float-map" => {
                Some(Self::native(ReaderKind::Pfm))
            }
            "video/yuv4mpeg" => Some(Self::native(ReaderKind::Y4m)),
            mime => ImageFormat::from_mime_type(mime)
                .filter(|f| f.reading_enabled())
                .map(|f| Self::image(Some(f))),
        }
    }

    /// Resolves a caller hint: a MIME type when it contains `/`, otherwise a
    /// file extension.
    fn from_hint(hint: &str) -> Result<Self> {
        let hint = hint.trim().trim_start_matches('.');
        let decoder = if hint.contains('/') {
            Self::from_mime_type(hint)
        } else {
            Self::from_extension(hint)
        };
        decoder.ok_or_else(|| ForensicsError::UnsupportedFormat(hint.to_string()))
    }

    fn sniff(head: &[u8]) -> Option<Self> {
        if head.starts_with(b"P5") {
            Some(Self::native(ReaderKind::Pgm))
        } else if head.starts_with(b"Pf") || head.starts_with(b"PF") {
            Some(Self::native(ReaderKind::Pfm))
        } else if head.starts_with(b"YUV4MPEG2") {
            Some(Self::native(ReaderKind::Y4m))
        } else {
            image::guess_format(head).ok().map(|_| Self::image(None))
        }
    }
}

fn read_exact(input: &mut dyn BufRead, buf: &mut [u8], what: &str) -> Result<()> {
    input.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ForensicsError::invalid_image(format!("truncated {}", what)),
        _ => ForensicsError::Io(e),
    })
}

fn skip_bytes(input: &mut dyn BufRead, count: u64, what: &str) -> Result<()> {
    let skipped = io::copy(&mut input.take(count), &mut io::sink())?;
    if skipped != count {
        return Err(ForensicsError::invalid_image(format!("truncated {}", what)));
    }
    Ok(())
}

fn open_input(path: &Path) -> Result<Input> {
    if path == Path::new("-") {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    Ok(Box::new(BufReader::new(File::open(path)?)))
}

fn open_reader(input: Input, decoder: Decoder) -> Result<(Box<dyn FrameReader>, (usize, usize))> {
    Ok(match decoder.kind {
        ReaderKind::Pgm => {
            let reader = PgmReader::open(input)?;
            let dimensions = reader.dimensions();
            (Box::new(reader) as Box<dyn FrameReader>, dimensions)
        }
        ReaderKind::Pfm => {
            let reader = PfmReader::open(input)?;
            let dimensions = reader.dimensions();
            (Box::new(reader) as Box<dyn FrameReader>, dimensions)
        }
        ReaderKind::Y4m => {
            let reader = Y4mReader::open(input)?;
            let dimensions = reader.dimensions();
            (Box::new(reader) as Box<dyn FrameReader>, dimensions)
        }
        ReaderKind::Image => {
            let reader = DecodedReader::open(input, decoder.image_format)?;
            let dimensions = reader.dimensions();
            (Box::new(reader) as Box<dyn FrameReader>, dimensions)
        }
    })
}

/// A seekable, forward-only stream of equally sized frames.
pub struct ImageSource {
    reader: Option<Box<dyn FrameReader>>,
    kind: ReaderKind,
    width: usize,
    height: usize,
    position: u64,
}

impl ImageSource {
    /// Opens `path` (`-` for standard input). The reader is picked from
    /// `format_hint` (an extension or MIME type), then the path's extension,
    /// then the leading bytes of the stream.
    pub fn open(path: impl AsRef<Path>, format_hint: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let decoder = match format_hint {
            Some(hint) => Some(Decoder::from_hint(hint)?),
            None => path
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(Decoder::from_extension),
        };
        log::debug!("Opening {} (reader {:?})", path.display(), decoder.map(|d| d.kind));
        Self::from_input(open_input(path)?, decoder)
    }

    /// Opens `path` with the reader named `reader` from
    /// [`list_image_readers`].
    pub fn open_with_reader(path: impl AsRef<Path>, reader: &str) -> Result<Self> {
        let kind = ReaderKind::from_name(reader)
            .ok_or_else(|| ForensicsError::Parameter(format!("unknown image reader {:?}", reader)))?;
        Self::from_input(open_input(path.as_ref())?, Some(Decoder::native(kind)))
    }

    /// Reads an in-memory container.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, format_hint: Option<&str>) -> Result<Self> {
        let decoder = format_hint.map(Decoder::from_hint).transpose()?;
        Self::from_input(Box::new(Cursor::new(bytes.into())), decoder)
    }

    /// Reads any buffered stream, sniffing the format when `reader` is not
    /// given.
    pub fn from_reader<R: BufRead + Send + 'static>(input: R, reader: Option<ReaderKind>) -> Result<Self> {
        Self::from_input(Box::new(input), reader.map(Decoder::native))
    }

    fn from_input(mut input: Input, decoder: Option<Decoder>) -> Result<Self> {
        let decoder = match decoder {
            Some(decoder) => decoder,
            None => Decoder::sniff(input.fill_buf()?).ok_or_else(|| {
                ForensicsError::UnsupportedFormat("unrecognized stream contents".into())
            })?,
        };

        let (reader, (width, height)) = open_reader(input, decoder)?;
        check_frame_limits(width, height)?;
        log::debug!("Opened {} source {}x{}", decoder.kind, width, height);

        Ok(Self {
            reader: Some(reader),
            kind: decoder.kind,
            width,
            height,
            position: 0,
        })
    }

    /// Opens `path` and decodes its first frame into `target`. Owned buffers
    /// are resized to a single frame of the source's dimensions; borrowed
    /// buffers must already match.
    pub fn open_into(
        path: impl AsRef<Path>,
        format_hint: Option<&str>,
        target: &mut FrameBuffer<'_>,
    ) -> Result<Self> {
        let mut source = Self::open(path, format_hint)?;
        if target.is_owned() || target.is_released() {
            target.reshape(source.width, source.height, 1)?;
        }
        if !source.read_frame(target)? {
            return Err(ForensicsError::NoImages);
        }
        Ok(source)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn format(&self) -> ReaderKind {
        self.kind
    }

    /// Number of frames consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    pub fn frame_count_hint(&self) -> Option<usize> {
        self.reader.as_ref().and_then(|r| r.frame_count_hint())
    }

    fn reader_mut(&mut self) -> Result<&mut Box<dyn FrameReader>> {
        self.reader
            .as_mut()
            .ok_or_else(|| ForensicsError::Parameter("image source is closed".into()))
    }

    /// A zeroed single-frame buffer of this source's dimensions.
    pub fn allocate_frame(&self) -> Result<FrameBuffer<'static>> {
        if self.is_closed() {
            return Err(ForensicsError::Parameter("image source is closed".into()));
        }
        FrameBuffer::allocate(self.width, self.height, 1)
    }

    fn read_into(&mut self, frame: &mut [f32]) -> Result<bool> {
        let read = self.reader_mut()?.read_frame(frame)?;
        if read {
            self.position += 1;
            log::trace!("Read frame {} from {} source", self.position, self.kind);
        }
        Ok(read)
    }

    /// Decodes the next frame into the first frame of `buffer`.
    pub fn read_frame(&mut self, buffer: &mut FrameBuffer<'_>) -> Result<bool> {
        self.reader_mut()?;
        if buffer.width() != self.width || buffer.height() != self.height {
            return Err(ForensicsError::DimensionMismatch {
                expected_width: self.width,
                expected_height: self.height,
                actual_width: buffer.width(),
                actual_height: buffer.height(),
            });
        }
        self.read_into(buffer.frame_mut(0)?)
    }

    /// Advances until `target` frames have been consumed.
    pub fn seek(&mut self, target: u64) -> Result<bool> {
        self.seek_with_progress(target, |_| ControlFlow::Continue(()))
    }

    /// Like [`seek`](Self::seek), calling `progress` with the new position
    /// after each frame. Returning `ControlFlow::Break` stops the seek with
    /// [`ForensicsError::Cancelled`].
    ///
    /// Returns `false` when `target` lies behind the current position or past
    /// the end of the stream; in the latter case the source is left after the
    /// last frame.
    pub fn seek_with_progress<F>(&mut self, target: u64, mut progress: F) -> Result<bool>
    where
        F: FnMut(u64) -> ControlFlow<()>,
    {
        self.reader_mut()?;
        if target < self.position {
            log::warn!(
                "Cannot seek backwards from frame {} to {}",
                self.position,
                target
            );
            return Ok(false);
        }

        while self.position < target {
            if !self.reader_mut()?.skip_frame()? {
                log::debug!("Stream ended at frame {} before {}", self.position, target);
                return Ok(false);
            }
            self.position += 1;
            if progress(self.position).is_break() {
                log::warn!("Seek to frame {} cancelled at {}", target, self.position);
                return Err(ForensicsError::Cancelled {
                    position: self.position,
                });
            }
        }
        Ok(true)
    }

    /// Iterates over the remaining frames, each in its own buffer.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames {
            source: self,
            done: false,
        }
    }

    /// Releases the underlying reader. Further calls have no effect.
    pub fn close(&mut self) {
        if self.reader.take().is_some() {
            log::debug!(
                "Closed {} source after {} frames",
                self.kind,
                self.position
            );
        }
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSource")
            .field("format", &self.kind)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("position", &self.position)
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub struct Frames<'s> {
    source: &'s mut ImageSource,
    done: bool,
}

impl Iterator for Frames<'_> {
    type Item = Result<FrameBuffer<'static>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.source.allocate_frame().and_then(|mut frame| {
            self.source
                .read_frame(&mut frame)
                .map(|read| read.then_some(frame))
        });
        match result {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Reads every frame of `path` into one buffer.
pub fn read_whole(path: impl AsRef<Path>, format_hint: Option<&str>) -> Result<FrameBuffer<'static>> {
    let mut source = ImageSource::open(path, format_hint)?;
    let (width, height) = (source.width, source.height);
    let frame_len = width * height;

    let mut samples: Vec<f32> = Vec::new();
    if let Some(hint) = source.frame_count_hint() {
        let len = check_dimensions(width, height, hint, size_of::<f32>())?;
        samples
            .try_reserve_exact(len)
            .map_err(|_| ForensicsError::OutOfMemory)?;
    }

    let mut frames = 0;
    loop {
        check_dimensions(width, height, frames + 1, size_of::<f32>())?;
        samples
            .try_reserve(frame_len)
            .map_err(|_| ForensicsError::OutOfMemory)?;
        let start = samples.len();
        samples.resize(start + frame_len, 0.0);
        if !source.read_into(&mut samples[start..])? {
            samples.truncate(start);
            break;
        }
        frames += 1;
    }
    source.close();

    log::debug!("Read {} frames of {}x{}", frames, width, height);
    FrameBuffer::from_vec(samples, width, height, frames)
}
