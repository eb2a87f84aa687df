//! Dimensioned sample storage shared by image sources and analyses.
//!
//! A [`FrameBuffer`] holds `width * height * frame_count` single-precision
//! samples, planar and row-major, with frames stacked one after another. The
//! storage is either owned by the buffer or borrowed from the caller; borrowed
//! memory is never freed by the buffer.

use ndarray::ArrayView3;

use crate::error::{ForensicsError, Result};

enum Storage<'a> {
    Owned(Vec<f32>),
    Borrowed(&'a [f32]),
    BorrowedMut(&'a mut [f32]),
    Released,
}

pub struct FrameBuffer<'a> {
    width: usize,
    height: usize,
    frames: usize,
    storage: Storage<'a>,
}

/// Fails with `TooLarge` when `width * height * frames` elements of
/// `element_size` bytes cannot be addressed.
pub(crate) fn check_dimensions(
    width: usize,
    height: usize,
    frames: usize,
    element_size: usize,
) -> Result<usize> {
    let count = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(frames))
        .ok_or(ForensicsError::TooLarge)?;
    match count.checked_mul(element_size) {
        Some(bytes) if bytes <= isize::MAX as usize => Ok(count),
        _ => Err(ForensicsError::TooLarge),
    }
}

/// Longest frame side accepted for analysis.
pub const MAX_DIMENSION: usize = 1 << 20;

/// Most samples accepted in a single frame for analysis.
pub const MAX_FRAME_SAMPLES: usize = 1 << 28;

/// Fails with `TooLarge` when one `width x height` frame is beyond what the
/// engine analyzes. Returns the frame's sample count.
pub(crate) fn check_frame_limits(width: usize, height: usize) -> Result<usize> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ForensicsError::TooLarge);
    }
    let len = check_dimensions(width, height, 1, size_of::<f32>())?;
    if len > MAX_FRAME_SAMPLES {
        return Err(ForensicsError::TooLarge);
    }
    Ok(len)
}

/// Allocates `len` copies of `value`, reporting allocation failure instead of
/// aborting.
pub(crate) fn try_alloc<T: Clone>(len: usize, value: T) -> Result<Vec<T>> {
    let mut vec = Vec::new();
    vec.try_reserve_exact(len)
        .map_err(|_| ForensicsError::OutOfMemory)?;
    vec.resize(len, value);
    Ok(vec)
}

fn check_nonzero(width: usize, height: usize) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(ForensicsError::invalid_image(format!(
            "image dimensions must be non-zero, got {}x{}",
            width, height
        )));
    }
    Ok(())
}

fn check_len(len: usize, width: usize, height: usize, frames: usize) -> Result<()> {
    let expected = check_dimensions(width, height, frames, size_of::<f32>())?;
    if len != expected {
        return Err(ForensicsError::invalid_image(format!(
            "buffer holds {} samples, {}x{}x{} requires {}",
            len, width, height, frames, expected
        )));
    }
    Ok(())
}

impl FrameBuffer<'static> {
    /// Allocates a zero-filled buffer owned by the engine.
    pub fn allocate(width: usize, height: usize, frames: usize) -> Result<Self> {
        check_nonzero(width, height)?;
        let len = check_dimensions(width, height, frames, size_of::<f32>())?;
        Ok(Self {
            width,
            height,
            frames,
            storage: Storage::Owned(try_alloc(len, 0.0)?),
        })
    }

    /// Takes ownership of existing samples.
    pub fn from_vec(samples: Vec<f32>, width: usize, height: usize, frames: usize) -> Result<Self> {
        check_nonzero(width, height)?;
        check_len(samples.len(), width, height, frames)?;
        Ok(Self {
            width,
            height,
            frames,
            storage: Storage::Owned(samples),
        })
    }
}

impl<'a> FrameBuffer<'a> {
    /// Borrows caller-managed samples without copying.
    pub fn wrap(samples: &'a [f32], width: usize, height: usize, frames: usize) -> Result<Self> {
        check_nonzero(width, height)?;
        check_len(samples.len(), width, height, frames)?;
        Ok(Self {
            width,
            height,
            frames,
            storage: Storage::Borrowed(samples),
        })
    }

    /// Borrows caller-managed samples mutably, so sources can decode into them.
    pub fn wrap_mut(
        samples: &'a mut [f32],
        width: usize,
        height: usize,
        frames: usize,
    ) -> Result<Self> {
        check_nonzero(width, height)?;
        check_len(samples.len(), width, height, frames)?;
        Ok(Self {
            width,
            height,
            frames,
            storage: Storage::BorrowedMut(samples),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    /// Samples per frame.
    pub fn frame_len(&self) -> usize {
        self.width * self.height
    }

    /// `(width, height)` for single-frame buffers, `(width, height, frames)`
    /// otherwise.
    pub fn shape(&self) -> Vec<usize> {
        if self.frames > 1 {
            vec![self.width, self.height, self.frames]
        } else {
            vec![self.width, self.height]
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    pub fn is_released(&self) -> bool {
        matches!(self.storage, Storage::Released)
    }

    pub fn as_slice(&self) -> &[f32] {
        match &self.storage {
            Storage::Owned(samples) => samples.as_slice(),
            Storage::Borrowed(samples) => *samples,
            Storage::BorrowedMut(samples) => &**samples,
            Storage::Released => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> Result<&mut [f32]> {
        match &mut self.storage {
            Storage::Owned(samples) => Ok(samples.as_mut_slice()),
            Storage::BorrowedMut(samples) => Ok(&mut **samples),
            Storage::Borrowed(_) => Err(ForensicsError::Parameter(
                "frame buffer is a read-only view".into(),
            )),
            Storage::Released => Err(ForensicsError::Parameter(
                "frame buffer has been released".into(),
            )),
        }
    }

    pub fn frame(&self, index: usize) -> Result<&[f32]> {
        let len = self.frame_len();
        self.frame_range(index)
            .map(|start| &self.as_slice()[start..start + len])
    }

    pub fn frame_mut(&mut self, index: usize) -> Result<&mut [f32]> {
        let len = self.frame_len();
        let start = self.frame_range(index)?;
        Ok(&mut self.as_mut_slice()?[start..start + len])
    }

    fn frame_range(&self, index: usize) -> Result<usize> {
        let out_of_range = || ForensicsError::IndexOutOfRange {
            index: format!("frame {}", index),
            size: format!("{} frames", self.frames),
        };
        if index >= self.frames {
            return Err(out_of_range());
        }
        // `index < frames` keeps this within the size checked at construction.
        let start = index * self.frame_len();
        if start + self.frame_len() > self.len() {
            return Err(out_of_range());
        }
        Ok(start)
    }

    pub fn frames(&self) -> impl Iterator<Item = &[f32]> {
        self.as_slice().chunks_exact(self.frame_len())
    }

    pub fn index(&self, x: usize, y: usize, frame: usize) -> Result<f32> {
        if x >= self.width || y >= self.height || frame >= self.frames {
            return Err(ForensicsError::IndexOutOfRange {
                index: format!("({}, {}, {})", x, y, frame),
                size: format!("{}x{}x{}", self.width, self.height, self.frames),
            });
        }
        self.index_linear(frame * self.frame_len() + y * self.width + x)
    }

    pub fn index_linear(&self, index: usize) -> Result<f32> {
        self.as_slice()
            .get(index)
            .copied()
            .ok_or_else(|| ForensicsError::IndexOutOfRange {
                index: index.to_string(),
                size: self.len().to_string(),
            })
    }

    /// Array view shaped `(frames, height, width)`.
    pub fn view(&self) -> Result<ArrayView3<'_, f32>> {
        ArrayView3::from_shape((self.frames, self.height, self.width), self.as_slice())
            .map_err(|e| ForensicsError::Internal(e.to_string()))
    }

    /// Changes the dimensions of an owned buffer in place, reusing its
    /// allocation. Borrowed buffers can only be "reshaped" to their current
    /// dimensions.
    pub(crate) fn reshape(&mut self, width: usize, height: usize, frames: usize) -> Result<()> {
        check_nonzero(width, height)?;
        let len = check_dimensions(width, height, frames, size_of::<f32>())?;
        match &mut self.storage {
            Storage::Owned(samples) => {
                if len > samples.len() {
                    samples
                        .try_reserve_exact(len - samples.len())
                        .map_err(|_| ForensicsError::OutOfMemory)?;
                }
                samples.resize(len, 0.0);
            }
            Storage::Released => {
                self.storage = Storage::Owned(try_alloc(len, 0.0)?);
            }
            Storage::Borrowed(_) | Storage::BorrowedMut(_) => {
                if (self.width, self.height, self.frames) != (width, height, frames) {
                    return Err(ForensicsError::DimensionMismatch {
                        expected_width: width,
                        expected_height: height,
                        actual_width: self.width,
                        actual_height: self.height,
                    });
                }
            }
        }
        self.width = width;
        self.height = height;
        self.frames = frames;
        Ok(())
    }

    /// Frees owned samples or detaches borrowed ones. Calling this more than
    /// once has no further effect.
    pub fn release(&mut self) {
        if !self.is_released() {
            log::trace!(
                "Releasing {}x{}x{} frame buffer (owned: {})",
                self.width,
                self.height,
                self.frames,
                self.is_owned()
            );
        }
        self.storage = Storage::Released;
    }
}

impl std::fmt::Debug for FrameBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("frames", &self.frames)
            .field("owned", &self.is_owned())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard() -> FrameBuffer<'static> {
        FrameBuffer::from_vec(vec![1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0], 2, 2, 2).unwrap()
    }

    #[test]
    fn test_allocate_zero_fills() {
        let buffer = FrameBuffer::allocate(3, 2, 2).unwrap();
        assert_eq!(buffer.len(), 12);
        assert!(buffer.as_slice().iter().all(|&v| v == 0.0));
        assert!(buffer.is_owned());
    }

    #[test]
    fn test_allocate_rejects_zero_dimensions() {
        let err = FrameBuffer::allocate(0, 4, 1).unwrap_err();
        assert!(matches!(err, ForensicsError::InvalidImage(_)));
    }

    #[test]
    fn test_allocate_rejects_overflowing_dimensions() {
        let err = FrameBuffer::allocate(usize::MAX, usize::MAX, 1).unwrap_err();
        assert!(matches!(err, ForensicsError::TooLarge));
    }

    #[test]
    fn test_frame_limits() {
        assert_eq!(check_frame_limits(640, 480).unwrap(), 640 * 480);
        assert_eq!(check_frame_limits(MAX_DIMENSION, 1).unwrap(), MAX_DIMENSION);
        assert!(matches!(
            check_frame_limits(MAX_DIMENSION + 1, 1),
            Err(ForensicsError::TooLarge)
        ));
        assert!(matches!(
            check_frame_limits(1 << 15, 1 << 14),
            Err(ForensicsError::TooLarge)
        ));
        assert!(check_frame_limits(1 << 14, 1 << 14).is_ok());
    }

    #[test]
    fn test_wrap_requires_exact_length() {
        let samples = [0.0f32; 5];
        assert!(FrameBuffer::wrap(&samples, 2, 2, 1).is_err());
        assert!(FrameBuffer::wrap(&samples[..4], 2, 2, 1).is_ok());
    }

    #[test]
    fn test_indexes_by_coordinates() {
        let buffer = checkerboard();
        assert_eq!(buffer.index(1, 1, 0).unwrap(), 1.0);
        assert_eq!(buffer.index(1, 0, 1).unwrap(), 1.0);
        assert_eq!(buffer.index(0, 0, 1).unwrap(), 0.0);
    }

    #[test]
    fn test_rejects_out_of_range_indices() {
        let buffer = checkerboard();
        assert!(matches!(
            buffer.index(2, 0, 0),
            Err(ForensicsError::IndexOutOfRange { .. })
        ));
        assert!(buffer.index(0, 2, 0).is_err());
        assert!(buffer.index(0, 0, 2).is_err());
        assert_eq!(buffer.index_linear(0).unwrap(), 1.0);
        assert!(buffer.index_linear(8).is_err());
        assert!(buffer.index(usize::MAX, usize::MAX, usize::MAX).is_err());
    }

    #[test]
    fn test_rejects_huge_frame_index() {
        let mut buffer = FrameBuffer::allocate(2, 2, 1).unwrap();
        assert!(matches!(
            buffer.frame(usize::MAX),
            Err(ForensicsError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            buffer.frame_mut(usize::MAX),
            Err(ForensicsError::IndexOutOfRange { .. })
        ));
        assert!(buffer.frame(1).is_err());
    }

    #[test]
    fn test_shape_omits_single_frame_count() {
        assert_eq!(checkerboard().shape(), vec![2, 2, 2]);
        assert_eq!(FrameBuffer::allocate(2, 3, 1).unwrap().shape(), vec![2, 3]);
    }

    #[test]
    fn test_view_is_frame_major() {
        let buffer = checkerboard();
        let view = buffer.view().unwrap();
        assert_eq!(view.dim(), (2, 2, 2));
        assert_eq!(view[[1, 0, 1]], 1.0);
        assert_eq!(view[[0, 1, 0]], 0.0);
    }

    #[test]
    fn test_read_only_view_cannot_be_written() {
        let samples = [0.0f32; 4];
        let mut buffer = FrameBuffer::wrap(&samples, 2, 2, 1).unwrap();
        assert!(matches!(
            buffer.frame_mut(0),
            Err(ForensicsError::Parameter(_))
        ));
    }

    #[test]
    fn test_mutable_view_writes_through() {
        let mut samples = [0.0f32; 4];
        {
            let mut buffer = FrameBuffer::wrap_mut(&mut samples, 2, 2, 1).unwrap();
            buffer.frame_mut(0).unwrap()[3] = 0.5;
        }
        assert_eq!(samples[3], 0.5);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut buffer = checkerboard();
        buffer.release();
        buffer.release();
        assert!(buffer.is_released());
        assert!(buffer.is_empty());
        assert!(buffer.index_linear(0).is_err());
    }

    #[test]
    fn test_release_leaves_borrowed_samples_alone() {
        let samples = vec![0.25f32; 4];
        let mut buffer = FrameBuffer::wrap(&samples, 2, 2, 1).unwrap();
        buffer.release();
        assert_eq!(samples, vec![0.25; 4]);
    }

    #[test]
    fn test_reshape_reuses_owned_storage() {
        let mut buffer = FrameBuffer::allocate(1, 1, 1).unwrap();
        buffer.reshape(3, 2, 1).unwrap();
        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer.width(), 3);
    }

    #[test]
    fn test_frames_iterates_each_frame() {
        let buffer = checkerboard();
        let frames = buffer.frames().collect::<Vec<_>>();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], &[0.0, 1.0, 1.0, 0.0]);
    }
}
