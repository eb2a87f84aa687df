use image::{DynamicImage, GrayImage};
use ndarray::{ArrayView2, ArrayView3};

use crate::{buffer::FrameBuffer, error::Result};

/// Normalized luma samples, row-major.
pub fn luma_samples(image: &DynamicImage) -> Vec<f32> {
    image.to_luma32f().into_raw()
}

pub fn frame_from_image(image: &DynamicImage) -> Result<FrameBuffer<'static>> {
    FrameBuffer::from_vec(
        luma_samples(image),
        image.width() as usize,
        image.height() as usize,
        1,
    )
}

pub fn frame_from_gray(image: &GrayImage) -> Result<FrameBuffer<'static>> {
    let samples = image.pixels().map(|p| p[0] as f32 / 255.0).collect();
    FrameBuffer::from_vec(samples, image.width() as usize, image.height() as usize, 1)
}

/// Frame from a `(height, width)` array. Standard-layout arrays are borrowed,
/// anything else is copied.
pub fn frame_from_array<'a>(array: ArrayView2<'a, f32>) -> Result<FrameBuffer<'a>> {
    let (height, width) = array.dim();
    match array.to_slice() {
        Some(samples) => FrameBuffer::wrap(samples, width, height, 1),
        None => FrameBuffer::from_vec(array.iter().copied().collect(), width, height, 1),
    }
}

/// Frames from a `(frames, height, width)` array.
pub fn frames_from_array<'a>(array: ArrayView3<'a, f32>) -> Result<FrameBuffer<'a>> {
    let (frames, height, width) = array.dim();
    match array.to_slice() {
        Some(samples) => FrameBuffer::wrap(samples, width, height, frames),
        None => FrameBuffer::from_vec(array.iter().copied().collect(), width, height, frames),
    }
}
