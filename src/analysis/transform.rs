//! Unnormalized two-dimensional DCT-II.
//!
//! Each line is transformed with the half-sample mirror trick: the line is
//! extended to `2N` samples by reflection, run through a complex FFT, and the
//! first `N` outputs are rotated by `e^{-iπk/2N}`. The real part is then
//! `2 Σ x[n] cos(πk(2n+1)/2N)`.

use std::f64::consts::PI;
use std::sync::Arc;

use num_complex::Complex;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

use crate::{buffer::try_alloc, error::Result};

struct LinePlan {
    len: usize,
    fft: Arc<dyn Fft<f64>>,
    twiddles: Vec<Complex<f64>>,
}

impl LinePlan {
    fn new(planner: &mut FftPlanner<f64>, len: usize) -> Result<Self> {
        let mut twiddles = try_alloc(len, Complex::new(0.0, 0.0))?;
        for (k, twiddle) in twiddles.iter_mut().enumerate() {
            *twiddle = Complex::from_polar(1.0, -PI * k as f64 / (2 * len) as f64);
        }
        let fft = planner.plan_fft_forward(2 * len);

        Ok(Self { len, fft, twiddles })
    }

    /// Transforms every `len`-sample line of `data` in place.
    fn transform_lines(&self, data: &mut [f32]) {
        let zero = Complex::new(0.0, 0.0);
        data.par_chunks_mut(self.len).for_each_init(
            || {
                (
                    vec![zero; 2 * self.len],
                    vec![zero; self.fft.get_inplace_scratch_len()],
                )
            },
            |(buffer, scratch), line| self.transform_line(line, buffer, scratch),
        );
    }

    fn transform_line(
        &self,
        line: &mut [f32],
        buffer: &mut [Complex<f64>],
        scratch: &mut [Complex<f64>],
    ) {
        let n = self.len;
        for (i, &v) in line.iter().enumerate() {
            let v = Complex::new(v as f64, 0.0);
            buffer[i] = v;
            buffer[2 * n - 1 - i] = v;
        }

        self.fft.process_with_scratch(buffer, scratch);

        for (k, out) in line.iter_mut().enumerate() {
            *out = (buffer[k] * self.twiddles[k]).re as f32;
        }
    }
}

/// Reusable plan for frames of one size. Coefficients are laid out like the
/// input: row-major, `(ky, kx)` at `ky * width + kx`.
pub struct DctPlan {
    width: usize,
    height: usize,
    rows: LinePlan,
    columns: LinePlan,
}

impl DctPlan {
    /// Plans the transform. Callers bound the frame size first; the FFT
    /// planner itself cannot report allocation failure.
    pub fn new(width: usize, height: usize) -> Result<Self> {
        let mut planner = FftPlanner::new();
        let rows = LinePlan::new(&mut planner, width)?;
        let columns = LinePlan::new(&mut planner, height)?;

        Ok(Self {
            width,
            height,
            rows,
            columns,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Transforms `data` in place. `scratch` must hold as many samples as
    /// `data`.
    pub fn forward(&self, data: &mut [f32], scratch: &mut [f32]) {
        debug_assert_eq!(data.len(), self.width * self.height);
        debug_assert_eq!(scratch.len(), data.len());

        self.rows.transform_lines(data);
        transpose(data, scratch, self.width, self.height);
        self.columns.transform_lines(scratch);
        transpose(scratch, data, self.height, self.width);
    }
}

/// Writes the transpose of the row-major `height x width` matrix `src` into
/// `dst`.
fn transpose(src: &[f32], dst: &mut [f32], width: usize, height: usize) {
    dst.par_chunks_mut(height)
        .enumerate()
        .for_each(|(x, column)| {
            for (y, out) in column.iter_mut().enumerate() {
                *out = src[y * width + x];
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_dct(line: &[f32]) -> Vec<f64> {
        let n = line.len();
        (0..n)
            .map(|k| {
                2.0 * line
                    .iter()
                    .enumerate()
                    .map(|(i, &v)| {
                        v as f64 * (PI * k as f64 * (2 * i + 1) as f64 / (2 * n) as f64).cos()
                    })
                    .sum::<f64>()
            })
            .collect()
    }

    #[test]
    fn test_matches_direct_sum_for_single_row() {
        let row = [0.1f32, 0.7, 0.3, 0.9, 0.2, 0.5, 0.8];
        let mut data = row.to_vec();
        let mut scratch = vec![0.0; row.len()];
        DctPlan::new(row.len(), 1).unwrap().forward(&mut data, &mut scratch);

        // Height 1 doubles every coefficient.
        for (got, want) in data.iter().zip(naive_dct(&row)) {
            assert!((*got as f64 - 2.0 * want).abs() < 1e-4, "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_constant_frame_has_only_dc() {
        let (w, h) = (6, 4);
        let mut data = vec![0.5f32; w * h];
        let mut scratch = vec![0.0; w * h];
        DctPlan::new(w, h).unwrap().forward(&mut data, &mut scratch);

        assert!((data[0] - (4.0 * 0.5 * (w * h) as f32)).abs() < 1e-3);
        assert!(data[1..].iter().all(|v| v.abs() < 1e-3));
    }

    #[test]
    fn test_is_separable() {
        let (w, h) = (5, 3);
        let gx = [1.0f32, -0.5, 0.25, 0.75, 0.0];
        let gy = [0.2f32, 0.9, -0.4];
        let mut data = Vec::with_capacity(w * h);
        for &y in &gy {
            for &x in &gx {
                data.push(x * y);
            }
        }
        let mut scratch = vec![0.0; w * h];
        DctPlan::new(w, h).unwrap().forward(&mut data, &mut scratch);

        let (cx, cy) = (naive_dct(&gx), naive_dct(&gy));
        for ky in 0..h {
            for kx in 0..w {
                let want = cx[kx] * cy[ky];
                assert!((data[ky * w + kx] as f64 - want).abs() < 1e-4);
            }
        }
    }
}
