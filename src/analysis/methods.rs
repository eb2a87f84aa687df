//! Registry of resize-artifact detection methods.
//!
//! Every method scores candidate boundaries along one axis of a frame's DCT
//! coefficients. An upscaled image leaves an odd-symmetric pattern around the
//! coefficient index matching the source dimension: coefficients mirror each
//! other with inverted sign, and the boundary itself sits near a zero crossing.
//! The methods below are different ways of spotting that pattern.

use std::fmt;

use rayon::prelude::*;

use crate::error::{ForensicsError, Result};

/// One axis of a coefficient plane.
///
/// The coefficient at position `x` of line `line` is
/// `coeffs[line * stride + x * dist]`.
#[derive(Clone, Copy)]
pub struct AxisView<'a> {
    pub coeffs: &'a [f32],
    pub length: usize,
    pub lines: usize,
    pub stride: usize,
    pub dist: usize,
}

impl<'a> AxisView<'a> {
    /// Horizontal axis of a row-major `width x height` plane.
    pub fn columns(coeffs: &'a [f32], width: usize, height: usize) -> Self {
        Self {
            coeffs,
            length: width,
            lines: height,
            stride: width,
            dist: 1,
        }
    }

    /// Vertical axis of a row-major `width x height` plane.
    pub fn rows(coeffs: &'a [f32], width: usize, height: usize) -> Self {
        Self {
            coeffs,
            length: height,
            lines: width,
            stride: 1,
            dist: width,
        }
    }

    #[inline]
    pub fn at(&self, line: usize, x: usize) -> f32 {
        self.coeffs[line * self.stride + x * self.dist]
    }
}

/// Per-frame scoring capability of a method.
///
/// `scores[i]` accumulates the evidence for candidate `i + range`; the slice
/// covers every candidate in `[range, length - range)`. Implementations add
/// one frame's contribution, normalized to `[0, 1]`.
pub trait ArtifactScorer: Send + Sync {
    fn accumulate(&self, axis: &AxisView<'_>, range: usize, threshold: f32, scores: &mut [f64]);
}

pub struct Method {
    pub name: &'static str,
    /// Default confidence threshold.
    pub threshold: f32,
    /// Range the method always uses, regardless of parameters.
    pub fixed_range: Option<usize>,
    scorer: &'static dyn ArtifactScorer,
}

impl Method {
    pub fn effective_range(&self, requested: usize) -> usize {
        self.fixed_range.unwrap_or(requested)
    }

    pub(crate) fn accumulate(
        &self,
        axis: &AxisView<'_>,
        range: usize,
        threshold: f32,
        scores: &mut [f64],
    ) {
        self.scorer.accumulate(axis, range, threshold, scores)
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("threshold", &self.threshold)
            .field("fixed_range", &self.fixed_range)
            .finish()
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

static METHODS: [Method; 4] = [
    Method {
        name: "sign",
        threshold: 0.55,
        fixed_range: None,
        scorer: &SignInversion,
    },
    Method {
        name: "mag",
        threshold: 0.40,
        fixed_range: None,
        scorer: &MirroredMagnitude,
    },
    Method {
        name: "orig",
        threshold: 0.64,
        fixed_range: None,
        scorer: &Combined,
    },
    Method {
        name: "zerox",
        threshold: 0.45,
        fixed_range: Some(1),
        scorer: &ZeroCrossing,
    },
];

/// All methods in registration order. The first entry is the default.
pub fn methods() -> &'static [Method] {
    &METHODS
}

pub fn find_method(name: &str) -> Result<&'static Method> {
    METHODS
        .iter()
        .find(|m| m.name == name)
        .ok_or_else(|| ForensicsError::MethodNotFound(name.to_string()))
}

pub fn default_method() -> &'static Method {
    &METHODS[0]
}

/// Number of sign-inverted pairs `(x - i, x + i)`, `i` in `1..=range`, over
/// every line.
fn sign_inversions(axis: &AxisView<'_>, x: usize, range: usize) -> usize {
    (0..axis.lines)
        .map(|line| {
            (1..=range)
                .filter(|&i| {
                    axis.at(line, x - i).is_sign_negative() != axis.at(line, x + i).is_sign_negative()
                })
                .count()
        })
        .sum()
}

/// Binary exponent `e` such that `v = m * 2^e` with `0.5 <= |m| < 1`; zero for
/// zero and non-finite values.
fn frexp_exponent(v: f64) -> i32 {
    if v == 0.0 || !v.is_finite() {
        return 0;
    }
    let biased = ((v.to_bits() >> 52) & 0x7ff) as i32;
    if biased == 0 {
        // Subnormal: scale into the normal range first.
        return frexp_exponent(v * 2f64.powi(54)) - 54;
    }
    biased - 1022
}

/// Counts sign inversions between mirrored coefficients.
struct SignInversion;

impl ArtifactScorer for SignInversion {
    fn accumulate(&self, axis: &AxisView<'_>, range: usize, _: f32, scores: &mut [f64]) {
        let norm = (range * axis.lines) as f64;
        scores.par_iter_mut().enumerate().for_each(|(i, score)| {
            *score += sign_inversions(axis, i + range, range) as f64 / norm;
        });
    }
}

/// Counts mirrored coefficients of similar magnitude and opposite sign.
struct MirroredMagnitude;

impl ArtifactScorer for MirroredMagnitude {
    fn accumulate(&self, axis: &AxisView<'_>, range: usize, _: f32, scores: &mut [f64]) {
        let norm = (range * axis.lines) as f64;
        scores.par_iter_mut().enumerate().for_each(|(i, score)| {
            let x = i + range;
            let mut count = 0usize;
            for line in 0..axis.lines {
                for d in 1..=range {
                    let a = axis.at(line, x - d) as f64;
                    let b = axis.at(line, x + d) as f64;
                    let ratio = a / b.abs().max(f64::EPSILON).copysign(b);
                    if (ratio + 1.0).abs() < 1.0 {
                        count += 1;
                    }
                }
            }
            *score += count as f64 / norm;
        });
    }
}

/// Sign inversions, gated on the mean coefficient magnitude dipping at the
/// candidate between two sides of similar magnitude.
struct Combined;

impl ArtifactScorer for Combined {
    fn accumulate(&self, axis: &AxisView<'_>, range: usize, threshold: f32, scores: &mut [f64]) {
        let norm = (range * axis.lines) as f64;
        let means = (0..axis.length)
            .into_par_iter()
            .map(|x| {
                (0..axis.lines)
                    .map(|line| axis.at(line, x).abs() as f64)
                    .sum::<f64>()
                    / axis.lines as f64
            })
            .collect::<Vec<_>>();

        scores.par_iter_mut().enumerate().for_each(|(i, score)| {
            let x = i + range;
            let left = (1..=range).map(|d| means[x - d]).sum::<f64>();
            let right = (1..=range).map(|d| means[x + d]).sum::<f64>();
            let mid = means[x] * range as f64;

            let (left_exp, right_exp, mid_exp) =
                (frexp_exponent(left), frexp_exponent(right), frexp_exponent(mid));
            let spread = (left - right).abs();
            let dipped = (left_exp - right_exp).abs() < 2
                && (mid == 0.0 || left_exp.min(right_exp) >= mid_exp)
                && left.min(right) > mid
                && spread < (left - mid).abs()
                && spread < (right - mid).abs();
            if !dipped {
                return;
            }

            let inversions = sign_inversions(axis, x, range) as f64;
            if inversions > threshold as f64 * norm {
                *score += inversions / norm;
            }
        });
    }
}

/// Fraction of lines with a zero crossing at the candidate: the neighbours
/// differ in sign and both exceed the candidate in magnitude.
///
/// This scoring rule is local to this crate. Its confidences are not
/// calibrated against other resize detectors that ship a `zerox` method, so
/// compare them only with other `zerox` results.
struct ZeroCrossing;

impl ArtifactScorer for ZeroCrossing {
    fn accumulate(&self, axis: &AxisView<'_>, range: usize, _: f32, scores: &mut [f64]) {
        let norm = axis.lines as f64;
        scores.par_iter_mut().enumerate().for_each(|(i, score)| {
            let x = i + range;
            let crossings = (0..axis.lines)
                .filter(|&line| {
                    let (before, at, after) =
                        (axis.at(line, x - 1), axis.at(line, x), axis.at(line, x + 1));
                    before.is_sign_negative() != after.is_sign_negative()
                        && at.abs() < before.abs().min(after.abs())
                })
                .count();
            *score += crossings as f64 / norm;
        });
    }
}
