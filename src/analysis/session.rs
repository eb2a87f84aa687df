use rayon::join;

use crate::{
    Resolution, Resolutions,
    analysis::{
        methods::{AxisView, Method, default_method},
        transform::DctPlan,
    },
    buffer::{FrameBuffer, check_frame_limits, try_alloc},
    error::{ForensicsError, Result},
    parameters::Parameters,
};

/// Score slots for one axis. Empty when the axis is too short for the range.
struct AxisAccumulator {
    length: usize,
    range: usize,
    scores: Vec<f64>,
}

impl AxisAccumulator {
    fn new(length: usize, range: usize) -> Result<Self> {
        let candidates = length.saturating_sub(range.saturating_mul(2));
        Ok(Self {
            length,
            range,
            scores: try_alloc(candidates, 0.0)?,
        })
    }

    fn accumulate(&mut self, method: &Method, axis: &AxisView<'_>, threshold: f32) {
        if !self.scores.is_empty() {
            method.accumulate(axis, self.range, threshold, &mut self.scores);
        }
    }

    /// Native dimension first, then every candidate reaching `threshold`,
    /// ordered by descending confidence and then descending index.
    fn results(&self, frames: usize, threshold: f32) -> Vec<Resolution> {
        let mut results = vec![Resolution::native(self.length)];
        results.extend(self.scores.iter().enumerate().filter_map(|(i, &score)| {
            let confidence = score / frames as f64;
            (confidence >= threshold as f64).then(|| Resolution {
                index: i + self.range,
                confidence: confidence as f32,
            })
        }));
        results.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(b.index.cmp(&a.index))
        });
        results
    }
}

struct Workspace {
    plan: DctPlan,
    coeffs: Vec<f32>,
    scratch: Vec<f32>,
    widths: AxisAccumulator,
    heights: AxisAccumulator,
}

/// Accumulates resize evidence over any number of equally sized frames.
///
/// Frames may be ingested in any order; the results only depend on which
/// frames were seen.
pub struct Analysis {
    method: &'static Method,
    width: usize,
    height: usize,
    params: Parameters,
    frames: usize,
    workspace: Option<Workspace>,
}

impl Analysis {
    /// Creates a session for `width x height` frames. `method` defaults to
    /// the first registered method and `params` to [`Parameters::default`].
    pub fn new(
        method: Option<&'static Method>,
        width: usize,
        height: usize,
        params: Option<&Parameters>,
    ) -> Result<Self> {
        let method = method.unwrap_or_else(default_method);
        let requested = params.copied().unwrap_or_default();
        requested.validate()?;

        let params = Parameters {
            range: method.effective_range(requested.range),
            threshold: Some(requested.threshold_or(method.threshold)),
        };

        if width == 0 || height == 0 {
            return Err(ForensicsError::invalid_image(format!(
                "cannot analyze {}x{} frames",
                width, height
            )));
        }
        let len = check_frame_limits(width, height)?;

        let coeffs = try_alloc(len, 0.0)?;
        let scratch = try_alloc(len, 0.0)?;
        let widths = AxisAccumulator::new(width, params.range)?;
        let heights = AxisAccumulator::new(height, params.range)?;
        let workspace = Workspace {
            plan: DctPlan::new(width, height)?,
            coeffs,
            scratch,
            widths,
            heights,
        };

        log::debug!(
            "Created {} analysis for {}x{} (range {}, threshold {})",
            method.name,
            width,
            height,
            params.range,
            params.threshold_or(method.threshold)
        );

        Ok(Self {
            method,
            width,
            height,
            params,
            frames: 0,
            workspace: Some(workspace),
        })
    }

    pub fn method(&self) -> &'static Method {
        self.method
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Resolved parameters: the method's fixed range and default threshold
    /// are already applied.
    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn frames_analyzed(&self) -> usize {
        self.frames
    }

    pub fn is_released(&self) -> bool {
        self.workspace.is_none()
    }

    fn threshold(&self) -> f32 {
        self.params.threshold_or(self.method.threshold)
    }

    /// Ingests every frame of `buffer`. Nothing is ingested if any frame
    /// holds a non-finite sample.
    pub fn ingest(&mut self, buffer: &FrameBuffer<'_>) -> Result<()> {
        if self.is_released() {
            return Err(released());
        }
        if buffer.is_released() {
            return Err(ForensicsError::Parameter(
                "frame buffer has been released".into(),
            ));
        }
        if buffer.frame_count() == 0 {
            return Err(ForensicsError::NoImages);
        }
        if buffer.width() != self.width || buffer.height() != self.height {
            return Err(ForensicsError::DimensionMismatch {
                expected_width: self.width,
                expected_height: self.height,
                actual_width: buffer.width(),
                actual_height: buffer.height(),
            });
        }
        check_finite(buffer.as_slice())?;

        for frame in buffer.frames() {
            self.process(frame)?;
        }
        Ok(())
    }

    /// Ingests a single row-major frame.
    pub fn ingest_frame(&mut self, frame: &[f32]) -> Result<()> {
        if self.is_released() {
            return Err(released());
        }
        if frame.len() != self.width * self.height {
            return Err(ForensicsError::invalid_image(format!(
                "frame holds {} samples, expected {}x{}",
                frame.len(),
                self.width,
                self.height
            )));
        }
        check_finite(frame)?;
        self.process(frame)
    }

    fn process(&mut self, frame: &[f32]) -> Result<()> {
        let threshold = self.threshold();
        let (width, height, method) = (self.width, self.height, self.method);
        let Workspace {
            plan,
            coeffs,
            scratch,
            widths,
            heights,
        } = self.workspace.as_mut().ok_or_else(released)?;

        coeffs.copy_from_slice(frame);
        plan.forward(coeffs, scratch);

        let coeffs = &coeffs[..];
        join(
            || widths.accumulate(method, &AxisView::columns(coeffs, width, height), threshold),
            || heights.accumulate(method, &AxisView::rows(coeffs, width, height), threshold),
        );

        self.frames += 1;
        log::trace!("Analyzed frame {} with {}", self.frames, method.name);
        Ok(())
    }

    /// Ranked candidates for both axes. Does not change the session; more
    /// frames may be ingested afterwards.
    pub fn extract_results(&self) -> Result<Resolutions> {
        let workspace = self.workspace.as_ref().ok_or_else(released)?;
        if self.frames == 0 {
            return Err(ForensicsError::NoImages);
        }

        let threshold = self.threshold();
        Ok(Resolutions {
            widths: workspace.widths.results(self.frames, threshold),
            heights: workspace.heights.results(self.frames, threshold),
        })
    }

    /// Frees the transform plan and accumulators. Calling this again has no
    /// effect.
    pub fn release(&mut self) {
        if self.workspace.take().is_some() {
            log::debug!(
                "Released {} analysis after {} frames",
                self.method.name,
                self.frames
            );
        }
    }
}

fn released() -> ForensicsError {
    ForensicsError::Parameter("analysis has been released".into())
}

fn check_finite(samples: &[f32]) -> Result<()> {
    match samples.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(ForensicsError::invalid_image(format!(
            "non-finite sample at offset {}",
            i
        ))),
        None => Ok(()),
    }
}
