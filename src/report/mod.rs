use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Resolution, Resolutions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    None,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s < 0.2 => ConfidenceLevel::None,
            s if s < 0.4 => ConfidenceLevel::Low,
            s if s < 0.6 => ConfidenceLevel::Medium,
            s if s < 0.8 => ConfidenceLevel::High,
            _ => ConfidenceLevel::VeryHigh,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: usize,
    pub height: usize,
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Summary of one detection run.
///
/// `widths` and `heights` hold only the detected candidates; the native
/// dimensions are reported as `given`.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub method: String,
    pub given: Dimensions,
    pub best_guess: Dimensions,
    pub upsampled: bool,
    pub confidence: f32,
    pub confidence_level: ConfidenceLevel,
    pub widths: Vec<Resolution>,
    pub heights: Vec<Resolution>,
}

fn split_native(results: &[Resolution]) -> (Option<usize>, Vec<Resolution>) {
    let native = results.iter().find(|r| r.is_native()).map(|r| r.index);
    let candidates = results.iter().filter(|r| !r.is_native()).copied().collect();
    (native, candidates)
}

impl DetectionReport {
    pub fn new(method: &str, results: &Resolutions) -> Self {
        let (given_width, widths) = split_native(&results.widths);
        let (given_height, heights) = split_native(&results.heights);
        let given = Dimensions {
            width: given_width.unwrap_or_default(),
            height: given_height.unwrap_or_default(),
        };
        let best_guess = Dimensions {
            width: widths.first().map_or(given.width, |r| r.index),
            height: heights.first().map_or(given.height, |r| r.index),
        };
        let confidence = widths
            .first()
            .into_iter()
            .chain(heights.first())
            .map(|r| r.confidence)
            .fold(0.0f32, f32::max);

        Self {
            method: method.to_string(),
            given,
            best_guess,
            upsampled: !(widths.is_empty() && heights.is_empty()),
            confidence,
            confidence_level: ConfidenceLevel::from_score(confidence as f64),
            widths,
            heights,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for DetectionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "given: {}", self.given)?;
        write!(f, "best guess: {}", self.best_guess)?;
        if !self.upsampled {
            write!(f, " (not upsampled)")?;
        }
        writeln!(f)?;

        let rows = self.widths.len().max(self.heights.len());
        if rows > 0 {
            writeln!(f, "all width        height")?;
        }
        for i in 0..rows {
            match self.widths.get(i) {
                Some(r) => write!(f, "{:5} ({:5.2}%)   ", r.index, r.confidence * 100.0)?,
                None => write!(f, "{:17}", "")?,
            }
            if let Some(r) = self.heights.get(i) {
                write!(f, "{:5} ({:5.2}%)", r.index, r.confidence * 100.0)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
