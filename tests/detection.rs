use std::f64::consts::PI;

use resolution_forensics::{
    Resolution, buffer::FrameBuffer, detect, detect_frames, detect_image, error::ForensicsError,
    find_method, methods, parameters::Parameters,
};

/// Coefficients odd-symmetric about `center`: `c[center + i] == -c[center - i]`,
/// with a small value at the center itself.
fn odd_spectrum(len: usize, center: usize) -> Vec<f64> {
    let mut spectrum = vec![2.0; len];
    spectrum[center] = 0.5;
    for i in 1..len {
        let magnitude = 1.0 + (i % 3) as f64;
        let value = if i % 2 == 0 { magnitude } else { -magnitude };
        if i <= center {
            spectrum[center - i] = value;
        }
        if center + i < len {
            spectrum[center + i] = -value;
        }
    }
    spectrum
}

/// Signal whose unnormalized DCT-II is `spectrum` scaled by its length.
fn inverse_dct(spectrum: &[f64]) -> Vec<f64> {
    let n = spectrum.len();
    (0..n)
        .map(|i| {
            spectrum[0] / 2.0
                + spectrum[1..]
                    .iter()
                    .enumerate()
                    .map(|(k, c)| {
                        c * (PI * (k + 1) as f64 * (2 * i + 1) as f64 / (2 * n) as f64).cos()
                    })
                    .sum::<f64>()
        })
        .collect()
}

/// A 64x32 frame whose DCT is odd-symmetric about column 32 and row 16.
fn symmetric_frame() -> Vec<f32> {
    let columns = inverse_dct(&odd_spectrum(64, 32));
    let rows = inverse_dct(&odd_spectrum(32, 16));
    rows.iter()
        .flat_map(|r| columns.iter().map(move |c| (r * c) as f32))
        .collect()
}

#[test]
fn test_every_method_finds_symmetric_boundary() {
    let frame = symmetric_frame();
    for method in methods() {
        let results = detect(&frame, 1, 64, 32, Some(method), None).unwrap();

        let width = Resolution {
            index: 32,
            confidence: 1.0,
        };
        let height = Resolution {
            index: 16,
            confidence: 1.0,
        };
        assert!(
            results.widths.contains(&width),
            "{} widths: {:?}",
            method.name,
            results.widths
        );
        assert!(
            results.heights.contains(&height),
            "{} heights: {:?}",
            method.name,
            results.heights
        );
        assert_eq!(results.widths[0].confidence, 1.0);
        assert_eq!(results.widths.last(), Some(&Resolution::native(64)));
        assert_eq!(results.heights.last(), Some(&Resolution::native(32)));
    }
}

#[test]
fn test_repeated_frames_keep_confidence() {
    let frame = symmetric_frame();
    let mut frames = frame.clone();
    frames.extend(&frame);
    let results = detect(&frames, 2, 64, 32, None, None).unwrap();
    assert!(results.widths.contains(&Resolution {
        index: 32,
        confidence: 1.0
    }));
}

#[test]
fn test_zero_threshold_returns_all_candidates() {
    let params = Parameters::new()
        .with_range(1)
        .unwrap()
        .with_threshold(0.0)
        .unwrap();
    let results = detect(&[0.0, 1.0, 0.0, 1.0], 1, 4, 1, None, Some(&params)).unwrap();
    assert_eq!(results.widths.len(), 3);
    assert_eq!(results.heights, vec![Resolution::native(1)]);

    let results = detect(&[0.0, 1.0, 0.0, 1.0], 1, 4, 1, None, None).unwrap();
    assert_eq!(results.widths.len(), 1);
}

#[test]
fn test_zero_threshold_with_default_range() {
    let params = Parameters::new().with_threshold(0.0).unwrap();
    let frame = symmetric_frame();
    let results = detect(&frame, 1, 64, 32, None, Some(&params)).unwrap();
    assert_eq!(results.widths.len(), 1 + 64 - 2 * 12);
    assert_eq!(results.heights.len(), 1 + 32 - 2 * 12);
}

#[test]
fn test_error_kinds() {
    assert!(matches!(
        detect(&[1.0], 1, 0, 0, None, None),
        Err(ForensicsError::InvalidImage(_))
    ));
    assert!(matches!(
        detect(&[1.0], 0, 1, 1, None, None),
        Err(ForensicsError::NoImages)
    ));
    assert!(matches!(
        detect(&[f32::INFINITY], 1, 1, 1, None, None),
        Err(ForensicsError::InvalidImage(_))
    ));
    assert!(matches!(
        find_method("nonexistent"),
        Err(ForensicsError::MethodNotFound(_))
    ));
}

#[test]
fn test_detect_frames_borrows_caller_memory() {
    let samples = symmetric_frame();
    let frames = FrameBuffer::wrap(&samples, 64, 32, 1).unwrap();
    let results = detect_frames(&frames, find_method("zerox").ok(), None).unwrap();
    assert!(results.is_upsampled());
    assert_eq!(samples.len(), 64 * 32);
}

#[test]
fn test_detect_image_checkerboard() {
    let image = image::DynamicImage::ImageLuma8(image::GrayImage::from_fn(2, 2, |x, y| {
        image::Luma([if x == y { 255 } else { 0 }])
    }));
    let results = detect_image(&image, None, None).unwrap();
    assert_eq!(results.widths, vec![Resolution::native(2)]);
    assert_eq!(results.heights, vec![Resolution::native(2)]);
}

#[test]
fn test_zerox_on_checkerboard() {
    let zerox = find_method("zerox").unwrap();
    let results = detect(&[1.0, 0.0, 0.0, 1.0], 1, 2, 2, Some(zerox), None).unwrap();
    assert_eq!(results.widths, vec![Resolution::native(2)]);
    assert_eq!(results.heights, vec![Resolution::native(2)]);
    assert!(!results.is_upsampled());
}
