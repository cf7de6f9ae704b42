//! Feature extraction
//!
//! Turns an uploaded image blob into the fixed-length vector a model artifact
//! was trained on. The recipe is declared by the artifact itself through a
//! [`FeatureSpec`], so preprocessing constants travel with the model.

use crate::error::VisionError;
use crate::utils::{l2_normalize, mean_and_variance, rgb_to_hsv};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat, ImageReader, RgbImage};
use pilar_core::config::UploadConfig;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

/// Lower and upper Canny hysteresis thresholds
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

/// Preprocessing recipe paired with a trained artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSpec {
    /// Downsampled grayscale pixels: Lanczos resize to `size`x`size`,
    /// luma scaled to [0, 1], every `stride`-th pixel, first `length` kept
    GrayscaleGrid { size: u32, stride: usize, length: usize },
    /// HSV histograms of `bins` bins per channel (each L2-normalized),
    /// then B/G/R means, B/G/R variances, edge density and one zero pad
    ColorHistogram { size: u32, bins: usize },
}

impl FeatureSpec {
    /// 16x16 grayscale grid reduced to 31 values
    pub fn grayscale_grid() -> Self {
        FeatureSpec::GrayscaleGrid { size: 16, stride: 8, length: 31 }
    }

    /// 128x128 color statistics, 32 values
    pub fn color_histogram() -> Self {
        FeatureSpec::ColorHistogram { size: 128, bins: 8 }
    }

    /// Width of every vector this recipe produces
    pub fn len(&self) -> usize {
        match self {
            FeatureSpec::GrayscaleGrid { length, .. } => *length,
            FeatureSpec::ColorHistogram { bins, .. } => 3 * bins + 8,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            FeatureSpec::GrayscaleGrid { size, stride, length } => {
                if *size == 0 || *size > 1024 {
                    return Err(format!("grayscale_grid size must be in 1..=1024, got {}", size));
                }
                if *stride == 0 {
                    return Err("grayscale_grid stride must be positive".to_string());
                }
                if *length == 0 {
                    return Err("grayscale_grid length must be positive".to_string());
                }
            }
            FeatureSpec::ColorHistogram { size, bins } => {
                if *size == 0 || *size > 1024 {
                    return Err(format!("color_histogram size must be in 1..=1024, got {}", size));
                }
                if *bins == 0 || *bins > 256 {
                    return Err(format!("color_histogram bins must be in 1..=256, got {}", bins));
                }
            }
        }
        Ok(())
    }
}

/// Fixed-length feature vector for one image
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

/// Accepted pixel dimensions, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLimits {
    pub min_dimension: u32,
    pub max_dimension: u32,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self { min_dimension: 16, max_dimension: 4096 }
    }
}

impl From<&UploadConfig> for ImageLimits {
    fn from(config: &UploadConfig) -> Self {
        Self {
            min_dimension: config.min_dimension,
            max_dimension: config.max_dimension,
        }
    }
}

impl ImageLimits {
    fn check(&self, width: u32, height: u32) -> Result<(), VisionError> {
        let within = |side: u32| side >= self.min_dimension && side <= self.max_dimension;
        if within(width) && within(height) {
            Ok(())
        } else {
            Err(VisionError::InvalidDimensions {
                width,
                height,
                min: self.min_dimension,
                max: self.max_dimension,
            })
        }
    }
}

/// Stateless extractor for one [`FeatureSpec`]
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    spec: FeatureSpec,
    limits: ImageLimits,
}

impl FeatureExtractor {
    pub fn new(spec: FeatureSpec, limits: ImageLimits) -> Self {
        Self { spec, limits }
    }

    pub fn spec(&self) -> &FeatureSpec {
        &self.spec
    }

    /// Decode `bytes` and compute the feature vector.
    ///
    /// The result always holds exactly `spec.len()` finite values.
    pub fn extract(&self, bytes: &[u8]) -> Result<FeatureVector, VisionError> {
        let image = self.decode(bytes)?;
        Ok(self.extract_image(&image))
    }

    /// Compute features from an already decoded image
    pub fn extract_image(&self, image: &DynamicImage) -> FeatureVector {
        let rgb = image.to_rgb8();
        let mut values = match &self.spec {
            FeatureSpec::GrayscaleGrid { size, stride, length } => {
                grayscale_grid(&rgb, *size, *stride, *length)
            }
            FeatureSpec::ColorHistogram { size, bins } => color_histogram(&rgb, *size, *bins),
        };

        values.resize(self.spec.len(), 0.0);
        for value in values.iter_mut() {
            if !value.is_finite() {
                *value = 0.0;
            }
        }
        FeatureVector(values)
    }

    /// Sniff the container format, check dimensions from the header, then decode
    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, VisionError> {
        let format = image::guess_format(bytes)
            .map_err(|_| VisionError::UnsupportedFormat("unrecognized image signature".to_string()))?;
        if !format.reading_enabled() {
            return Err(VisionError::UnsupportedFormat(format!("{:?} decoding is not enabled", format)));
        }

        let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
            .into_dimensions()
            .map_err(|e| VisionError::Decode(format!("unreadable {} header: {}", format_name(format), e)))?;
        self.limits.check(width, height)?;

        // Some JPEG decoders fill a cut-off scan with gray instead of failing
        if format == ImageFormat::Jpeg && !has_jpeg_end_marker(bytes) {
            return Err(VisionError::Decode("truncated jpeg stream".to_string()));
        }

        let image = ImageReader::with_format(Cursor::new(bytes), format)
            .decode()
            .map_err(|e| VisionError::Decode(format!("invalid {} data: {}", format_name(format), e)))?;

        debug!(
            format = format_name(format),
            width = image.width(),
            height = image.height(),
            "Decoded image"
        );
        Ok(image)
    }
}

/// True when an end-of-image marker follows the main image's first scan.
///
/// Header segments are skipped by their length, so an EXIF thumbnail (which
/// carries its own end marker inside APP1) does not count.
fn has_jpeg_end_marker(bytes: &[u8]) -> bool {
    match jpeg_scan_offset(bytes) {
        Some(scan) => bytes[scan..].windows(2).any(|pair| pair == [0xFF, 0xD9]),
        None => false,
    }
}

/// Offset of the first start-of-scan marker of the outer image
fn jpeg_scan_offset(bytes: &[u8]) -> Option<usize> {
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        match bytes[pos + 1] {
            // fill byte
            0xFF => {
                pos += 1;
                continue;
            }
            0xDA => return Some(pos),
            // markers without a length field
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            _ => {}
        }
        let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        if length < 2 {
            return None;
        }
        pos += 2 + length;
    }
    None
}

fn format_name(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("image")
}

fn grayscale_grid(rgb: &RgbImage, size: u32, stride: usize, length: usize) -> Vec<f64> {
    let resized = imageops::resize(rgb, size, size, FilterType::Lanczos3);
    resized
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
            (luma as u8) as f64 / 255.0
        })
        .step_by(stride)
        .take(length)
        .collect()
}

fn color_histogram(rgb: &RgbImage, size: u32, bins: usize) -> Vec<f64> {
    let resized = imageops::resize(rgb, size, size, FilterType::Triangle);

    let mut hue = vec![0.0; bins];
    let mut saturation = vec![0.0; bins];
    let mut value = vec![0.0; bins];
    for pixel in resized.pixels() {
        let [r, g, b] = pixel.0;
        let (h, s, v) = rgb_to_hsv(r, g, b);
        hue[bin_index(h as usize, 180, bins)] += 1.0;
        saturation[bin_index(s as usize, 256, bins)] += 1.0;
        value[bin_index(v as usize, 256, bins)] += 1.0;
    }
    l2_normalize(&mut hue);
    l2_normalize(&mut saturation);
    l2_normalize(&mut value);

    let (r_mean, r_var) = channel_stats(&resized, 0);
    let (g_mean, g_var) = channel_stats(&resized, 1);
    let (b_mean, b_var) = channel_stats(&resized, 2);

    let mut features = Vec::with_capacity(3 * bins + 8);
    features.extend(hue);
    features.extend(saturation);
    features.extend(value);
    // Channel statistics are in B, G, R order
    features.extend([b_mean, g_mean, r_mean, b_var, g_var, r_var]);
    features.push(edge_density(&imageops::grayscale(&resized)));
    features.push(0.0);
    features
}

fn channel_stats(image: &RgbImage, channel: usize) -> (f64, f64) {
    mean_and_variance(image.pixels().map(move |p| p.0[channel] as f64))
}

fn bin_index(value: usize, range: usize, bins: usize) -> usize {
    (value * bins / range).min(bins - 1)
}

fn edge_density(gray: &GrayImage) -> f64 {
    let total = gray.width() as usize * gray.height() as usize;
    if total == 0 {
        return 0.0;
    }
    let edges = imageproc::edges::canny(gray, CANNY_LOW, CANNY_HIGH);
    let count = edges.pixels().filter(|p| p.0[0] > 0).count();
    count as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image.clone())
            .write_to(&mut Cursor::new(&mut bytes), format)
            .unwrap();
        bytes
    }

    fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbImage {
        ImageBuffer::from_pixel(width, height, Rgb(color))
    }

    #[test]
    fn test_spec_lengths() {
        assert_eq!(FeatureSpec::grayscale_grid().len(), 31);
        assert_eq!(FeatureSpec::color_histogram().len(), 32);
        assert_eq!(FeatureSpec::ColorHistogram { size: 64, bins: 4 }.len(), 20);
    }

    #[test]
    fn test_spec_validation() {
        assert!(FeatureSpec::grayscale_grid().validate().is_ok());
        assert!(FeatureSpec::GrayscaleGrid { size: 16, stride: 0, length: 31 }.validate().is_err());
        assert!(FeatureSpec::ColorHistogram { size: 0, bins: 8 }.validate().is_err());
        assert!(FeatureSpec::ColorHistogram { size: 128, bins: 0 }.validate().is_err());
    }

    #[test]
    fn test_grayscale_grid_white_image() {
        let extractor = FeatureExtractor::new(FeatureSpec::grayscale_grid(), ImageLimits::default());
        let bytes = encode(&solid(40, 30, [255, 255, 255]), ImageFormat::Png);
        let features = extractor.extract(&bytes).unwrap();

        assert_eq!(features.len(), 31);
        // 255 * (0.299 + 0.587 + 0.114) lands a hair under 255 in f32
        for value in features.as_slice() {
            assert!(*value >= 254.0 / 255.0 && *value <= 1.0);
        }
    }

    #[test]
    fn test_grayscale_grid_pads_short_grids() {
        let spec = FeatureSpec::GrayscaleGrid { size: 4, stride: 8, length: 31 };
        let extractor = FeatureExtractor::new(spec, ImageLimits::default());
        let image = DynamicImage::ImageRgb8(solid(20, 20, [0, 0, 0]));
        let features = extractor.extract_image(&image);

        assert_eq!(features.len(), 31);
        assert!(features.as_slice().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_color_histogram_solid_blue() {
        let extractor = FeatureExtractor::new(FeatureSpec::color_histogram(), ImageLimits::default());
        let bytes = encode(&solid(64, 64, [0, 0, 255]), ImageFormat::Png);
        let features = extractor.extract(&bytes).unwrap();
        let values = features.as_slice();

        assert_eq!(values.len(), 32);
        // Hue 120 lands in bin 5 of 8, saturation and value in the top bin
        assert_eq!(values[5], 1.0);
        assert_eq!(values[15], 1.0);
        assert_eq!(values[23], 1.0);
        assert_eq!(&values[24..27], &[255.0, 0.0, 0.0]);
        assert_eq!(&values[27..30], &[0.0, 0.0, 0.0]);
        assert_eq!(values[30], 0.0);
        assert_eq!(values[31], 0.0);
    }

    #[test]
    fn test_color_histogram_detects_edges() {
        let image = ImageBuffer::from_fn(128, 128, |x, _| if x < 64 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) });
        let extractor = FeatureExtractor::new(FeatureSpec::color_histogram(), ImageLimits::default());
        let features = extractor.extract_image(&DynamicImage::ImageRgb8(image));

        let density = features.as_slice()[30];
        assert!(density > 0.0 && density < 0.1, "edge density {}", density);
    }

    #[test]
    fn test_jpeg_input() {
        let extractor = FeatureExtractor::new(FeatureSpec::color_histogram(), ImageLimits::default());
        let bytes = encode(&solid(50, 50, [200, 30, 30]), ImageFormat::Jpeg);
        assert_eq!(extractor.extract(&bytes).unwrap().len(), 32);
    }

    #[test]
    fn test_unknown_bytes_are_unsupported() {
        let extractor = FeatureExtractor::new(FeatureSpec::color_histogram(), ImageLimits::default());
        let err = extractor.extract(b"definitely not an image").unwrap_err();
        assert!(matches!(err, VisionError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_truncated_jpeg_is_decode_error() {
        let extractor = FeatureExtractor::new(FeatureSpec::color_histogram(), ImageLimits::default());
        let bytes = encode(&solid(64, 64, [10, 120, 40]), ImageFormat::Jpeg);
        let err = extractor.extract(&bytes[..bytes.len() / 3]).unwrap_err();
        assert!(matches!(err, VisionError::Decode(_)), "got {:?}", err);
    }

    /// JPEG with an APP1 "Exif" segment holding a thumbnail, like camera output
    fn jpeg_with_thumbnail() -> Vec<u8> {
        let thumbnail = encode(&solid(16, 16, [200, 200, 200]), ImageFormat::Jpeg);
        let main = encode(
            &RgbImage::from_fn(256, 256, |x, y| {
                image::Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x ^ y) % 256) as u8])
            }),
            ImageFormat::Jpeg,
        );

        let mut payload = b"Exif\0\0".to_vec();
        payload.extend_from_slice(&thumbnail);
        let length = u16::try_from(payload.len() + 2).unwrap();

        let mut bytes = main[..2].to_vec();
        bytes.extend_from_slice(&[0xFF, 0xE1]);
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.extend_from_slice(&payload);
        bytes.extend_from_slice(&main[2..]);
        bytes
    }

    #[test]
    fn test_truncated_jpeg_with_exif_thumbnail() {
        let extractor = FeatureExtractor::new(FeatureSpec::color_histogram(), ImageLimits::default());
        let bytes = jpeg_with_thumbnail();
        assert_eq!(extractor.extract(&bytes).unwrap().len(), 32);

        let truncated = &bytes[..bytes.len() * 2 / 3];
        // the thumbnail's end marker is still present in the cut-off file
        assert!(truncated.windows(2).any(|pair| pair == [0xFF, 0xD9]));
        let err = extractor.extract(truncated).unwrap_err();
        assert!(matches!(err, VisionError::Decode(_)), "got {:?}", err);
    }

    #[test]
    fn test_jpeg_end_marker_scan() {
        let bytes = jpeg_with_thumbnail();
        assert!(has_jpeg_end_marker(&bytes));

        let mut trailing = bytes.clone();
        trailing.extend_from_slice(&[0, 0, 0, 0]);
        assert!(has_jpeg_end_marker(&trailing));

        assert!(!has_jpeg_end_marker(&bytes[..bytes.len() - 2]));
        assert!(!has_jpeg_end_marker(b"\xFF\xD8\xFF\xD9"));
        assert!(!has_jpeg_end_marker(b"not a jpeg"));
    }

    #[test]
    fn test_dimension_limits() {
        let extractor = FeatureExtractor::new(FeatureSpec::grayscale_grid(), ImageLimits::default());
        let tiny = encode(&solid(8, 64, [1, 2, 3]), ImageFormat::Png);
        match extractor.extract(&tiny) {
            Err(VisionError::InvalidDimensions { width: 8, height: 64, .. }) => {}
            other => panic!("Expected InvalidDimensions, got {:?}", other),
        }

        let limits = ImageLimits { min_dimension: 16, max_dimension: 32 };
        let extractor = FeatureExtractor::new(FeatureSpec::grayscale_grid(), limits);
        let wide = encode(&solid(33, 20, [1, 2, 3]), ImageFormat::Png);
        assert!(matches!(extractor.extract(&wide), Err(VisionError::InvalidDimensions { .. })));
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let image = ImageBuffer::from_fn(90, 70, |x, y| Rgb([(x * 3) as u8, (y * 2) as u8, ((x + y) % 256) as u8]));
        let bytes = encode(&image, ImageFormat::Png);
        let extractor = FeatureExtractor::new(FeatureSpec::color_histogram(), ImageLimits::default());
        assert_eq!(extractor.extract(&bytes).unwrap(), extractor.extract(&bytes).unwrap());
    }
}
