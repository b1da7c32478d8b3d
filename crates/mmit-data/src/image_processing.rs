//! Image decoding and patch transforms for multimodal examples.
//!
//! Images arrive as url-safe base64 payloads. They are decoded, forced to
//! RGB, and turned into normalized `[3, S, S]` tensors by an injected
//! [`ImageTransform`]. The default [`PatchTransform`] follows the usual
//! Flamingo-style recipe: random resize, center crop, random horizontal flip,
//! rescale, normalize.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use image::{imageops::FilterType, DynamicImage};
use mmit_core::{ImageTransform, MmitError, RecordType, Result};
use ndarray::Array3;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::sync::Arc;

/// Flamingo normalization mean (RGB).
pub const FLAMINGO_MEAN: [f32; 3] = [0.481, 0.458, 0.408];

/// Flamingo normalization standard deviation (RGB).
pub const FLAMINGO_STD: [f32; 3] = [0.269, 0.261, 0.276];

/// Url-safe alphabet, accepting payloads with or without `=` padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode a url-safe base64 image payload into an RGB image.
pub fn decode_image(payload: &str) -> Result<DynamicImage> {
    let bytes = URL_SAFE_LENIENT
        .decode(payload.trim())
        .map_err(|e| MmitError::Decode(format!("base64 decode: {}", e)))?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| MmitError::Decode(format!("image load: {}", e)))?;
    Ok(DynamicImage::ImageRgb8(img.to_rgb8()))
}

/// Configuration for [`PatchTransform`].
#[derive(Debug, Clone)]
pub struct PatchTransformConfig {
    /// Output side length `S`.
    pub size: u32,
    /// Candidate (width, height) resize targets; one is picked per image.
    pub scales: Vec<(u32, u32)>,
    /// Probability of a horizontal flip.
    pub flip_prob: f64,
    /// Normalization mean (RGB).
    pub mean: [f32; 3],
    /// Normalization standard deviation (RGB).
    pub std: [f32; 3],
    /// Rescaling factor applied before normalization.
    pub rescale_factor: f32,
}

impl PatchTransformConfig {
    /// Square patches of side `size` with the Flamingo statistics.
    pub fn new(size: u32) -> Self {
        Self {
            size,
            scales: vec![(size, size)],
            flip_prob: 0.5,
            mean: FLAMINGO_MEAN,
            std: FLAMINGO_STD,
            rescale_factor: 1.0 / 255.0,
        }
    }
}

impl Default for PatchTransformConfig {
    fn default() -> Self {
        Self::new(224)
    }
}

/// Random-resize, center-crop, random-flip, normalize.
#[derive(Debug, Clone)]
pub struct PatchTransform {
    config: PatchTransformConfig,
}

impl PatchTransform {
    /// Create a transform, rejecting unusable configurations.
    pub fn new(config: PatchTransformConfig) -> Result<Self> {
        if config.size == 0 {
            return Err(MmitError::Config("patch size must be greater than zero".into()));
        }
        if config.scales.is_empty() || config.scales.iter().any(|&(w, h)| w == 0 || h == 0) {
            return Err(MmitError::Config(
                "resize scales must be non-empty and non-zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&config.flip_prob) {
            return Err(MmitError::Config(format!(
                "flip probability {} is outside [0, 1]",
                config.flip_prob
            )));
        }
        Ok(Self { config })
    }

    /// Default pipeline for square patches of side `size`.
    pub fn with_size(size: u32) -> Result<Self> {
        Self::new(PatchTransformConfig::new(size))
    }

    /// Get the config.
    pub fn config(&self) -> &PatchTransformConfig {
        &self.config
    }
}

/// Offset of a centered `crop`-wide window inside `extent`.
///
/// Cropping rounds half-pixel offsets to even; padding puts the extra
/// pixel on the trailing side.
fn center_offset(extent: u32, crop: usize) -> i64 {
    let diff = extent as i64 - crop as i64;
    if diff < 0 {
        return -((-diff) / 2);
    }
    let half = diff / 2;
    if diff % 2 == 1 && half % 2 == 1 {
        half + 1
    } else {
        half
    }
}

impl ImageTransform for PatchTransform {
    fn apply(&self, image: DynamicImage, rng: &mut dyn RngCore) -> Result<Array3<f32>> {
        let &(width, height) = self
            .config
            .scales
            .choose(rng)
            .ok_or_else(|| MmitError::Config("no resize scales configured".into()))?;

        let rgb = image
            .resize_exact(width, height, FilterType::Triangle)
            .to_rgb8();

        let size = self.config.size as usize;
        // Negative offsets pad with zeros.
        let top = center_offset(height, size);
        let left = center_offset(width, size);
        let flip = rng.gen_bool(self.config.flip_prob);

        let mean = self.config.mean;
        let std = self.config.std;
        let scale = self.config.rescale_factor;

        let tensor = Array3::from_shape_fn((3, size, size), |(c, y, x)| {
            let col = if flip { size - 1 - x } else { x };
            let src_x = col as i64 + left;
            let src_y = y as i64 + top;
            let inside =
                src_x >= 0 && src_y >= 0 && src_x < width as i64 && src_y < height as i64;
            let value = if inside {
                rgb.get_pixel(src_x as u32, src_y as u32)[c] as f32
            } else {
                0.0
            };
            (value * scale - mean[c]) / std[c]
        });

        Ok(tensor)
    }

    fn output_size(&self) -> u32 {
        self.config.size
    }
}

/// Decodes payloads and applies the transform unless the record type withholds images.
#[derive(Clone)]
pub struct ImageAdapter {
    transform: Arc<dyn ImageTransform>,
}

impl ImageAdapter {
    /// Wrap a transform pipeline.
    pub fn new(transform: Arc<dyn ImageTransform>) -> Self {
        Self { transform }
    }

    /// Side length of produced tensors.
    pub fn output_size(&self) -> u32 {
        self.transform.output_size()
    }

    /// Decode `payload` and transform it into a `[3, S, S]` tensor.
    ///
    /// The payload is always decoded so corrupt data surfaces as
    /// [`MmitError::Decode`]. Returns `None` for record types without images.
    pub fn decode_and_transform(
        &self,
        payload: &str,
        record_type: RecordType,
        rng: &mut dyn RngCore,
    ) -> Result<Option<Array3<f32>>> {
        let image = decode_image(payload)?;
        if !record_type.has_image() {
            return Ok(None);
        }

        let tensor = self.transform.apply(image, rng)?;
        let size = self.output_size() as usize;
        if tensor.shape() != [3, size, size] {
            return Err(MmitError::ShapeMismatch {
                expected: vec![3, size, size],
                actual: tensor.shape().to_vec(),
            });
        }
        Ok(Some(tensor))
    }
}

impl std::fmt::Debug for ImageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAdapter")
            .field("output_size", &self.output_size())
            .finish()
    }
}

/// Encode an image as a url-safe base64 PNG payload.
///
/// Handy for building image stores in tests and tooling.
pub fn encode_png_payload(image: &DynamicImage) -> Result<String> {
    let mut bytes = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .map_err(|e| MmitError::Decode(format!("png encode: {}", e)))?;
    Ok(base64::engine::general_purpose::URL_SAFE.encode(bytes.into_inner()))
}
