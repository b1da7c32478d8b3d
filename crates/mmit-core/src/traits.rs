//! Collaborator traits.
//!
//! The pipeline treats the tokenizer and the image augmentation pipeline as
//! black boxes behind these two traits.

use crate::{Encoding, Result};
use image::DynamicImage;
use ndarray::Array3;
use rand::RngCore;

/// Text-to-token-id capability with fixed framing token ids.
pub trait TextEncoder: Send + Sync {
    /// Encode text without adding any special tokens.
    fn encode(&self, text: &str) -> Result<Encoding>;

    /// Token id prepended to every example.
    fn bos_token_id(&self) -> u32;

    /// Token id appended to every example.
    fn eos_token_id(&self) -> u32;

    /// Token id used to right-pad text in a batch.
    fn pad_token_id(&self) -> u32;
}

/// Image augmentation pipeline producing a fixed-size tensor.
pub trait ImageTransform: Send + Sync {
    /// Transform an RGB image into a normalized `[3, S, S]` tensor.
    ///
    /// All randomness must be drawn from `rng` so that a seeded caller gets
    /// reproducible output.
    fn apply(&self, image: DynamicImage, rng: &mut dyn RngCore) -> Result<Array3<f32>>;

    /// Side length `S` of the produced tensor.
    fn output_size(&self) -> u32;
}
