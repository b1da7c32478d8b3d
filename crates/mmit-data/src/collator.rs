//! Data collation utilities.

use crate::assembler::AssembledExample;
use mmit_core::{MmitError, Result, TextEncoder};
use ndarray::{s, Array1, Array2, Array6};

/// Pads and stacks [`AssembledExample`]s into a [`MultimodalBatch`].
#[derive(Debug, Clone)]
pub struct MultimodalCollator {
    /// Padding token ID.
    pub pad_token_id: u32,
}

impl MultimodalCollator {
    /// Create a new collator.
    pub fn new(pad_token_id: u32) -> Self {
        Self { pad_token_id }
    }

    /// Collator padding with the tokenizer's pad id.
    pub fn for_encoder(tokenizer: &dyn TextEncoder) -> Self {
        Self::new(tokenizer.pad_token_id())
    }

    /// Collate examples into a batch, preserving order.
    ///
    /// Text is right-padded to the longest example and image slots are padded
    /// with zero tensors (mask `false`) to the largest slot count.
    pub fn collate(&self, examples: &[AssembledExample]) -> Result<MultimodalBatch> {
        let first = examples
            .first()
            .ok_or_else(|| MmitError::InvalidArgument("cannot collate an empty batch".into()))?;

        let image_size = first.image_size();
        for example in examples {
            let shape = example.patch_images.shape();
            if shape[1..] != [1, 3, image_size, image_size] {
                return Err(MmitError::ShapeMismatch {
                    expected: vec![shape[0], 1, 3, image_size, image_size],
                    actual: shape.to_vec(),
                });
            }
        }

        let batch_size = examples.len();
        let seq_len = examples.iter().map(|e| e.source.len()).max().unwrap_or(0);
        let num_slots = examples.iter().map(|e| e.num_slots()).max().unwrap_or(0);

        let mut input_ids = Array2::from_elem((batch_size, seq_len), self.pad_token_id);
        let mut attention_mask = Array2::<u32>::zeros((batch_size, seq_len));
        let mut patch_images =
            Array6::<f32>::zeros((batch_size, num_slots, 1, 3, image_size, image_size));
        let mut patch_masks = Array2::from_elem((batch_size, num_slots), false);
        let mut ids = Vec::with_capacity(batch_size);
        let mut src_lengths = Vec::with_capacity(batch_size);

        for (i, example) in examples.iter().enumerate() {
            let len = example.source.len();
            for (t, (&id, &mask)) in example.source.iter().zip(&example.text_mask).enumerate() {
                input_ids[[i, t]] = id;
                attention_mask[[i, t]] = mask;
            }

            let slots = example.num_slots();
            patch_images
                .slice_mut(s![i, ..slots, .., .., .., ..])
                .assign(&example.patch_images);
            for (n, &mask) in example.patch_masks.iter().enumerate() {
                patch_masks[[i, n]] = mask;
            }

            ids.push(example.id.clone());
            src_lengths.push(len);
        }

        let conf = examples.iter().map(|e| e.conf).collect::<Array1<f32>>();
        let ntokens = src_lengths.iter().sum();

        Ok(MultimodalBatch {
            ids,
            input_ids,
            attention_mask,
            patch_images,
            patch_masks,
            conf,
            src_lengths,
            ntokens,
            batch_size,
            seq_len,
            num_slots,
        })
    }
}

/// A collated batch ready for the model.
#[derive(Debug, Clone)]
pub struct MultimodalBatch {
    /// Example ids, in batch order.
    pub ids: Vec<String>,
    /// Input token IDs [batch_size, seq_len].
    pub input_ids: Array2<u32>,
    /// Attention mask [batch_size, seq_len].
    pub attention_mask: Array2<u32>,
    /// Patch images [batch_size, num_slots, 1, 3, S, S].
    pub patch_images: Array6<f32>,
    /// Slot masks [batch_size, num_slots].
    pub patch_masks: Array2<bool>,
    /// Confidence [batch_size].
    pub conf: Array1<f32>,
    /// Unpadded text length per example.
    pub src_lengths: Vec<usize>,
    /// Total number of unpadded text tokens.
    pub ntokens: usize,
    /// Batch size.
    pub batch_size: usize,
    /// Sequence length.
    pub seq_len: usize,
    /// Image slots per example.
    pub num_slots: usize,
}
