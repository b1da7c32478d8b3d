//! Per-example assembly of few-shot multimodal training examples.
//!
//! An example is built from up to [`MAX_IN_CONTEXT_EXAMPLES`] exemplar records
//! followed by the query record. Each record contributes one turn of text
//!
//! ```text
//! <image>User: {instruction} GPT:<answer> {answer}<|endofchunk|>
//! ```
//!
//! and one image slot, so the `n`-th `<image>` marker in the text always
//! refers to the `n`-th slot of `patch_images`.

use crate::image_processing::ImageAdapter;
use crate::store::{DataStores, Record};
use crate::text::{normalize_answer, normalize_question};
use crate::tokenizer::{ANSWER_TOKEN, END_OF_CHUNK_TOKEN, IMAGE_TOKEN};
use mmit_core::{
    ImageTransform, MmitError, RecordType, Result, TextEncoder, FIXED_MAX_TEXT_WORDS,
    MAX_IN_CONTEXT_EXAMPLES,
};
use ndarray::{s, Array3, Array5};
use rand::RngCore;
use std::sync::Arc;
use tracing::{debug, trace};

/// Confidence assigned to every assembled example.
pub const DEFAULT_CONFIDENCE: f32 = 1.0;

/// One fully assembled training example.
#[derive(Debug, Clone)]
pub struct AssembledExample {
    /// Instruction id of the query record.
    pub id: String,
    /// Token ids framed by BOS and EOS.
    pub source: Vec<u32>,
    /// Attention mask for `source` (all ones).
    pub text_mask: Vec<u32>,
    /// Image slots `[slots, 1, 3, S, S]`, exemplars first, query last.
    pub patch_images: Array5<f32>,
    /// `true` for slots holding a real image.
    pub patch_masks: Vec<bool>,
    /// Example confidence.
    pub conf: f32,
}

impl AssembledExample {
    /// Number of image slots (exemplars + query).
    pub fn num_slots(&self) -> usize {
        self.patch_masks.len()
    }

    /// Side length of the patch images.
    pub fn image_size(&self) -> usize {
        self.patch_images.shape()[4]
    }

    /// Number of text tokens, including the framing tokens.
    pub fn len(&self) -> usize {
        self.source.len()
    }

    /// Check if the example has no text tokens.
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

/// Render a single turn of the multi-turn template.
pub fn format_turn(instruction: &str, answer: &str) -> String {
    format!("{IMAGE_TOKEN}User: {instruction} GPT:{ANSWER_TOKEN} {answer}{END_OF_CHUNK_TOKEN}")
}

/// Builds [`AssembledExample`]s from the stores.
#[derive(Clone)]
pub struct ExampleAssembler {
    stores: Arc<DataStores>,
    images: ImageAdapter,
    tokenizer: Arc<dyn TextEncoder>,
    supported_types: Option<Vec<RecordType>>,
}

impl ExampleAssembler {
    /// Create an assembler that accepts every record type.
    pub fn new(
        stores: Arc<DataStores>,
        tokenizer: Arc<dyn TextEncoder>,
        transform: Arc<dyn ImageTransform>,
    ) -> Self {
        Self {
            stores,
            images: ImageAdapter::new(transform),
            tokenizer,
            supported_types: None,
        }
    }

    /// Restrict assembly to the given record types.
    pub fn with_supported_types(mut self, supported_types: Option<Vec<RecordType>>) -> Self {
        self.supported_types = supported_types;
        self
    }

    /// The stores this assembler reads from.
    pub fn stores(&self) -> &DataStores {
        &self.stores
    }

    fn supports(&self, record_type: RecordType) -> bool {
        self.supported_types
            .as_ref()
            .map_or(true, |types| types.contains(&record_type))
    }

    /// Records shown before `record_id`, capped at [`MAX_IN_CONTEXT_EXAMPLES`].
    fn in_context_records(&self, record_id: &str) -> Result<Vec<&Record>> {
        let entry = self.stores.train_config.get(record_id)?;
        entry
            .in_context_example_ids
            .iter()
            .take(MAX_IN_CONTEXT_EXAMPLES)
            .map(|id| self.stores.records.get(id))
            .collect()
    }

    fn render_record(record: &Record) -> String {
        let instruction = normalize_question(&record.instruction, FIXED_MAX_TEXT_WORDS)
            .replace(IMAGE_TOKEN, "")
            .trim()
            .to_string();
        let answer = record
            .answer
            .replace(IMAGE_TOKEN, " ")
            .trim()
            .replace('#', " ");
        let answer = normalize_answer(&answer, FIXED_MAX_TEXT_WORDS);
        format_turn(&instruction, &answer)
    }

    /// The full text handed to the tokenizer for `record_id`.
    pub fn render_text(&self, record_id: &str) -> Result<String> {
        let query = self.stores.records.get(record_id)?;
        let mut text = String::new();
        for record in self.in_context_records(record_id)? {
            text.push_str(&Self::render_record(record));
        }
        text.push_str(&Self::render_record(query));
        Ok(text)
    }

    /// Decode one slot. Image suppression follows the query's type.
    fn image_slot(
        &self,
        record: &Record,
        query_type: RecordType,
        rng: &mut dyn RngCore,
    ) -> Result<Option<Array3<f32>>> {
        let payload = self.stores.images.payload(&record.image_ids)?;
        self.images.decode_and_transform(payload, query_type, rng)
    }

    /// Assemble the example for `record_id`.
    ///
    /// Returns `Ok(None)` when the record's type is not supported.
    pub fn assemble(
        &self,
        record_id: &str,
        rng: &mut dyn RngCore,
    ) -> Result<Option<AssembledExample>> {
        let query = self.stores.records.get(record_id)?;
        if !self.supports(query.record_type) {
            debug!(record_id, record_type = %query.record_type, "skipping unsupported record");
            return Ok(None);
        }

        let in_context = self.in_context_records(record_id)?;

        let mut slots = Vec::with_capacity(in_context.len() + 1);
        let mut text = String::new();
        for record in &in_context {
            slots.push(self.image_slot(record, query.record_type, rng)?);
            text.push_str(&Self::render_record(record));
        }
        slots.push(self.image_slot(query, query.record_type, rng)?);
        text.push_str(&Self::render_record(query));

        let encoding = self.tokenizer.encode(&text)?;
        if encoding.attention_mask.len() != encoding.ids.len() {
            return Err(MmitError::ShapeMismatch {
                expected: vec![encoding.ids.len()],
                actual: vec![encoding.attention_mask.len()],
            });
        }

        let mut source = Vec::with_capacity(encoding.ids.len() + 2);
        source.push(self.tokenizer.bos_token_id());
        source.extend_from_slice(&encoding.ids);
        source.push(self.tokenizer.eos_token_id());

        let mut text_mask = Vec::with_capacity(source.len());
        text_mask.push(1);
        text_mask.extend_from_slice(&encoding.attention_mask);
        text_mask.push(1);

        let size = self.images.output_size() as usize;
        let mut patch_images = Array5::<f32>::zeros((slots.len(), 1, 3, size, size));
        let mut patch_masks = Vec::with_capacity(slots.len());
        for (i, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(tensor) => {
                    patch_images.slice_mut(s![i, 0, .., .., ..]).assign(&tensor);
                    patch_masks.push(true);
                }
                None => patch_masks.push(false),
            }
        }

        trace!(
            record_id,
            tokens = source.len(),
            slots = patch_masks.len(),
            "assembled example"
        );

        Ok(Some(AssembledExample {
            id: query.instruction_id.clone(),
            source,
            text_mask,
            patch_images,
            patch_masks,
            conf: DEFAULT_CONFIDENCE,
        }))
    }
}

impl std::fmt::Debug for ExampleAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExampleAssembler")
            .field("records", &self.stores.records.len())
            .field("images", &self.images)
            .field("supported_types", &self.supported_types)
            .finish()
    }
}
