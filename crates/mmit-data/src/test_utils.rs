//! Shared fixtures for unit tests.

use crate::image_processing::{encode_png_payload, PatchTransform};
use crate::store::{
    DataStores, ImageEntry, ImageStore, Record, RecordStore, TrainConfigEntry, TrainConfigStore,
};
use image::{DynamicImage, Rgb, RgbImage};
use mmit_core::{Encoding, ImageTransform, MmitError, RecordType, Result, TextEncoder};
use rand::rngs::StdRng;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

pub const PAD_ID: u32 = 0;
pub const BOS_ID: u32 = 1;
pub const EOS_ID: u32 = 2;
const BYTE_OFFSET: u32 = 10;

/// Byte-level encoder: one token per UTF-8 byte, shifted past the framing ids.
#[derive(Debug, Default)]
pub struct ByteEncoder;

impl ByteEncoder {
    pub fn decode(ids: &[u32]) -> String {
        let bytes: Vec<u8> = ids.iter().map(|&id| (id - BYTE_OFFSET) as u8).collect();
        String::from_utf8(bytes).unwrap()
    }
}

impl TextEncoder for ByteEncoder {
    fn encode(&self, text: &str) -> Result<Encoding> {
        Ok(Encoding::from_ids(
            text.bytes().map(|b| b as u32 + BYTE_OFFSET).collect(),
        ))
    }

    fn bos_token_id(&self) -> u32 {
        BOS_ID
    }

    fn eos_token_id(&self) -> u32 {
        EOS_ID
    }

    fn pad_token_id(&self) -> u32 {
        PAD_ID
    }
}

/// Encoder that always fails.
#[derive(Debug, Default)]
pub struct FailingEncoder;

impl TextEncoder for FailingEncoder {
    fn encode(&self, _text: &str) -> Result<Encoding> {
        Err(MmitError::Tokenizer("encoder unavailable".into()))
    }

    fn bos_token_id(&self) -> u32 {
        BOS_ID
    }

    fn eos_token_id(&self) -> u32 {
        EOS_ID
    }

    fn pad_token_id(&self) -> u32 {
        PAD_ID
    }
}

pub const PATCH_SIZE: u32 = 4;

pub fn transform() -> Arc<dyn ImageTransform> {
    Arc::new(PatchTransform::with_size(PATCH_SIZE).unwrap())
}

pub fn record(id: &str, record_type: RecordType) -> Record {
    Record {
        instruction_id: format!("inst-{id}"),
        instruction: format!("What is in image {id}?"),
        answer: format!("It shows {id}. Nothing else."),
        image_ids: format!("img-{id}"),
        split: "train".into(),
        dataset_name: "fixture".into(),
        record_type,
    }
}

fn payload(shade: u8) -> String {
    let img = RgbImage::from_fn(6, 6, |x, y| Rgb([shade, (x * 40) as u8, (y * 40) as u8]));
    encode_png_payload(&DynamicImage::ImageRgb8(img)).unwrap()
}

/// Builds stores from `(id, type, in-context ids)` triples, in order.
pub fn stores(spec: &[(&str, RecordType, Vec<&str>)]) -> DataStores {
    let mut records = HashMap::new();
    let mut images = HashMap::new();
    let mut entries = Vec::new();

    for (i, (id, record_type, in_context)) in spec.iter().enumerate() {
        let rec = record(id, *record_type);
        images.insert(
            rec.image_ids.clone(),
            ImageEntry {
                image: payload(30 * i as u8),
            },
        );
        records.insert(id.to_string(), rec);
        entries.push((
            id.to_string(),
            TrainConfigEntry {
                in_context_example_ids: in_context.iter().map(|s| s.to_string()).collect(),
            },
        ));
    }

    DataStores {
        records: RecordStore::from_records(records),
        images: ImageStore::from_entries(images),
        train_config: TrainConfigStore::from_entries(entries),
    }
}

/// q0 alone, q1 with one exemplar, q2 with three (capped to two), and a
/// positioning record with one exemplar.
pub fn default_stores() -> DataStores {
    stores(&[
        ("q0", RecordType::Qa, vec![]),
        ("q1", RecordType::Caption, vec!["q0"]),
        ("q2", RecordType::Qa, vec!["q0", "q1", "q3"]),
        ("pos", RecordType::Positioning, vec!["q0"]),
        ("q3", RecordType::Other, vec!["q1", "q0"]),
    ])
}

/// Four draws, enough to tell generator states apart.
pub fn draws(rng: &mut StdRng) -> Vec<u64> {
    (0..4).map(|_| rng.gen()).collect()
}
