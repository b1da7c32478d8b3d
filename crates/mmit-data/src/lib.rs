//! Multimodal instruction-tuning data pipeline for mmit.
//!
//! This crate provides:
//! - Text normalization for instructions, answers, and captions
//! - Image decoding and the default patch transform
//! - Typed record, image, and train-config stores
//! - Few-shot example assembly with deterministic seeding
//! - An index-addressable dataset, a batch collator, and a DataLoader
//! - Tokenizer integration

#![warn(missing_docs)]

pub mod assembler;
pub mod collator;
pub mod dataloader;
pub mod dataset;
pub mod image_processing;
pub mod seeding;
pub mod store;
pub mod text;
pub mod tokenizer;

#[cfg(test)]
mod test_utils;

pub use assembler::*;
pub use collator::*;
pub use dataloader::*;
pub use dataset::*;
pub use image_processing::*;
pub use seeding::*;
pub use store::*;
pub use text::*;
pub use tokenizer::*;
