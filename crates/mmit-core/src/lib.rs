//! Core types, traits, and configuration for the mmit multimodal data pipeline.
//!
//! This crate provides the foundational abstractions shared by the data and
//! CLI crates:
//!
//! - Error handling infrastructure
//! - Dataset configuration and its fixed limits
//! - The record type tag and its image policy
//! - Collaborator traits for the tokenizer and the image transform

#![warn(missing_docs)]

mod config;
mod error;
mod traits;
mod types;

pub use config::*;
pub use error::*;
pub use traits::*;
pub use types::*;
