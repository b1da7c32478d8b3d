//! Common type definitions.

use serde::{Deserialize, Serialize};

/// Task type of an instruction record.
///
/// Unrecognized type strings deserialize to [`RecordType::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    /// Image captioning.
    Caption,
    /// Visual question answering.
    Qa,
    /// Region grounding. Images are withheld for this type.
    Positioning,
    /// Any other task type (conversation, reasoning, ...).
    #[default]
    #[serde(other)]
    Other,
}

impl RecordType {
    /// Whether examples of this type carry transformed image tensors.
    ///
    /// `Positioning` examples keep their image slots but the slots are
    /// zero-filled and masked out.
    #[must_use]
    pub const fn has_image(&self) -> bool {
        match self {
            Self::Caption | Self::Qa | Self::Other => true,
            Self::Positioning => false,
        }
    }

    /// Lowercase name as it appears in the record store.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Caption => "caption",
            Self::Qa => "qa",
            Self::Positioning => "positioning",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token ids and attention mask produced by a [`TextEncoder`](crate::TextEncoder).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Encoding {
    /// Token ids.
    pub ids: Vec<u32>,
    /// Attention mask, one entry per id.
    pub attention_mask: Vec<u32>,
}

impl Encoding {
    /// Build an encoding whose mask attends to every id.
    pub fn from_ids(ids: Vec<u32>) -> Self {
        let attention_mask = vec![1; ids.len()];
        Self {
            ids,
            attention_mask,
        }
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if the encoding is empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
