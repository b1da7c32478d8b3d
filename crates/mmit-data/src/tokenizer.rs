//! Tokenizer integration.

use mmit_core::{Encoding, MmitError, Result, TextEncoder};
use std::path::Path;

/// Markers emitted by the multi-turn template.
pub const IMAGE_TOKEN: &str = "<image>";
/// Marks the start of an answer inside a turn.
pub const ANSWER_TOKEN: &str = "<answer>";
/// Terminates a turn.
pub const END_OF_CHUNK_TOKEN: &str = "<|endofchunk|>";

/// Wrapper around the tokenizers library with resolved framing token ids.
pub struct Tokenizer {
    inner: tokenizers::Tokenizer,
    bos_token_id: u32,
    eos_token_id: u32,
    pad_token_id: u32,
}

impl Tokenizer {
    /// Load a tokenizer from a local file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| MmitError::Tokenizer(e.to_string()))?;
        Self::from_inner(inner)
    }

    /// Load a tokenizer from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_bytes(bytes)
            .map_err(|e| MmitError::Tokenizer(e.to_string()))?;
        Self::from_inner(inner)
    }

    /// Resolve framing ids from common token names.
    ///
    /// BOS and EOS are required; padding falls back to EOS.
    pub fn from_inner(inner: tokenizers::Tokenizer) -> Result<Self> {
        let bos_token_id = lookup_any(&inner, &["<s>", "<|begin_of_text|>", "<bos>"])
            .ok_or_else(|| MmitError::Tokenizer("no BOS token in vocabulary".into()))?;
        let eos_token_id = lookup_any(
            &inner,
            &["</s>", "<|endoftext|>", "<|end_of_text|>", "<eos>"],
        )
        .ok_or_else(|| MmitError::Tokenizer("no EOS token in vocabulary".into()))?;
        let pad_token_id = lookup_any(&inner, &["<PAD>", "<pad>", "[PAD]", "<|pad|>"])
            .unwrap_or(eos_token_id);

        Ok(Self {
            inner,
            bos_token_id,
            eos_token_id,
            pad_token_id,
        })
    }

    /// Override the BOS token id.
    pub fn with_bos_token_id(mut self, bos_token_id: u32) -> Self {
        self.bos_token_id = bos_token_id;
        self
    }

    /// Override the EOS token id.
    pub fn with_eos_token_id(mut self, eos_token_id: u32) -> Self {
        self.eos_token_id = eos_token_id;
        self
    }

    /// Override the padding token id.
    pub fn with_pad_token_id(mut self, pad_token_id: u32) -> Self {
        self.pad_token_id = pad_token_id;
        self
    }

    /// Decode token IDs to text without skipping special tokens.
    pub fn decode_with_special_tokens(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, false)
            .map_err(|e| MmitError::Tokenizer(e.to_string()))
    }

    /// Get vocabulary size.
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }
}

fn lookup_any(inner: &tokenizers::Tokenizer, names: &[&str]) -> Option<u32> {
    names.iter().find_map(|name| inner.token_to_id(name))
}

impl TextEncoder for Tokenizer {
    fn encode(&self, text: &str) -> Result<Encoding> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| MmitError::Tokenizer(e.to_string()))?;
        Ok(Encoding {
            ids: encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
        })
    }

    fn bos_token_id(&self) -> u32 {
        self.bos_token_id
    }

    fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }

    fn pad_token_id(&self) -> u32 {
        self.pad_token_id
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("vocab_size", &self.vocab_size())
            .field("bos_token_id", &self.bos_token_id)
            .field("eos_token_id", &self.eos_token_id)
            .field("pad_token_id", &self.pad_token_id)
            .finish()
    }
}
