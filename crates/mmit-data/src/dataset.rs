//! Index-addressable multimodal instruction dataset.

use crate::assembler::{AssembledExample, ExampleAssembler};
use crate::image_processing::PatchTransform;
use crate::seeding::SeedScope;
use crate::store::DataStores;
use mmit_core::{
    DatasetConfig, ImageTransform, MmitError, Result, TextEncoder, FIXED_MAX_TEXT_WORDS,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Dataset over the train-config keys, assembling examples on demand.
///
/// Position `i` maps to the `i`-th key of the train config. Each lookup runs
/// inside a [`SeedScope`] seeded from `(pretrain_seed, epoch)`, so the same
/// index in the same epoch always yields the same augmentation.
#[derive(Debug, Clone)]
pub struct MultiInstructDataset {
    assembler: ExampleAssembler,
    seed: Option<u64>,
    epoch: u64,
}

impl MultiInstructDataset {
    /// Validate the config, load the stores, and build the dataset.
    pub fn new(
        config: &DatasetConfig,
        tokenizer: Arc<dyn TextEncoder>,
        transform: Arc<dyn ImageTransform>,
    ) -> Result<Self> {
        let stores = DataStores::load(config)?;
        Ok(Self::from_stores(stores, config, tokenizer, transform))
    }

    /// Like [`Self::new`], using the default [`PatchTransform`] at the
    /// configured patch size.
    pub fn with_default_transform(
        config: &DatasetConfig,
        tokenizer: Arc<dyn TextEncoder>,
    ) -> Result<Self> {
        let transform = PatchTransform::with_size(config.patch_image_size)?;
        Self::new(config, tokenizer, Arc::new(transform))
    }

    /// Build a dataset over already loaded stores.
    ///
    /// Only the seed, type filter, and length settings of `config` are used.
    pub fn from_stores(
        stores: DataStores,
        config: &DatasetConfig,
        tokenizer: Arc<dyn TextEncoder>,
        transform: Arc<dyn ImageTransform>,
    ) -> Self {
        if config.max_src_length != FIXED_MAX_TEXT_WORDS
            || config.max_tgt_length != FIXED_MAX_TEXT_WORDS
        {
            warn!(
                max_src_length = config.max_src_length,
                max_tgt_length = config.max_tgt_length,
                fixed = FIXED_MAX_TEXT_WORDS,
                "configured text lengths are ignored, using fixed bound"
            );
        }

        info!(
            examples = stores.train_config.len(),
            seed = ?config.pretrain_seed,
            supported_types = ?config.supported_types,
            "multi-instruct dataset ready"
        );

        let assembler = ExampleAssembler::new(Arc::new(stores), tokenizer, transform)
            .with_supported_types(config.supported_types.clone());

        Self {
            assembler,
            seed: config.pretrain_seed,
            epoch: 0,
        }
    }

    /// Number of logical positions.
    pub fn len(&self) -> usize {
        self.assembler.stores().train_config.len()
    }

    /// Check if the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record id at a logical position.
    pub fn record_id(&self, index: usize) -> Option<&str> {
        self.assembler
            .stores()
            .train_config
            .keys()
            .get(index)
            .map(String::as_str)
    }

    /// Set the epoch mixed into the per-example seed.
    pub fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The assembler backing this dataset.
    pub fn assembler(&self) -> &ExampleAssembler {
        &self.assembler
    }

    /// Assemble the example at `index`.
    ///
    /// Records whose type is filtered out are skipped in favor of the next
    /// position. Running off the end fails with [`MmitError::IndexExhausted`].
    pub fn get(&self, index: usize) -> Result<AssembledExample> {
        let keys = self.assembler.stores().train_config.keys();
        let len = keys.len();

        for (position, record_id) in keys.iter().enumerate().skip(index) {
            let example = SeedScope::with(self.seed, &[self.epoch], |rng| {
                self.assembler.assemble(record_id, rng)
            })?;

            match example {
                Some(example) => return Ok(example),
                None => debug!(position, record_id = %record_id, "advancing past skipped record"),
            }
        }

        Err(MmitError::IndexExhausted { index, len })
    }
}
