//! DataLoader for creating training batches.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::collator::{MultimodalBatch, MultimodalCollator};
use crate::dataset::MultiInstructDataset;
use mmit_core::{MmitError, Result};

/// Configuration for the DataLoader.
#[derive(Debug, Clone)]
pub struct DataLoaderConfig {
    /// Batch size.
    pub batch_size: usize,
    /// Whether to shuffle the data.
    pub shuffle: bool,
    /// Random seed for shuffling.
    pub seed: u64,
    /// Whether to drop the last incomplete batch.
    pub drop_last: bool,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            shuffle: true,
            seed: 42,
            drop_last: false,
        }
    }
}

/// DataLoader that yields collated batches from a dataset.
pub struct DataLoader {
    /// The dataset.
    dataset: MultiInstructDataset,
    /// Collator.
    collator: MultimodalCollator,
    /// Configuration.
    config: DataLoaderConfig,
    /// Current index permutation.
    indices: Vec<usize>,
    /// Current position in the permutation.
    position: usize,
}

impl DataLoader {
    /// Create a new DataLoader positioned at the dataset's current epoch.
    pub fn new(
        dataset: MultiInstructDataset,
        collator: MultimodalCollator,
        config: DataLoaderConfig,
    ) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(MmitError::InvalidArgument(
                "batch_size must be greater than zero".into(),
            ));
        }

        let mut loader = Self {
            dataset,
            collator,
            config,
            indices: Vec::new(),
            position: 0,
        };
        let epoch = loader.dataset.epoch();
        loader.reset(epoch);
        Ok(loader)
    }

    /// Rewind for a new epoch.
    ///
    /// The permutation is rebuilt from `seed + epoch`, so an epoch always
    /// visits indices in the same order. The epoch is forwarded to the dataset.
    pub fn reset(&mut self, epoch: u64) {
        self.position = 0;
        self.dataset.set_epoch(epoch);
        self.indices = (0..self.dataset.len()).collect();

        if self.config.shuffle {
            let mut rng = rand::rngs::StdRng::seed_from_u64(self.config.seed.wrapping_add(epoch));
            self.indices.shuffle(&mut rng);
        }
        debug!(epoch, batches = self.num_batches(), "data loader reset");
    }

    /// Get the number of batches.
    pub fn num_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.config.drop_last {
            n / self.config.batch_size
        } else {
            n.div_ceil(self.config.batch_size)
        }
    }

    /// Get the total number of samples.
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Check if the loader is empty.
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// The dataset being iterated.
    pub fn dataset(&self) -> &MultiInstructDataset {
        &self.dataset
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.dataset.epoch()
    }

    /// Get the next batch.
    ///
    /// A failed example fails the whole batch; the loader still moves on to
    /// the following batch.
    pub fn next_batch(&mut self) -> Option<Result<MultimodalBatch>> {
        if self.position >= self.indices.len() {
            return None;
        }

        let batch_end = (self.position + self.config.batch_size).min(self.indices.len());
        let batch_indices = &self.indices[self.position..batch_end];

        // Check if we should drop incomplete batch
        if self.config.drop_last && batch_indices.len() < self.config.batch_size {
            return None;
        }

        let batch = self.create_batch(batch_indices);
        self.position = batch_end;

        Some(batch)
    }

    fn create_batch(&self, indices: &[usize]) -> Result<MultimodalBatch> {
        let examples = indices
            .iter()
            .map(|&i| self.dataset.get(i))
            .collect::<Result<Vec<_>>>()?;
        self.collator.collate(&examples)
    }
}

impl Iterator for DataLoader {
    type Item = Result<MultimodalBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}

impl std::fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("config", &self.config)
            .field("len", &self.len())
            .field("position", &self.position)
            .field("epoch", &self.epoch())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{default_stores, transform, ByteEncoder, PAD_ID};
    use mmit_core::DatasetConfig;
    use serial_test::serial;
    use std::sync::Arc;

    fn loader(config: DataLoaderConfig) -> DataLoader {
        let dataset_config = DatasetConfig {
            pretrain_seed: Some(1),
            ..Default::default()
        };
        let dataset = MultiInstructDataset::from_stores(
            default_stores(),
            &dataset_config,
            Arc::new(ByteEncoder),
            transform(),
        );
        DataLoader::new(dataset, MultimodalCollator::new(PAD_ID), config).unwrap()
    }

    fn epoch_ids(loader: &mut DataLoader) -> Vec<String> {
        loader
            .by_ref()
            .flat_map(|batch| batch.unwrap().ids)
            .collect()
    }

    #[test]
    #[serial]
    fn test_dataloader_basic() {
        let mut loader = loader(DataLoaderConfig {
            batch_size: 2,
            shuffle: false,
            ..Default::default()
        });

        // 5 examples: 2 full batches + 1 partial
        assert_eq!(loader.num_batches(), 3);

        let batch1 = loader.next_batch().unwrap().unwrap();
        assert_eq!(batch1.batch_size, 2);
        assert_eq!(batch1.ids, vec!["inst-q0", "inst-q1"]);

        let batch2 = loader.next_batch().unwrap().unwrap();
        assert_eq!(batch2.ids, vec!["inst-q2", "inst-pos"]);

        let batch3 = loader.next_batch().unwrap().unwrap();
        assert_eq!(batch3.batch_size, 1);

        assert!(loader.next_batch().is_none());
    }

    #[test]
    #[serial]
    fn test_dataloader_drop_last() {
        let loader = loader(DataLoaderConfig {
            batch_size: 2,
            drop_last: true,
            shuffle: false,
            ..Default::default()
        });

        assert_eq!(loader.num_batches(), 2);
        let batches: Vec<_> = loader.collect();
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.as_ref().unwrap().batch_size == 2));
    }

    #[test]
    #[serial]
    fn test_shuffle_reproducible_per_epoch() {
        let config = DataLoaderConfig {
            batch_size: 2,
            shuffle: true,
            seed: 9,
            drop_last: false,
        };
        let mut a = loader(config.clone());
        let mut b = loader(config);

        let first = epoch_ids(&mut a);
        assert_eq!(first, epoch_ids(&mut b));
        assert_eq!(first.len(), 5);

        a.reset(0);
        assert_eq!(epoch_ids(&mut a), first);

        let mut sorted = first.clone();
        sorted.sort();
        let mut expected = vec!["inst-pos", "inst-q0", "inst-q1", "inst-q2", "inst-q3"];
        expected.sort();
        assert_eq!(sorted, expected);
    }

    #[test]
    #[serial]
    fn test_reset_forwards_epoch() {
        let mut loader = loader(DataLoaderConfig::default());
        assert_eq!(loader.epoch(), 0);
        loader.reset(4);
        assert_eq!(loader.epoch(), 4);
        assert_eq!(loader.dataset().epoch(), 4);
    }

    #[test]
    fn test_zero_batch_size() {
        let dataset = MultiInstructDataset::from_stores(
            default_stores(),
            &DatasetConfig::default(),
            Arc::new(ByteEncoder),
            transform(),
        );
        let config = DataLoaderConfig {
            batch_size: 0,
            ..Default::default()
        };
        let result = DataLoader::new(dataset, MultimodalCollator::new(PAD_ID), config);
        assert!(matches!(result, Err(MmitError::InvalidArgument(_))));
    }

    #[test]
    #[serial]
    fn test_failed_example_fails_batch() {
        let mut stores = default_stores();
        stores.images = crate::store::ImageStore::default();
        let dataset = MultiInstructDataset::from_stores(
            stores,
            &DatasetConfig::default(),
            Arc::new(ByteEncoder),
            transform(),
        );
        let config = DataLoaderConfig {
            batch_size: 2,
            shuffle: false,
            ..Default::default()
        };
        let mut loader = DataLoader::new(dataset, MultimodalCollator::new(PAD_ID), config).unwrap();

        assert!(loader.next_batch().unwrap().is_err());
        assert!(loader.next_batch().unwrap().is_err());
    }
}
