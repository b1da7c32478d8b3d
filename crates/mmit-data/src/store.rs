//! Typed lookup tables for records, images, and in-context train config.
//!
//! All three stores are loaded fully into memory from JSON objects keyed by
//! id. Missing ids surface as [`MmitError::Lookup`].

use mmit_core::{DatasetConfig, LookupKind, MmitError, RecordType, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

/// One instruction/answer training record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Identifier reported on assembled examples.
    pub instruction_id: String,
    /// Instruction (question) text.
    pub instruction: String,
    /// Answer text.
    pub answer: String,
    /// Key into the image store.
    pub image_ids: String,
    /// Dataset split name.
    #[serde(default)]
    pub split: String,
    /// Source dataset name.
    #[serde(default)]
    pub dataset_name: String,
    /// Task type.
    #[serde(rename = "type", default)]
    pub record_type: RecordType,
}

/// Image store entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    /// Url-safe base64 encoded image bytes.
    pub image: String,
}

/// Train config entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainConfigEntry {
    /// Records shown as few-shot exemplars before this one, in order.
    #[serde(default)]
    pub in_context_example_ids: Vec<String>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| {
        MmitError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to open {}: {}", path.display(), e),
        ))
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        MmitError::Serialization(format!("Failed to parse {}: {}", path.display(), e))
    })
}

/// Record id to [`Record`].
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: HashMap<String, Record>,
}

impl RecordStore {
    /// Build a store from in-memory records.
    pub fn from_records(records: HashMap<String, Record>) -> Self {
        Self { records }
    }

    /// Load a JSON object of records.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let records: HashMap<String, Record> = read_json(path.as_ref())?;
        debug!(count = records.len(), path = %path.as_ref().display(), "loaded records");
        Ok(Self { records })
    }

    /// Look up a record.
    pub fn get(&self, id: &str) -> Result<&Record> {
        self.records
            .get(id)
            .ok_or_else(|| MmitError::lookup(LookupKind::Record, id))
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Image id to base64 payload.
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    images: HashMap<String, ImageEntry>,
}

impl ImageStore {
    /// Build a store from in-memory entries.
    pub fn from_entries(images: HashMap<String, ImageEntry>) -> Self {
        Self { images }
    }

    /// Load a JSON object of `{"image": payload}` entries.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let images: HashMap<String, ImageEntry> = read_json(path.as_ref())?;
        debug!(count = images.len(), path = %path.as_ref().display(), "loaded images");
        Ok(Self { images })
    }

    /// Look up the payload for an image id.
    pub fn payload(&self, id: &str) -> Result<&str> {
        self.images
            .get(id)
            .map(|entry| entry.image.as_str())
            .ok_or_else(|| MmitError::lookup(LookupKind::Image, id))
    }

    /// Number of images.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Record id to in-context exemplar ids, in file order.
///
/// The key order is the dataset order, so entries are kept in a vector
/// alongside an index for lookups.
#[derive(Debug, Clone, Default)]
pub struct TrainConfigStore {
    keys: Vec<String>,
    entries: HashMap<String, TrainConfigEntry>,
}

impl TrainConfigStore {
    /// Build a store from ordered `(record id, entry)` pairs.
    ///
    /// A repeated id keeps its first position and its last entry.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, TrainConfigEntry)>) -> Self {
        let mut store = Self::default();
        for (id, entry) in entries {
            if store.entries.insert(id.clone(), entry).is_none() {
                store.keys.push(id);
            }
        }
        store
    }

    /// Load a JSON object, preserving key order.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw: serde_json::Map<String, serde_json::Value> = read_json(path.as_ref())?;
        let mut entries = Vec::with_capacity(raw.len());
        for (id, value) in raw {
            let entry: TrainConfigEntry = serde_json::from_value(value).map_err(|e| {
                MmitError::Serialization(format!("train config entry {}: {}", id, e))
            })?;
            entries.push((id, entry));
        }
        debug!(count = entries.len(), path = %path.as_ref().display(), "loaded train config");
        Ok(Self::from_entries(entries))
    }

    /// Look up the in-context ids for a record.
    pub fn get(&self, id: &str) -> Result<&TrainConfigEntry> {
        self.entries
            .get(id)
            .ok_or_else(|| MmitError::lookup(LookupKind::TrainConfig, id))
    }

    /// Record ids in dataset order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Number of training keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// The three stores an assembler reads from.
#[derive(Debug, Clone, Default)]
pub struct DataStores {
    /// Instruction records.
    pub records: RecordStore,
    /// Encoded images.
    pub images: ImageStore,
    /// In-context configuration, which also fixes dataset order.
    pub train_config: TrainConfigStore,
}

impl DataStores {
    /// Validate the configured paths and load all three stores.
    pub fn load(config: &DatasetConfig) -> Result<Self> {
        config.validate()?;

        let records = RecordStore::from_json_file(&config.multi_instruct_path)?;
        let images = ImageStore::from_json_file(&config.images_path)?;
        let train_config = TrainConfigStore::from_json_file(&config.train_config_path)?;

        info!(
            records = records.len(),
            images = images.len(),
            train_keys = train_config.len(),
            "loaded multimodal instruction stores"
        );

        Ok(Self {
            records,
            images,
            train_config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_json(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    #[test]
    fn test_record_store_loading() {
        let file = write_json(
            r#"{"r1": {"instruction_id": "r1", "instruction": "What?", "answer": "This.",
                       "image_ids": "img1", "split": "train", "dataset_name": "vqa", "type": "qa"},
                "r2": {"instruction_id": "r2", "instruction": "Where?", "answer": "There.",
                       "image_ids": "img2", "type": "conversation"}}"#,
        );

        let store = RecordStore::from_json_file(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        let r1 = store.get("r1").unwrap();
        assert_eq!(r1.record_type, RecordType::Qa);
        assert_eq!(r1.dataset_name, "vqa");
        let r2 = store.get("r2").unwrap();
        assert_eq!(r2.record_type, RecordType::Other);
        assert_eq!(r2.split, "");
    }

    #[test]
    fn test_missing_record_is_lookup_error() {
        let store = RecordStore::default();
        let err = store.get("nope").unwrap_err();
        assert!(matches!(
            err,
            MmitError::Lookup { kind: LookupKind::Record, ref id } if id == "nope"
        ));
    }

    #[test]
    fn test_image_store_payload() {
        let file = write_json(r#"{"img1": {"image": "abc"}}"#);
        let store = ImageStore::from_json_file(file.path()).unwrap();
        assert_eq!(store.payload("img1").unwrap(), "abc");
        assert!(matches!(
            store.payload("img2"),
            Err(MmitError::Lookup { kind: LookupKind::Image, .. })
        ));
    }

    #[test]
    fn test_train_config_preserves_file_order() {
        let file = write_json(
            r#"{"zeta": {"in_context_example_ids": ["alpha"]},
                "alpha": {"in_context_example_ids": []},
                "mid": {"in_context_example_ids": ["zeta", "alpha", "mid"]}}"#,
        );

        let store = TrainConfigStore::from_json_file(file.path()).unwrap();
        assert_eq!(store.keys(), &["zeta", "alpha", "mid"]);
        assert_eq!(store.get("mid").unwrap().in_context_example_ids.len(), 3);
        assert!(store.get("alpha").unwrap().in_context_example_ids.is_empty());
    }

    #[test]
    fn test_train_config_missing_id() {
        let store = TrainConfigStore::from_entries(vec![("a".to_string(), TrainConfigEntry::default())]);
        assert!(matches!(
            store.get("b"),
            Err(MmitError::Lookup { kind: LookupKind::TrainConfig, .. })
        ));
    }

    #[test]
    fn test_malformed_json() {
        let file = write_json("{not json");
        let result = RecordStore::from_json_file(file.path());
        assert!(matches!(result, Err(MmitError::Serialization(_))));
    }

    #[test]
    fn test_data_stores_missing_path_fails_fast() {
        let records = write_json("{}");
        let config = DatasetConfig::new(records.path(), "/missing/images.json", records.path());
        let err = DataStores::load(&config).unwrap_err();
        assert!(matches!(err, MmitError::Config(_)));
        assert!(err.to_string().contains("/missing/images.json"));
    }

    #[test]
    fn test_missing_file() {
        let result = ImageStore::from_json_file("/definitely/not/here.json");
        assert!(matches!(result, Err(MmitError::Io(_))));
    }
}
