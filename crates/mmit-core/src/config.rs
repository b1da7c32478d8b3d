//! Configuration types for mmit.

use crate::{MmitError, RecordType, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Text length bound applied to instructions and answers.
///
/// Assembly always uses this value, whatever `max_src_length` and
/// `max_tgt_length` are configured to.
pub const FIXED_MAX_TEXT_WORDS: usize = 256;

/// Maximum number of in-context exemplars placed before a query.
pub const MAX_IN_CONTEXT_EXAMPLES: usize = 2;

/// Multimodal instruction dataset configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// JSON file mapping record id to instruction record.
    #[serde(default)]
    pub multi_instruct_path: PathBuf,

    /// JSON file mapping image id to base64 payload.
    #[serde(default)]
    pub images_path: PathBuf,

    /// JSON file mapping record id to its in-context example ids.
    ///
    /// Key order in this file defines the dataset order.
    #[serde(default)]
    pub train_config_path: PathBuf,

    /// Maximum instruction length in words (overridden, see [`FIXED_MAX_TEXT_WORDS`]).
    #[serde(default = "default_max_text_words")]
    pub max_src_length: usize,

    /// Maximum answer length in words (overridden, see [`FIXED_MAX_TEXT_WORDS`]).
    #[serde(default = "default_max_text_words")]
    pub max_tgt_length: usize,

    /// Side length of transformed patch images.
    #[serde(default = "default_patch_image_size")]
    pub patch_image_size: u32,

    /// Base seed for per-epoch deterministic augmentation. `None` disables seeding.
    #[serde(default)]
    pub pretrain_seed: Option<u64>,

    /// Record types to keep. `None` keeps every type.
    #[serde(default)]
    pub supported_types: Option<Vec<RecordType>>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            multi_instruct_path: PathBuf::new(),
            images_path: PathBuf::new(),
            train_config_path: PathBuf::new(),
            max_src_length: default_max_text_words(),
            max_tgt_length: default_max_text_words(),
            patch_image_size: default_patch_image_size(),
            pretrain_seed: None,
            supported_types: None,
        }
    }
}

impl DatasetConfig {
    /// Create a config pointing at the three data files.
    pub fn new(
        multi_instruct_path: impl Into<PathBuf>,
        images_path: impl Into<PathBuf>,
        train_config_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            multi_instruct_path: multi_instruct_path.into(),
            images_path: images_path.into(),
            train_config_path: train_config_path.into(),
            ..Default::default()
        }
    }

    /// Load a config from a YAML or JSON file, chosen by extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MmitError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        tracing::debug!(path = %path.display(), is_json, "loading dataset config");

        if is_json {
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(serde_yaml::from_str(&contents)?)
        }
    }

    /// Check that every data file exists and the image size is usable.
    pub fn validate(&self) -> Result<()> {
        for path in [
            &self.multi_instruct_path,
            &self.images_path,
            &self.train_config_path,
        ] {
            if !path.exists() {
                return Err(MmitError::Config(format!(
                    "The local datafile {} does not exist",
                    path.display()
                )));
            }
        }

        if self.patch_image_size == 0 {
            return Err(MmitError::Config(
                "patch_image_size must be greater than zero".into(),
            ));
        }

        Ok(())
    }

}

fn default_max_text_words() -> usize {
    FIXED_MAX_TEXT_WORDS
}
fn default_patch_image_size() -> u32 {
    224
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = DatasetConfig::default();
        assert_eq!(config.patch_image_size, 224);
        assert_eq!(config.max_src_length, 256);
        assert!(config.pretrain_seed.is_none());
        assert!(config.supported_types.is_none());
    }

    #[test]
    fn test_validate_missing_file() {
        let config = DatasetConfig::new("/nonexistent/a.json", "/nonexistent/b.json", "/c.json");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, MmitError::Config(_)));
        assert!(err.to_string().contains("/nonexistent/a.json"));
    }

    #[test]
    fn test_validate_existing_files() {
        let a = NamedTempFile::new().unwrap();
        let b = NamedTempFile::new().unwrap();
        let c = NamedTempFile::new().unwrap();
        let config = DatasetConfig::new(a.path(), b.path(), c.path());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "multi_instruct_path: data.json\nimages_path: images.json\ntrain_config_path: train.json\npretrain_seed: 7\nsupported_types: [caption, qa]"
        )
        .unwrap();

        let config = DatasetConfig::from_file(file.path()).unwrap();
        assert_eq!(config.pretrain_seed, Some(7));
        assert_eq!(config.patch_image_size, 224);
        assert_eq!(
            config.supported_types,
            Some(vec![RecordType::Caption, RecordType::Qa])
        );
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(
            file,
            r#"{{"multi_instruct_path": "d.json", "images_path": "i.json", "train_config_path": "t.json", "patch_image_size": 32}}"#
        )
        .unwrap();

        let config = DatasetConfig::from_file(file.path()).unwrap();
        assert_eq!(config.patch_image_size, 32);
        assert_eq!(config.train_config_path, PathBuf::from("t.json"));
    }
}
