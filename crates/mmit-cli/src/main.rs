//! mmit CLI - inspection of multimodal instruction-tuning datasets.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mmit_core::{DatasetConfig, RecordType, TextEncoder};
use mmit_data::{
    DataLoader, DataLoaderConfig, MultiInstructDataset, MultimodalBatch, MultimodalCollator,
    Tokenizer,
};

#[derive(Parser)]
#[command(name = "mmit")]
#[command(author, version, about = "Multimodal instruction-tuning data pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble and collate the first examples of a dataset
    Inspect {
        /// Path to dataset configuration file (YAML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Path to tokenizer.json
        #[arg(short, long)]
        tokenizer: PathBuf,

        /// Record store (JSON), overrides the config file
        #[arg(long)]
        multi_instruct: Option<PathBuf>,

        /// Image store (JSON), overrides the config file
        #[arg(long)]
        images: Option<PathBuf>,

        /// Train config (JSON), overrides the config file
        #[arg(long)]
        train_config: Option<PathBuf>,

        /// Base seed for augmentation
        #[arg(long)]
        seed: Option<u64>,

        /// Patch image side length
        #[arg(long)]
        patch_image_size: Option<u32>,

        /// Keep only these record types (repeatable)
        #[arg(long = "type", value_parser = parse_record_type)]
        types: Vec<RecordType>,

        /// Number of examples to collate
        #[arg(short = 'n', long, default_value = "3")]
        samples: usize,

        /// Epoch mixed into the augmentation seed
        #[arg(long, default_value = "0")]
        epoch: u64,

        /// Also print the rendered prompt and decoded tokens of each example
        #[arg(long)]
        show_text: bool,
    },
}

fn parse_record_type(value: &str) -> Result<RecordType, String> {
    match value.to_ascii_lowercase().as_str() {
        "caption" => Ok(RecordType::Caption),
        "qa" => Ok(RecordType::Qa),
        "positioning" => Ok(RecordType::Positioning),
        "other" => Ok(RecordType::Other),
        other => Err(format!(
            "unknown record type '{}' (expected caption, qa, positioning or other)",
            other
        )),
    }
}

struct InspectArgs {
    config: Option<PathBuf>,
    tokenizer: PathBuf,
    multi_instruct: Option<PathBuf>,
    images: Option<PathBuf>,
    train_config: Option<PathBuf>,
    seed: Option<u64>,
    patch_image_size: Option<u32>,
    types: Vec<RecordType>,
    samples: usize,
    epoch: u64,
    show_text: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect {
            config,
            tokenizer,
            multi_instruct,
            images,
            train_config,
            seed,
            patch_image_size,
            types,
            samples,
            epoch,
            show_text,
        } => run_inspect(InspectArgs {
            config,
            tokenizer,
            multi_instruct,
            images,
            train_config,
            seed,
            patch_image_size,
            types,
            samples,
            epoch,
            show_text,
        }),
    }
}

/// Merge the optional config file with command-line overrides.
fn resolve_config(args: &InspectArgs) -> anyhow::Result<DatasetConfig> {
    let mut config = match &args.config {
        Some(path) => DatasetConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DatasetConfig::default(),
    };

    if let Some(path) = &args.multi_instruct {
        config.multi_instruct_path = path.clone();
    }
    if let Some(path) = &args.images {
        config.images_path = path.clone();
    }
    if let Some(path) = &args.train_config {
        config.train_config_path = path.clone();
    }
    if args.seed.is_some() {
        config.pretrain_seed = args.seed;
    }
    if let Some(size) = args.patch_image_size {
        config.patch_image_size = size;
    }
    if !args.types.is_empty() {
        config.supported_types = Some(args.types.clone());
    }

    Ok(config)
}

fn run_inspect(args: InspectArgs) -> anyhow::Result<()> {
    if args.samples == 0 {
        anyhow::bail!("--samples must be at least 1");
    }

    let config = resolve_config(&args)?;
    let tokenizer = Tokenizer::from_file(&args.tokenizer)
        .with_context(|| format!("Failed to load tokenizer {}", args.tokenizer.display()))?;
    tracing::info!(
        bos = tokenizer.bos_token_id(),
        eos = tokenizer.eos_token_id(),
        pad = tokenizer.pad_token_id(),
        "Loaded tokenizer"
    );

    let tokenizer = Arc::new(tokenizer);
    let collator = MultimodalCollator::for_encoder(tokenizer.as_ref());
    let dataset = MultiInstructDataset::with_default_transform(&config, tokenizer.clone())?;

    println!("========================================");
    println!("  mmit dataset inspection");
    println!("========================================");
    println!("Records:     {}", config.multi_instruct_path.display());
    println!("Images:      {}", config.images_path.display());
    println!("Train keys:  {}", config.train_config_path.display());
    println!("Examples:    {}", dataset.len());
    println!("Epoch:       {}", args.epoch);
    println!("Patch size:  {}", config.patch_image_size);
    println!("========================================\n");

    if dataset.is_empty() {
        println!("Dataset is empty, nothing to inspect.");
        return Ok(());
    }

    if args.show_text {
        for index in 0..args.samples.min(dataset.len()) {
            if let Some(record_id) = dataset.record_id(index) {
                let text = dataset.assembler().render_text(record_id)?;
                println!("[{}] {}\n    {}\n", index, record_id, text);
            }
        }
    }

    let mut loader = DataLoader::new(
        dataset,
        collator,
        DataLoaderConfig {
            batch_size: args.samples,
            shuffle: false,
            seed: 0,
            drop_last: false,
        },
    )?;
    loader.reset(args.epoch);

    let batch = loader
        .next_batch()
        .context("No batch produced")?
        .context("Failed to build batch")?;
    print_batch(&batch);

    if args.show_text {
        println!();
        for (i, text) in decode_rows(&tokenizer, &batch)?.iter().enumerate() {
            println!("[{}] tokens: {}", i, text);
        }
    }

    Ok(())
}

/// Decode the unpadded ids of every batch row, keeping template markers.
fn decode_rows(tokenizer: &Tokenizer, batch: &MultimodalBatch) -> anyhow::Result<Vec<String>> {
    batch
        .src_lengths
        .iter()
        .enumerate()
        .map(|(i, &len)| {
            let ids: Vec<u32> = batch.input_ids.row(i).iter().take(len).copied().collect();
            tokenizer
                .decode_with_special_tokens(&ids)
                .with_context(|| format!("Failed to decode row {}", i))
        })
        .collect()
}

fn print_batch(batch: &MultimodalBatch) {
    tracing::info!(
        batch_size = batch.batch_size,
        seq_len = batch.seq_len,
        num_slots = batch.num_slots,
        ntokens = batch.ntokens,
        "Collated batch"
    );

    println!("input_ids:      {:?}", batch.input_ids.shape());
    println!("attention_mask: {:?}", batch.attention_mask.shape());
    println!("patch_images:   {:?}", batch.patch_images.shape());
    println!("patch_masks:    {:?}", batch.patch_masks.shape());
    println!("conf:           {:?}", batch.conf.to_vec());
    println!();

    for (i, id) in batch.ids.iter().enumerate() {
        let masks: Vec<u8> = batch.patch_masks.row(i).iter().map(|&m| m as u8).collect();
        println!(
            "{:>3}  {:<24} tokens={:<5} image_slots={:?}",
            i, id, batch.src_lengths[i], masks
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> InspectArgs {
        InspectArgs {
            config: None,
            tokenizer: PathBuf::from("tokenizer.json"),
            multi_instruct: None,
            images: None,
            train_config: None,
            seed: None,
            patch_image_size: None,
            types: Vec::new(),
            samples: 3,
            epoch: 0,
            show_text: false,
        }
    }

    #[test]
    fn test_parse_record_type() {
        assert_eq!(parse_record_type("QA").unwrap(), RecordType::Qa);
        assert_eq!(parse_record_type("positioning").unwrap(), RecordType::Positioning);
        assert!(parse_record_type("video").is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let args = InspectArgs {
            multi_instruct: Some(PathBuf::from("r.json")),
            images: Some(PathBuf::from("i.json")),
            train_config: Some(PathBuf::from("t.json")),
            seed: Some(5),
            patch_image_size: Some(64),
            types: vec![RecordType::Caption],
            ..args()
        };
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.multi_instruct_path, PathBuf::from("r.json"));
        assert_eq!(config.images_path, PathBuf::from("i.json"));
        assert_eq!(config.train_config_path, PathBuf::from("t.json"));
        assert_eq!(config.pretrain_seed, Some(5));
        assert_eq!(config.patch_image_size, 64);
        assert_eq!(config.supported_types, Some(vec![RecordType::Caption]));
    }

    #[test]
    fn test_no_overrides_keeps_defaults() {
        let config = resolve_config(&args()).unwrap();
        assert_eq!(config.patch_image_size, 224);
        assert!(config.pretrain_seed.is_none());
        assert!(config.supported_types.is_none());
    }

    #[test]
    fn test_cli_parses_inspect() {
        let cli = Cli::try_parse_from([
            "mmit", "inspect", "--tokenizer", "tok.json", "--type", "qa", "--type", "caption",
            "-n", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Inspect { types, samples, .. } => {
                assert_eq!(types, vec![RecordType::Qa, RecordType::Caption]);
                assert_eq!(samples, 2);
            }
        }
    }
}
