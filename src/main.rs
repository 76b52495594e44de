//! Multi-label SSL data handling CLI
//!
//! Generates synthetic dataset stores, inspects partitions and pulls batches
//! from any sampling mode.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use multilabel_ssl::dataset::synthetic::{build_store, store_keys, SyntheticSpec};
use multilabel_ssl::utils::logging::{init_logging, LogConfig};
use multilabel_ssl::utils::{format_duration, format_number, percentage, ProgressLogger};
use multilabel_ssl::{
    BatchRequest, DataHandler, DatasetId, DirectoryStore, HandlerConfig, ImageGeometry,
    LabelMatrix, SamplingMode,
};

/// Partially supervised multi-label data handling
#[derive(Parser, Debug)]
#[command(name = "multilabel_ssl")]
#[command(version = "0.1.0")]
#[command(about = "Labeled/unlabeled partitioning, label corruption and batch streams", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a synthetic dataset store
    Synth {
        /// Root directory of the stores
        #[arg(short, long, default_value = "data")]
        output_dir: String,

        /// Dataset identity (nus_wide, ms_coco)
        #[arg(short, long, default_value = "ms_coco")]
        dataset: String,

        /// Training examples
        #[arg(long, default_value = "2000")]
        train: usize,

        /// Evaluation examples
        #[arg(long, default_value = "500")]
        val: usize,

        /// Image height and width
        #[arg(long, default_value = "32")]
        image_size: usize,

        /// Random seed
        #[arg(long, default_value = "26")]
        seed: u64,
    },

    /// Build a handler and report its partition and corruption
    Partition {
        #[command(flatten)]
        handler: HandlerArgs,

        /// Write the partition as JSON
        #[arg(short, long)]
        export: Option<String>,
    },

    /// Pull batches from a sampling mode
    Sample {
        #[command(flatten)]
        handler: HandlerArgs,

        /// Sampling mode
        #[arg(short, long, default_value = "train_labeled")]
        mode: String,

        /// Number of batches to pull
        #[arg(short = 'n', long, default_value = "20")]
        batches: usize,

        /// Apply the augmenting transform
        #[arg(long, default_value = "false")]
        augment: bool,

        /// Visit batches in order instead of shuffling them each epoch
        #[arg(long, default_value = "false")]
        no_shuffle: bool,

        /// Seed of the stream's random source
        #[arg(long, default_value = "0")]
        stream_seed: u64,
    },
}

#[derive(clap::Args, Debug)]
struct HandlerArgs {
    /// Root directory of the stores
    #[arg(long, default_value = "data")]
    data_dir: String,

    /// Handler configuration JSON (overrides the flags below)
    #[arg(short, long)]
    config: Option<String>,

    /// Dataset identity (nus_wide, ms_coco)
    #[arg(short, long, default_value = "ms_coco")]
    dataset: String,

    /// Percentage of labeled training examples
    #[arg(long, default_value = "100")]
    labeled_ratio: f64,

    /// Percentage of labeled rows to corrupt
    #[arg(long, default_value = "0")]
    corruption_ratio: f64,

    /// Batch size
    #[arg(short, long, default_value = "32")]
    batch_size: usize,

    /// Construction seed
    #[arg(long, default_value = "26")]
    seed: u64,
}

impl HandlerArgs {
    fn config(&self) -> Result<HandlerConfig> {
        if let Some(path) = &self.config {
            return HandlerConfig::load(Path::new(path))
                .with_context(|| format!("Failed to load handler config {}", path));
        }
        let dataset: DatasetId = self.dataset.parse()?;
        Ok(HandlerConfig::new(dataset)
            .with_labeled_ratio(self.labeled_ratio)
            .with_corruption_ratio(self.corruption_ratio)
            .with_batch_size(self.batch_size)
            .with_seed(self.seed))
    }

    fn open(&self) -> Result<DataHandler<DirectoryStore>> {
        let config = self.config()?;
        let root = PathBuf::from(&self.data_dir);
        if !root.exists() {
            bail!(
                "data directory {} not found, create one with `multilabel_ssl synth --output-dir {}`",
                root.display(),
                self.data_dir
            );
        }
        let store = DirectoryStore::open(&root, config.dataset)?;
        Ok(DataHandler::from_seed(config, store)?)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Synth {
            output_dir,
            dataset,
            train,
            val,
            image_size,
            seed,
        } => {
            cmd_synth(&output_dir, &dataset, train, val, image_size, seed)?;
        }

        Commands::Partition { handler, export } => {
            cmd_partition(&handler, export.as_deref())?;
        }

        Commands::Sample {
            handler,
            mode,
            batches,
            augment,
            no_shuffle,
            stream_seed,
        } => {
            cmd_sample(&handler, &mode, batches, augment, !no_shuffle, stream_seed)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 +------------------------------------------------------------+
 |   Multi-label SSL data handler                             |
 |   partition / corrupt / sample                             |
 +------------------------------------------------------------+
  "#
        .green()
    );
}

fn cmd_synth(
    output_dir: &str,
    dataset: &str,
    train: usize,
    val: usize,
    image_size: usize,
    seed: u64,
) -> Result<()> {
    let dataset: DatasetId = dataset.parse()?;
    info!("Generating synthetic {} store in {}", dataset, output_dir);

    let spec =
        SyntheticSpec::new(dataset, train, val).with_geometry(ImageGeometry::square(image_size));
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let store = build_store(&spec, &mut rng)?;

    let keys = store_keys(dataset);
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let written = DirectoryStore::export(&store, &key_refs, Path::new(output_dir), dataset)?;

    println!("{}", "Synthetic store written:".cyan().bold());
    println!("  Location:  {}", written.dir().display());
    println!("  Train:     {}", format_number(train));
    let val_name = dataset.split_name(multilabel_ssl::Split::Validation);
    println!("  {:<10} {}", format!("{}:", val_name), format_number(val));
    println!("  Classes:   {}", dataset.num_classes());
    println!("  Images:    {}x{}x3", image_size, image_size);
    Ok(())
}

fn cmd_partition(args: &HandlerArgs, export: Option<&str>) -> Result<()> {
    let handler = args.open()?;
    let stats = handler.partition_stats();
    let config = handler.config();

    println!("{}", "Partition:".cyan().bold());
    println!("  Target ratio:    {:.2}%", config.labeled_ratio);
    print!("{}", stats);
    println!(
        "  Labeled:         {}",
        format_number(stats.num_labeled).green()
    );
    println!(
        "  Unlabeled:       {}",
        format_number(stats.num_unlabeled).yellow()
    );
    println!();

    let corruption = handler.corruption();
    println!("{}", "Corruption:".cyan().bold());
    println!("  Requested:       {:.2}%", corruption.corruption_ratio);
    if corruption.is_empty() {
        println!("  Corrupted rows:  {}", "none".green());
    } else {
        println!(
            "  Corrupted rows:  {} ({:.1}% of labeled)",
            format_number(corruption.count()).red(),
            percentage(corruption.count(), stats.num_labeled)
        );
    }

    if let Some(path) = export {
        handler
            .partition()
            .save(Path::new(path))
            .with_context(|| format!("Failed to write partition to {}", path))?;
        println!();
        println!("{} Partition written to {}", "Saved:".green(), path);
    }
    Ok(())
}

fn cmd_sample(
    args: &HandlerArgs,
    mode: &str,
    batches: usize,
    augment: bool,
    shuffle_batches: bool,
    stream_seed: u64,
) -> Result<()> {
    let mode: SamplingMode = mode.parse()?;
    let handler = args.open()?;

    if mode == SamplingMode::TrainMixed {
        // no external labeler here: publish the training labels plus a unit weight column
        let labels = handler.train_labels();
        let width = labels.num_classes() + 1;
        let mut mixed = LabelMatrix::zeros(labels.num_examples(), width);
        for row in 0..labels.num_examples() {
            let out = mixed.row_mut(row);
            out[..width - 1].copy_from_slice(labels.row(row));
            out[width - 1] = 1.0;
        }
        handler.publish_mixed_labels(mixed)?;
    }

    let request = BatchRequest::new(mode)
        .with_augment(augment)
        .with_shuffle_batches(shuffle_batches);
    let mut stream = handler.stream_seeded(request, stream_seed)?;
    info!(
        "Sampling {} batches from {} ({} per epoch)",
        batches,
        mode,
        stream.batches_per_epoch()
    );

    let start = Instant::now();
    let mut progress = ProgressLogger::new(mode.name(), batches);
    let mut last_shapes = None;
    for batch in stream.by_ref().take(batches) {
        let batch = batch?;
        last_shapes = Some((batch.images_shape(), batch.labels_shape()));
        progress.increment();
    }
    progress.finish();

    println!("{}", "Sampling:".cyan().bold());
    println!("  Mode:          {}", mode.to_string().green());
    println!("  Batches:       {}", format_number(progress.current()));
    println!("  Epochs begun:  {}", stream.epochs_started());
    if let Some((images, labels)) = last_shapes {
        println!("  Images:        {:?}", images);
        println!("  Labels:        {:?}", labels);
    }
    println!("  Elapsed:       {}", format_duration(start.elapsed().as_secs_f64()));
    Ok(())
}
