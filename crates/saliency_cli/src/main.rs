//! saliency-rs CLI for inspecting classifiers and computing heatmaps.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burn::prelude::*;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use saliency_core::{ImageShape, ImageTensor};
use saliency_explain::{CamMethod, EngineConfig, HeatmapEngine, TargetClass};
use saliency_models::{ModelCheckpoint, VggNet, VggNetConfig};

/// Backend type for explanations.
type ExplainBackend = Autodiff<NdArray>;

#[derive(Parser)]
#[command(name = "saliency")]
#[command(author, version)]
#[command(about = "Grad-CAM++ heatmaps for convolutional classifiers")]
#[command(long_about = "saliency-rs: visual explanations for convolutional classifiers.

EXAMPLES:
  # List the layers a heatmap can be computed at
  saliency layers --model vgg.json

  # Write a freshly initialized checkpoint
  saliency init --model vgg.json --output vgg.mpk

  # Explain the predicted class at the last convolution
  saliency explain --model vgg.json --checkpoint vgg.mpk \\
      --input image.json --layer block5_conv3 --resize 224x224 --output heatmap.json

INPUT FORMAT:
  { \"shape\": [1, H, W, C], \"data\": [...] }   row-major NHWC, already preprocessed")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List tap points of a classifier and their output shapes
    Layers {
        /// Classifier config (JSON)
        #[arg(long, value_name = "FILE")]
        model: PathBuf,
    },
    /// Compute a heatmap for one image
    Explain {
        /// Classifier config (JSON)
        #[arg(long, value_name = "FILE")]
        model: PathBuf,

        /// Classifier weights; random weights when omitted
        #[arg(long, value_name = "FILE")]
        checkpoint: Option<PathBuf>,

        /// Preprocessed image tensor (JSON)
        #[arg(long, value_name = "FILE")]
        input: PathBuf,

        /// Layer to explain, e.g. block5_conv3
        #[arg(long, value_name = "NAME")]
        layer: String,

        /// Channel weighting method
        #[arg(long, value_enum, default_value_t = MethodArg::GradcamPlusPlus)]
        method: MethodArg,

        /// Class to explain; the predicted class when omitted
        #[arg(long, value_name = "K")]
        class: Option<usize>,

        /// Upsample the heatmap, e.g. 224x224
        #[arg(long, value_name = "HxW", value_parser = parse_resize)]
        resize: Option<(usize, usize)>,

        /// Output path; stdout when omitted
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Seed for weight initialization without a checkpoint
        #[arg(long, default_value = "42", value_name = "SEED")]
        seed: u64,
    },
    /// Write a freshly initialized checkpoint
    Init {
        /// Classifier config (JSON)
        #[arg(long, value_name = "FILE")]
        model: PathBuf,

        /// Checkpoint path
        #[arg(long, value_name = "FILE")]
        output: PathBuf,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42", value_name = "SEED")]
        seed: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MethodArg {
    /// Grad-CAM
    #[value(name = "gradcam")]
    Gradcam,
    /// Grad-CAM++
    #[value(name = "gradcam++")]
    GradcamPlusPlus,
}

impl From<MethodArg> for CamMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Gradcam => CamMethod::GradCam,
            MethodArg::GradcamPlusPlus => CamMethod::GradCamPlusPlus,
        }
    }
}

/// Image tensor as stored on disk.
#[derive(Debug, Serialize, Deserialize)]
struct TensorFile {
    shape: Vec<usize>,
    data: Vec<f32>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Layers { model } => handle_layers(&model),
        Commands::Explain {
            model,
            checkpoint,
            input,
            layer,
            method,
            class,
            resize,
            output,
            seed,
        } => handle_explain(ExplainArgs {
            model,
            checkpoint,
            input,
            layer,
            method: method.into(),
            class,
            resize,
            output,
            seed,
        }),
        Commands::Init {
            model,
            output,
            seed,
        } => handle_init(&model, &output, seed),
    }
}

struct ExplainArgs {
    model: PathBuf,
    checkpoint: Option<PathBuf>,
    input: PathBuf,
    layer: String,
    method: CamMethod,
    class: Option<usize>,
    resize: Option<(usize, usize)>,
    output: Option<PathBuf>,
    seed: u64,
}

fn handle_layers(model: &Path) -> Result<()> {
    let config = load_config(model)?;

    println!("Classifier: {}", model.display());
    println!("  Input:   {}", config.input_shape());
    println!("  Classes: {}", config.n_classes);
    println!();
    println!("{:<16} {:>6} {:>6} {:>9}", "layer", "height", "width", "channels");
    println!("─────────────────────────────────────────");
    for tap in config.tap_points() {
        println!(
            "{:<16} {:>6} {:>6} {:>9}",
            tap.name,
            tap.shape.height(),
            tap.shape.width(),
            tap.shape.channels()
        );
    }
    Ok(())
}

fn handle_explain(args: ExplainArgs) -> Result<()> {
    let config = load_config(&args.model)?;
    let device = Default::default();

    let model = match &args.checkpoint {
        Some(path) => init_model(&config, &device, args.seed)?
            .load_checkpoint(path, &device)
            .context(format!("Failed to load checkpoint '{}'", path.display()))?,
        None => {
            tracing::warn!("no checkpoint given; explaining a randomly initialized classifier");
            init_model(&config, &device, args.seed)?
        }
    };

    let input = load_input(&args.input, &device)?;

    let target = args.class.map_or(TargetClass::Predicted, TargetClass::Index);
    let engine = HeatmapEngine::new(
        EngineConfig::default()
            .with_method(args.method)
            .with_target(target),
    );

    let mut heatmap = engine
        .compute(&model, input.into_inner(), &args.layer)
        .context(format!("Failed to explain layer '{}'", args.layer))?;
    if let Some((height, width)) = args.resize {
        heatmap = heatmap.resize(height, width)?;
    }

    let json = heatmap.to_report().to_json()?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .context(format!("Failed to write heatmap to '{}'", path.display()))?;
            let (height, width) = heatmap.dim();
            println!("=== {} heatmap ===", heatmap.method().name());
            println!("  Layer: {}", heatmap.layer());
            println!("  Class: {} (score {:.4})", heatmap.class_index(), heatmap.score());
            println!("  Size:  {}x{}", height, width);
            println!("  Saved: {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn handle_init(model: &Path, output: &Path, seed: u64) -> Result<()> {
    let config = load_config(model)?;
    let device = Default::default();

    let net = init_model(&config, &device, seed)?;
    net.save_checkpoint(output)
        .context(format!("Failed to save checkpoint '{}'", output.display()))?;

    println!("Initialized classifier from {}", model.display());
    println!("  Input:   {}", config.input_shape());
    println!("  Classes: {}", config.n_classes);
    println!("  Seed:    {}", seed);
    println!("  Saved:   {}", output.display());
    Ok(())
}

fn init_model(
    config: &VggNetConfig,
    device: &<ExplainBackend as Backend>::Device,
    seed: u64,
) -> Result<VggNet<ExplainBackend>> {
    ExplainBackend::seed(seed);
    Ok(config.try_init::<ExplainBackend>(device)?)
}

/// Read a classifier config from a JSON file.
fn load_config(path: &Path) -> Result<VggNetConfig> {
    let text = std::fs::read_to_string(path)
        .context(format!("Failed to read model config '{}'", path.display()))?;
    let config: VggNetConfig = serde_json::from_str(&text)
        .context(format!("Invalid model config '{}'", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Read a preprocessed image tensor from a JSON file.
fn load_input(
    path: &Path,
    device: &<ExplainBackend as Backend>::Device,
) -> Result<ImageTensor<ExplainBackend>> {
    let text = std::fs::read_to_string(path)
        .context(format!("Failed to read input '{}'", path.display()))?;
    let file: TensorFile = serde_json::from_str(&text)
        .context(format!("Invalid input tensor '{}'", path.display()))?;
    let shape = ImageShape::from_batch_dims(&file.shape)?;
    Ok(ImageTensor::from_vec(file.data, shape, device)?)
}

/// Parse a target size in the format "HxW" (e.g., "224x224").
fn parse_resize(value: &str) -> Result<(usize, usize)> {
    let Some((height, width)) = value.split_once(['x', 'X']) else {
        bail!("expected HxW, got '{value}'");
    };
    let height: usize = height.trim().parse().context("invalid height")?;
    let width: usize = width.trim().parse().context("invalid width")?;
    if height == 0 || width == 0 {
        bail!("resize dimensions must be positive, got '{value}'");
    }
    Ok((height, width))
}
