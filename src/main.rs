use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use samcli::output::{FileSink, OutputFormat};
use samcli::segmentation::{self, ModelConfig};
use samcli::{run_pipeline, PipelineConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Segment the object at the centre of an image", long_about = None)]
struct Args {
    /// RNG seed (negative picks one from the clock)
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    seed: i64,

    /// Number of threads to use during computation
    #[arg(short, long, default_value_t = segmentation::default_threads() as i32, allow_negative_numbers = true)]
    threads: i32,

    /// Model directory holding encoder.onnx and decoder.onnx
    #[arg(short, long, default_value = "models/sam-vit-b")]
    model: PathBuf,

    /// Input image file
    #[arg(short, long = "inp", default_value = "img.jpg")]
    input: PathBuf,

    /// Directory receiving mask_<n> and seg_<n> images
    #[arg(short, long = "out", default_value = ".")]
    output: PathBuf,

    /// Output image encoding
    #[arg(long, value_enum, default_value_t = OutputFormat::Jpg)]
    format: OutputFormat,

    /// Minimum predicted IoU for a mask to be kept
    #[arg(long, default_value_t = 0.88)]
    iou_threshold: f32,

    /// Minimum stability score for a mask to be kept
    #[arg(long, default_value_t = 0.95)]
    stability_score_threshold: f32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() {
    let args = parse_args();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args) {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

/// Parse the command line
///
/// An unknown argument prints the error and usage, then exits with status 0.
/// Existing scripts depend on that status, so it is kept as is.
fn parse_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) if e.kind() == ErrorKind::UnknownArgument => {
            eprint!("{e}");
            eprintln!("\n{}", Args::command().render_help());
            std::process::exit(0);
        }
        Err(e) => e.exit(),
    }
}

fn run(args: Args) -> Result<()> {
    tracing::info!("Input: {}", args.input.display());
    tracing::info!("Model: {}", args.model.display());

    let model_config = ModelConfig {
        n_threads: args.threads,
        seed: args.seed,
        iou_threshold: args.iou_threshold,
        stability_score_threshold: args.stability_score_threshold,
        ..ModelConfig::default()
    };

    let mut sink = FileSink::new(&args.output, args.format)
        .context("Failed to prepare output directory")?;

    let summary = run_pipeline(
        &args.input,
        || segmentation::load_model(&args.model, &model_config),
        &mut sink,
        &PipelineConfig {
            n_threads: args.threads,
        },
    )
    .with_context(|| format!("Segmentation of '{}' failed", args.input.display()))?;

    tracing::info!(
        "Wrote {} mask candidates for point ({}, {}) to {}",
        summary.candidates,
        summary.point.x,
        summary.point.y,
        args.output.display()
    );

    Ok(())
}
