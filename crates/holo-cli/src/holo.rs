//! Holographic codec CLI.
//!
//! - `holo <file> [chunk_kb]` encodes `<file>` into `<file>.holo/`
//! - `holo <dir>.holo [chunk_kb]` decodes the directory back into `<dir>`
//! - `holo --stack <chunk_kb> <frame>…` averages frames into
//!   `<first>_stack.png`, then encodes the stacked image

#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;

use holo_codec::CodecConfig;

/// Holographic media codec: encode files into self-similar chunk
/// directories, decode any subset of chunks back.
#[derive(Parser)]
#[command(name = "holo", version, about, long_about = None)]
struct Cli {
    /// Average the given frames pixel-wise into <first>_stack.png, then
    /// encode the stacked image with this target chunk size in KiB.
    #[arg(long, value_name = "CHUNK_KB")]
    stack: Option<u32>,

    /// A file to encode or a .holo directory to decode; with --stack, the
    /// frame images to average. Encode optionally takes the target chunk
    /// size in KiB as a second argument.
    #[arg(required = true, value_name = "PATH")]
    args: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Some(chunk_kb) = cli.stack {
        return run_stack(chunk_kb, &cli.args);
    }

    let target = PathBuf::from(&cli.args[0]);
    let chunk_kb = match cli.args.get(1) {
        Some(raw) => Some(
            raw.parse::<u32>()
                .with_context(|| format!("invalid chunk size '{raw}', expected KiB"))?,
        ),
        None => None,
    };
    if cli.args.len() > 2 {
        bail!("unexpected extra arguments: {:?}", &cli.args[2..]);
    }

    if target.is_file() {
        let cfg = CodecConfig {
            target_chunk_kb: chunk_kb,
            ..CodecConfig::default()
        };
        let out_dir = holo_codec::encode_path(&target, &cfg)?;
        println!("{}", out_dir.display());
    } else if target.is_dir() {
        let out = holo_codec::decode_dir(&target)?;
        println!("{}", out.display());
    } else {
        bail!("path not found: {}", target.display());
    }
    Ok(())
}

fn run_stack(chunk_kb: u32, frames: &[String]) -> anyhow::Result<()> {
    let stacked = holo_codec::stack::stack_images_average(frames)?;

    let first = Path::new(&frames[0]);
    let stem = first
        .file_stem()
        .context("first frame path has no file name")?
        .to_string_lossy();
    let stacked_path = first.with_file_name(format!("{stem}_stack.png"));
    holo_codec::image_pipeline::save_rgb(&stacked, &stacked_path)?;
    tracing::info!(path = %stacked_path.display(), "wrote stacked frame");

    let out_dir = holo_codec::encode_path(&stacked_path, &CodecConfig::with_target_kb(chunk_kb))?;
    println!("{}", out_dir.display());
    Ok(())
}
