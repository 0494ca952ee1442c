//! Holographic datagram transport CLI.
//!
//! - `holonet tx <file> <host>` encodes and transmits a file over UDP
//! - `holonet rx` listens, reassembles, and decodes incoming transfers

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use holo_transport::{send_file, DecodeMode, Receiver, RxConfig, TxConfig};

/// Holographic UDP transport.
#[derive(Parser)]
#[command(name = "holonet", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transmit a file holographically.
    ///
    /// The file is encoded into chunks, each chunk is fragmented into
    /// datagrams, and the whole set is replayed for --loops passes in
    /// shuffled order. Fire-and-forget: there is no acknowledgement.
    Tx {
        /// Input file (image/audio/binary).
        file: PathBuf,
        /// Destination host (IP or name).
        host: String,
        /// Destination UDP port.
        #[arg(long, default_value_t = 5000)]
        port: u16,
        /// Target holographic chunk size in KiB.
        #[arg(long = "chunk-kb", default_value_t = 32)]
        chunk_kb: u32,
        /// Number of full passes over all chunks.
        #[arg(long, default_value_t = 3)]
        loops: u32,
        /// Max UDP datagram size in bytes, header included.
        #[arg(long, default_value_t = 1400)]
        payload: usize,
        /// Delay between datagrams in seconds.
        #[arg(long, default_value_t = 0.0005)]
        delay: f64,
    },

    /// Receive and reconstruct transfers.
    ///
    /// Chunks are reassembled as they arrive; when the link stays silent
    /// for --idle-timeout the accumulated transfers are decoded.
    Rx {
        /// UDP port to listen on.
        #[arg(long, default_value_t = 5000)]
        port: u16,
        /// Directory where reconstructed files are written.
        #[arg(long = "base-dir", default_value = ".")]
        base_dir: PathBuf,
        /// Seconds of inactivity before decoding (0 = never).
        #[arg(long = "idle-timeout", default_value_t = 30.0)]
        idle_timeout: f64,
        /// Max UDP datagram size to accept, in bytes.
        #[arg(long, default_value_t = 65_507)]
        payload: usize,
        /// best = decode with whatever arrived; strict = all chunks or fail.
        #[arg(long = "decode-mode", default_value = "best")]
        decode_mode: DecodeMode,
    },
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
    // Both loops poll this flag between packets; the binaries rely on the
    // default Ctrl-C disposition, while embedders (and tests) drive it.
    let shutdown = Arc::new(AtomicBool::new(false));

    match cli.command {
        Commands::Tx {
            file,
            host,
            port,
            chunk_kb,
            loops,
            payload,
            delay,
        } => {
            let cfg = TxConfig {
                port,
                chunk_kb,
                loops,
                max_payload: payload,
                delay: Duration::from_secs_f64(delay.max(0.0)),
                seed: None,
            };
            let report = send_file(&file, &host, &cfg, &shutdown)?;
            tracing::info!(
                transfer_id = report.transfer_id,
                chunks = report.chunks,
                packets = report.packets,
                aborted = report.aborted,
                "done"
            );
            Ok(())
        }
        Commands::Rx {
            port,
            base_dir,
            idle_timeout,
            payload,
            decode_mode,
        } => {
            let cfg = RxConfig {
                port,
                base_dir,
                idle_timeout: Duration::from_secs_f64(idle_timeout.max(0.0)),
                max_payload: payload,
                decode_mode,
            };
            let mut receiver = Receiver::bind(cfg)?;
            let report = receiver.run(&shutdown)?;
            for output in &report.outputs {
                println!("{}", output.display());
            }
            if let Some((transfer_id, error)) = report.failures.first() {
                anyhow::bail!("transfer {transfer_id} failed: {error}");
            }
            Ok(())
        }
    }
}
