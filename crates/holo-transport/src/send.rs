//! Transmit side.
//!
//! Encodes the file into a temporary chunk directory, announces the
//! transfer with a META packet, then blasts every chunk as fragmented DATA
//! packets for a configured number of passes, reshuffling the chunk order
//! each pass. The transmitter never reads the network and has no knowledge
//! of success; the temporary directory is removed on every exit path.

use std::fs;
use std::net::{ToSocketAddrs, UdpSocket};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::OnceLock;
use std::thread;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use holo_codec::CodecConfig;

use crate::config::TxConfig;
use crate::error::NetError;
use crate::packet::{data_packet, meta_packet, HEADER_LEN, MAX_UDP_PAYLOAD};

/// What a completed (or aborted) transmission did.
#[derive(Clone, Copy, Debug)]
pub struct TxReport {
    /// Transfer identifier announced on the wire.
    pub transfer_id: u32,
    /// Chunk files the codec produced.
    pub chunks: u32,
    /// Datagrams handed to the socket (META included).
    pub packets: u64,
    /// True when the shutdown flag interrupted the passes.
    pub aborted: bool,
}

/// Transmit one file holographically to `host:cfg.port`.
///
/// The shutdown flag is observed between packets; no packet is ever sent
/// half-built because fragmentation happens in memory first.
///
/// # Errors
///
/// Codec failures, socket failures, an unresolvable host, a `max_payload`
/// that cannot hold the header, or a chunk too large for the 16-bit
/// segment counter.
pub fn send_file(
    path: &Path,
    host: &str,
    cfg: &TxConfig,
    shutdown: &AtomicBool,
) -> Result<TxReport, NetError> {
    let seg_capacity = cfg
        .max_payload
        .min(MAX_UDP_PAYLOAD)
        .checked_sub(HEADER_LEN)
        .filter(|&c| c > 0)
        .ok_or(NetError::PayloadTooSmall {
            max_payload: cfg.max_payload,
            header: HEADER_LEN,
        })?;

    let addr = (host, cfg.port)
        .to_socket_addrs()
        .map_err(|_| NetError::BadAddress {
            addr: format!("{host}:{}", cfg.port),
        })?
        .next()
        .ok_or_else(|| NetError::BadAddress {
            addr: format!("{host}:{}", cfg.port),
        })?;

    let codec_cfg = CodecConfig::with_target_kb(cfg.chunk_kb);
    let holo_dir = holo_codec::encode_path(path, &codec_cfg)?;
    let _guard = DirGuard(holo_dir.clone());

    let chunk_paths = holo_codec::chunk_paths(&holo_dir)?;
    let chunk_total = u32::try_from(chunk_paths.len()).expect("chunk count fits u32");
    if chunk_total == 0 {
        return Err(holo_codec::CodecError::NoChunks { dir: holo_dir }.into());
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let transfer_id = next_transfer_id();
    let meta = meta_packet(transfer_id, chunk_total, &file_name);

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    let mut rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    tracing::info!(
        file = %file_name,
        %addr,
        transfer_id,
        chunk_total,
        loops = cfg.loops,
        chunk_kb = cfg.chunk_kb,
        "transmitting"
    );

    let mut report = TxReport {
        transfer_id,
        chunks: chunk_total,
        packets: 0,
        aborted: false,
    };

    let mut order: Vec<usize> = (0..chunk_paths.len()).collect();
    for pass in 1..=cfg.loops {
        socket.send_to(&meta, addr)?;
        report.packets += 1;

        order.shuffle(&mut rng);
        for &idx in &order {
            let bytes = fs::read(&chunk_paths[idx])?;
            let seg_count = segment_count(bytes.len(), seg_capacity)?;
            #[allow(clippy::cast_possible_truncation)]
            let chunk_index = idx as u32;

            for seg in 0..seg_count {
                if shutdown.load(Ordering::Relaxed) {
                    tracing::info!(transfer_id, "shutdown observed, aborting transmission");
                    report.aborted = true;
                    return Ok(report);
                }
                let start = usize::from(seg) * seg_capacity;
                let end = (start + seg_capacity).min(bytes.len());
                let datagram = data_packet(
                    transfer_id,
                    chunk_total,
                    chunk_index,
                    seg,
                    seg_count,
                    &bytes[start..end],
                );
                socket.send_to(&datagram, addr)?;
                report.packets += 1;
                if !cfg.delay.is_zero() {
                    thread::sleep(cfg.delay);
                }
            }
        }
        tracing::debug!(transfer_id, pass, loops = cfg.loops, "pass complete");
    }

    tracing::info!(transfer_id, packets = report.packets, "transmission finished");
    Ok(report)
}

/// Number of equal-sized segments a chunk file fragments into.
fn segment_count(len: usize, seg_capacity: usize) -> Result<u16, NetError> {
    let count = len.div_ceil(seg_capacity).max(1);
    u16::try_from(count).map_err(|_| NetError::ChunkTooLarge {
        len,
        max: u32::from(u16::MAX),
    })
}

/// Host-local, monotonically increasing transfer ids, started at a random
/// point so concurrent receivers can tell sender processes apart.
fn next_transfer_id() -> u32 {
    static NEXT: OnceLock<AtomicU32> = OnceLock::new();
    NEXT.get_or_init(|| AtomicU32::new(rand::random::<u32>() | 1))
        .fetch_add(1, Ordering::Relaxed)
}

/// Removes the temporary chunk directory on every exit path.
struct DirGuard(PathBuf);

impl Drop for DirGuard {
    fn drop(&mut self) {
        if self.0.is_dir() {
            if let Err(e) = fs::remove_dir_all(&self.0) {
                tracing::warn!(dir = %self.0.display(), error = %e, "could not remove temp dir");
            } else {
                tracing::debug!(dir = %self.0.display(), "removed temp dir");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_counts() {
        assert_eq!(segment_count(0, 1000).unwrap(), 1);
        assert_eq!(segment_count(1, 1000).unwrap(), 1);
        assert_eq!(segment_count(1000, 1000).unwrap(), 1);
        assert_eq!(segment_count(1001, 1000).unwrap(), 2);
        assert!(segment_count(70_000_000, 1000).is_err());
    }

    #[test]
    fn transfer_ids_increase() {
        let a = next_transfer_id();
        let b = next_transfer_id();
        assert_eq!(b, a.wrapping_add(1));
    }

    #[test]
    fn tiny_payload_budget_is_rejected() {
        let cfg = TxConfig {
            max_payload: HEADER_LEN,
            ..TxConfig::default()
        };
        let shutdown = AtomicBool::new(false);
        let err = send_file(Path::new("nonexistent"), "127.0.0.1", &cfg, &shutdown).unwrap_err();
        assert!(matches!(err, NetError::PayloadTooSmall { .. }));
    }

    #[test]
    fn guard_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let victim = dir.path().join("x.holo");
        fs::create_dir(&victim).unwrap();
        fs::write(victim.join("chunk_0000.holo"), b"x").unwrap();
        drop(DirGuard(victim.clone()));
        assert!(!victim.exists());
    }
}
