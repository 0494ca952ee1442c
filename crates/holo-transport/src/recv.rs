//! Receive side.
//!
//! A single-threaded loop: block on the socket with a timeout equal to the
//! remaining idle budget (capped for shutdown responsiveness), feed every
//! datagram into per-`transfer_id` state, and advance to decoding once the
//! link stays silent for the configured idle window.
//!
//! ```text
//! Listening → Receiving(transfer_id) → idle-timed-out → Decoding → Done | Failed
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use holo_codec::Mode;

use crate::config::{DecodeMode, RxConfig};
use crate::error::NetError;
use crate::packet::{parse_packet, PacketHeader, PacketType, HEADER_LEN};
use crate::reassembly::{SegmentOutcome, TransferState};

/// What a receive session produced.
#[derive(Debug, Default)]
pub struct RxReport {
    /// Successfully reconstructed files.
    pub outputs: Vec<PathBuf>,
    /// Transfers that could not be decoded, with the reason. Their working
    /// directories are left on disk for inspection.
    pub failures: Vec<(u32, NetError)>,
}

/// Holographic datagram receiver.
pub struct Receiver {
    cfg: RxConfig,
    socket: UdpSocket,
    transfers: HashMap<u32, TransferState>,
    arrival_order: Vec<u32>,
}

impl Receiver {
    /// Bind the receive socket on `0.0.0.0:port`.
    pub fn bind(cfg: RxConfig) -> Result<Self, NetError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, cfg.port))?;
        Ok(Self {
            cfg,
            socket,
            transfers: HashMap::new(),
            arrival_order: Vec::new(),
        })
    }

    /// The bound address (useful when the port was 0).
    pub fn local_addr(&self) -> Result<SocketAddr, NetError> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive until the idle timeout expires or the shutdown flag is set,
    /// then decode every transfer that accumulated chunks.
    ///
    /// An idle timeout of zero never expires; only shutdown ends the loop.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<RxReport, NetError> {
        const POLL: Duration = Duration::from_secs(1);
        let mut buf = vec![0u8; self.cfg.max_payload.max(HEADER_LEN)];
        let mut last_packet: Option<Instant> = None;

        tracing::info!(
            port = self.local_addr()?.port(),
            idle_timeout = ?self.cfg.idle_timeout,
            decode_mode = ?self.cfg.decode_mode,
            "listening"
        );

        loop {
            if shutdown.load(Ordering::Relaxed) {
                tracing::info!("shutdown observed, leaving receive loop");
                break;
            }

            let timeout = match last_packet {
                Some(at) if !self.cfg.idle_timeout.is_zero() => {
                    let elapsed = at.elapsed();
                    if elapsed >= self.cfg.idle_timeout {
                        tracing::info!("idle timeout, advancing to decode");
                        break;
                    }
                    (self.cfg.idle_timeout - elapsed).min(POLL)
                }
                _ => POLL,
            };
            self.socket.set_read_timeout(Some(timeout))?;

            match self.socket.recv_from(&mut buf) {
                Ok((len, _peer)) => {
                    last_packet = Some(Instant::now());
                    self.ingest(&buf[..len])?;
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(self.finish())
    }

    /// Feed one datagram into the transfer state.
    ///
    /// Unparseable datagrams are dropped; only filesystem failures while
    /// persisting a completed chunk propagate.
    pub fn ingest(&mut self, datagram: &[u8]) -> Result<(), NetError> {
        let (header, payload) = match parse_packet(datagram) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(error = %e, "dropping datagram");
                return Ok(());
            }
        };

        if !self.transfers.contains_key(&header.transfer_id) {
            let dir = fresh_transfer_dir(&self.cfg.base_dir, header.transfer_id)?;
            tracing::info!(
                transfer_id = header.transfer_id,
                chunk_total = header.chunk_total,
                dir = %dir.display(),
                "new transfer"
            );
            self.transfers.insert(
                header.transfer_id,
                TransferState::new(header.transfer_id, header.chunk_total, dir),
            );
            self.arrival_order.push(header.transfer_id);
        }
        let transfer = self
            .transfers
            .get_mut(&header.transfer_id)
            .expect("transfer inserted above");

        match header.packet_type {
            PacketType::Meta => {
                if transfer.handle_meta(&header, payload) {
                    rename_for_name(&self.cfg.base_dir, transfer)?;
                }
                Ok(())
            }
            PacketType::Data => Self::store_segment(transfer, &header, payload),
        }
    }

    fn store_segment(
        transfer: &mut TransferState,
        header: &PacketHeader,
        payload: &[u8],
    ) -> Result<(), NetError> {
        match transfer.handle_data(header, payload) {
            SegmentOutcome::Completed { chunk_index, bytes } => {
                let name = holo_codec::chunk_file_name(chunk_index, transfer.chunk_total());
                let path = transfer.dir().join(&name);
                // Write-then-rename: a crash mid-write never leaves a
                // half chunk under the final name.
                let tmp = transfer.dir().join(format!("{name}.tmp"));
                fs::write(&tmp, &bytes)?;
                fs::rename(&tmp, &path)?;
                tracing::info!(
                    transfer_id = transfer.transfer_id(),
                    chunk_index,
                    complete = transfer.complete_chunks(),
                    total = transfer.chunk_total(),
                    "chunk complete"
                );
                Ok(())
            }
            SegmentOutcome::Stored | SegmentOutcome::Dropped => Ok(()),
        }
    }

    /// Decode every transfer, consuming the accumulated state.
    ///
    /// Successful transfers have their working directory deleted, leaving
    /// only the reconstructed file; failed ones keep it.
    pub fn finish(&mut self) -> RxReport {
        let mut report = RxReport::default();
        for transfer_id in std::mem::take(&mut self.arrival_order) {
            let Some(transfer) = self.transfers.remove(&transfer_id) else {
                continue;
            };
            match decode_transfer(&self.cfg, &transfer) {
                Ok(output) => {
                    if let Err(e) = fs::remove_dir_all(transfer.dir()) {
                        tracing::warn!(
                            dir = %transfer.dir().display(),
                            error = %e,
                            "could not remove transfer dir"
                        );
                    }
                    tracing::info!(transfer_id, output = %output.display(), "reconstructed");
                    report.outputs.push(output);
                }
                Err(e) => {
                    tracing::warn!(transfer_id, error = %e, "transfer failed to decode");
                    report.failures.push((transfer_id, e));
                }
            }
        }
        report
    }
}

/// Decode one transfer's directory per the configured policy.
fn decode_transfer(cfg: &RxConfig, transfer: &TransferState) -> Result<PathBuf, NetError> {
    let complete = transfer.complete_chunks();
    let total = transfer.chunk_total();
    tracing::info!(
        transfer_id = transfer.transfer_id(),
        complete,
        total,
        "decoding transfer"
    );

    if complete == 0 {
        return Err(NetError::Incomplete { complete, total });
    }
    if cfg.decode_mode == DecodeMode::Strict && complete < total {
        return Err(NetError::Incomplete { complete, total });
    }

    let output = match transfer.name() {
        Some(name) => cfg.base_dir.join(name),
        None => {
            // No META ever arrived: fall back to the directory stem with a
            // mode-appropriate extension.
            let mode = holo_codec::detect_dir_mode(transfer.dir())?;
            let stem = transfer
                .dir()
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let stem = stem
                .strip_suffix(holo_codec::HOLO_SUFFIX)
                .unwrap_or(&stem)
                .to_string();
            let ext = match mode {
                Mode::Image => "png",
                Mode::Audio => "wav",
                Mode::Binary => "bin",
            };
            cfg.base_dir.join(format!("{stem}.{ext}"))
        }
    };

    holo_codec::decode_dir_to(transfer.dir(), &output)?;
    Ok(output)
}

/// Create `base_dir/transfer_<id>.holo` from scratch.
fn fresh_transfer_dir(base_dir: &std::path::Path, transfer_id: u32) -> Result<PathBuf, NetError> {
    let dir = base_dir.join(format!("transfer_{transfer_id}{}", holo_codec::HOLO_SUFFIX));
    if dir.is_dir() {
        fs::remove_dir_all(&dir)?;
    }
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// After the first named META: move the working directory to
/// `base_dir/<name>.holo`.
fn rename_for_name(base_dir: &std::path::Path, transfer: &mut TransferState) -> Result<(), NetError> {
    let Some(name) = transfer.name() else {
        return Ok(());
    };
    let target = base_dir.join(format!("{name}{}", holo_codec::HOLO_SUFFIX));
    if &target == transfer.dir() {
        return Ok(());
    }
    if target.is_dir() {
        fs::remove_dir_all(&target)?;
    }
    fs::rename(transfer.dir(), &target)?;
    tracing::debug!(dir = %target.display(), "transfer dir renamed");
    transfer.set_dir(target);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{data_packet, meta_packet};

    use std::path::Path;

    fn test_receiver(base_dir: &Path, decode_mode: DecodeMode) -> Receiver {
        Receiver::bind(RxConfig {
            port: 0,
            base_dir: base_dir.to_path_buf(),
            idle_timeout: Duration::from_millis(200),
            decode_mode,
            ..RxConfig::default()
        })
        .unwrap()
    }

    /// Encode a deterministic blob and return (original bytes, datagrams),
    /// with every chunk fragmented at `seg` bytes.
    fn encoded_datagrams(dir: &Path, seg: usize, transfer_id: u32) -> (Vec<u8>, Vec<Vec<u8>>) {
        let input = dir.join("payload.bin");
        let original: Vec<u8> = (0..30_000usize).map(|i| (i.wrapping_mul(131) % 256) as u8).collect();
        fs::write(&input, &original).unwrap();
        let holo_dir =
            holo_codec::encode_path(&input, &holo_codec::CodecConfig::with_target_kb(2)).unwrap();
        fs::remove_file(&input).unwrap();

        let chunk_paths = holo_codec::chunk_paths(&holo_dir).unwrap();
        let total = u32::try_from(chunk_paths.len()).unwrap();
        let mut datagrams = vec![meta_packet(transfer_id, total, "payload.bin")];
        for (idx, path) in chunk_paths.iter().enumerate() {
            let bytes = fs::read(path).unwrap();
            let seg_count = u16::try_from(bytes.len().div_ceil(seg).max(1)).unwrap();
            for s in 0..seg_count {
                let start = usize::from(s) * seg;
                let end = (start + seg).min(bytes.len());
                datagrams.push(data_packet(
                    transfer_id,
                    total,
                    idx as u32,
                    s,
                    seg_count,
                    &bytes[start..end],
                ));
            }
        }
        fs::remove_dir_all(&holo_dir).unwrap();
        (original, datagrams)
    }

    #[test]
    fn out_of_order_duplicated_delivery_reconstructs() {
        let dir = tempfile::tempdir().unwrap();
        let (original, datagrams) = encoded_datagrams(dir.path(), 700, 11);

        let mut receiver = test_receiver(dir.path(), DecodeMode::Strict);
        // Deliver reversed, then everything again (replay), interleaving
        // chunks and segments arbitrarily.
        for datagram in datagrams.iter().rev() {
            receiver.ingest(datagram).unwrap();
        }
        for datagram in &datagrams {
            receiver.ingest(datagram).unwrap();
        }

        let report = receiver.finish();
        assert!(report.failures.is_empty(), "{:?}", report.failures);
        assert_eq!(report.outputs, vec![dir.path().join("payload.bin")]);
        assert_eq!(fs::read(&report.outputs[0]).unwrap(), original);
        // The working directory is gone after success.
        assert!(!dir.path().join("payload.bin.holo").exists());
    }

    #[test]
    fn strict_mode_fails_on_missing_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let (_, datagrams) = encoded_datagrams(dir.path(), 700, 12);

        let mut receiver = test_receiver(dir.path(), DecodeMode::Strict);
        // Drop every datagram belonging to chunk 0.
        for datagram in &datagrams {
            if let Ok((header, _)) = parse_packet(datagram) {
                if header.packet_type == PacketType::Data && header.chunk_index == 0 {
                    continue;
                }
            }
            receiver.ingest(datagram).unwrap();
        }

        let report = receiver.finish();
        assert!(report.outputs.is_empty());
        assert!(matches!(
            report.failures.as_slice(),
            [(12, NetError::Incomplete { .. })]
        ));
        // The directory survives for inspection.
        assert!(dir.path().join("payload.bin.holo").is_dir());
    }

    #[test]
    fn best_mode_decodes_partial_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let (original, datagrams) = encoded_datagrams(dir.path(), 700, 13);

        let mut receiver = test_receiver(dir.path(), DecodeMode::Best);
        for datagram in &datagrams {
            if let Ok((header, _)) = parse_packet(datagram) {
                if header.packet_type == PacketType::Data && header.chunk_index == 1 {
                    continue;
                }
            }
            receiver.ingest(datagram).unwrap();
        }

        let report = receiver.finish();
        assert!(report.failures.is_empty());
        let decoded = fs::read(&report.outputs[0]).unwrap();
        assert_eq!(decoded.len(), original.len());
        assert_ne!(decoded, original);
    }

    #[test]
    fn missing_meta_falls_back_to_transfer_name() {
        let dir = tempfile::tempdir().unwrap();
        let (original, datagrams) = encoded_datagrams(dir.path(), 700, 14);

        let mut receiver = test_receiver(dir.path(), DecodeMode::Best);
        for datagram in &datagrams {
            if let Ok((header, _)) = parse_packet(datagram) {
                if header.packet_type == PacketType::Meta {
                    continue;
                }
            }
            receiver.ingest(datagram).unwrap();
        }

        let report = receiver.finish();
        assert_eq!(report.outputs, vec![dir.path().join("transfer_14.bin")]);
        assert_eq!(fs::read(&report.outputs[0]).unwrap(), original);
    }

    #[test]
    fn garbage_datagrams_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut receiver = test_receiver(dir.path(), DecodeMode::Best);
        receiver.ingest(b"definitely not HNET").unwrap();
        receiver.ingest(&[]).unwrap();
        let report = receiver.finish();
        assert!(report.outputs.is_empty());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn zero_chunk_transfer_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut receiver = test_receiver(dir.path(), DecodeMode::Best);
        receiver.ingest(&meta_packet(9, 4, "ghost.bin")).unwrap();
        let report = receiver.finish();
        assert!(matches!(
            report.failures.as_slice(),
            [(9, NetError::Incomplete { complete: 0, total: 4 })]
        ));
    }
}
