//! Segment and transfer reassembly state.
//!
//! Pure state machines, socket-free: the receive loop feeds parsed packets
//! in and is told when a chunk file is ready to be written. Duplicates are
//! idempotent, conflicting metadata is dropped, order never matters.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::packet::PacketHeader;

/// Outcome of feeding one DATA packet into a transfer.
#[derive(Debug, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// Stored; the chunk still has missing segments.
    Stored,
    /// This segment completed its chunk; the bytes are ready to persist.
    Completed {
        /// Chunk index `b`.
        chunk_index: u32,
        /// The reassembled chunk file bytes.
        bytes: Vec<u8>,
    },
    /// Dropped: duplicate, conflicting, or out-of-range.
    Dropped,
}

/// Reassembly buffer for one chunk: `seg_count` slots filled in any order.
#[derive(Debug)]
pub struct ChunkAssembly {
    slots: Vec<Option<Vec<u8>>>,
    filled: u16,
}

impl ChunkAssembly {
    /// Allocate a buffer expecting `seg_count` segments.
    #[must_use]
    pub fn new(seg_count: u16) -> Self {
        Self {
            slots: (0..seg_count).map(|_| None).collect(),
            filled: 0,
        }
    }

    /// The segment count this buffer was allocated for.
    #[must_use]
    pub fn seg_count(&self) -> u16 {
        u16::try_from(self.slots.len()).expect("constructed from u16")
    }

    /// All slots present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        usize::from(self.filled) == self.slots.len()
    }

    /// Store a segment. Returns true when this segment completed the chunk.
    ///
    /// Duplicate segments are idempotent: matching bytes are a no-op, a
    /// mismatch is logged and the existing slot kept.
    pub fn insert(&mut self, seg_index: u16, payload: &[u8]) -> bool {
        let Some(slot) = self.slots.get_mut(usize::from(seg_index)) else {
            tracing::warn!(seg_index, seg_count = self.slots.len(), "segment index out of range");
            return false;
        };
        match slot {
            Some(existing) => {
                if existing.as_slice() != payload {
                    tracing::warn!(seg_index, "duplicate segment with different bytes, keeping first");
                }
                false
            }
            None => {
                *slot = Some(payload.to_vec());
                self.filled += 1;
                self.is_complete()
            }
        }
    }

    /// Concatenate all segments. `None` while any slot is missing.
    #[must_use]
    pub fn assemble(&self) -> Option<Vec<u8>> {
        if !self.is_complete() {
            return None;
        }
        let total: usize = self.slots.iter().flatten().map(Vec::len).sum();
        let mut out = Vec::with_capacity(total);
        for slot in self.slots.iter().flatten() {
            out.extend_from_slice(slot);
        }
        Some(out)
    }
}

enum ChunkSlot {
    Assembling(ChunkAssembly),
    Done,
}

/// Per-`transfer_id` receive state.
///
/// Owns the transfer's working directory path and the reassembly buffers;
/// the caller persists completed chunks and decides when to decode.
pub struct TransferState {
    transfer_id: u32,
    chunk_total: u32,
    name: Option<String>,
    dir: PathBuf,
    chunks: HashMap<u32, ChunkSlot>,
}

impl TransferState {
    /// Start tracking a transfer rooted at `dir`.
    #[must_use]
    pub fn new(transfer_id: u32, chunk_total: u32, dir: PathBuf) -> Self {
        Self {
            transfer_id,
            chunk_total,
            name: None,
            dir,
            chunks: HashMap::new(),
        }
    }

    /// The transfer this state tracks.
    #[must_use]
    pub fn transfer_id(&self) -> u32 {
        self.transfer_id
    }

    /// Chunk total `B` announced by the transmitter.
    #[must_use]
    pub fn chunk_total(&self) -> u32 {
        self.chunk_total
    }

    /// File name from the last META packet, if any arrived.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Current working directory of this transfer.
    #[must_use]
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Move the working directory (after a META-driven rename).
    pub fn set_dir(&mut self, dir: PathBuf) {
        self.dir = dir;
    }

    /// Number of chunks fully reassembled and handed out.
    #[must_use]
    pub fn complete_chunks(&self) -> u32 {
        u32::try_from(
            self.chunks
                .values()
                .filter(|slot| matches!(slot, ChunkSlot::Done))
                .count(),
        )
        .expect("chunk count fits u32")
    }

    /// Record a META packet. Returns true when it carried a new name.
    pub fn handle_meta(&mut self, header: &PacketHeader, payload: &[u8]) -> bool {
        if header.chunk_total != 0 {
            self.chunk_total = header.chunk_total;
        }
        let name = String::from_utf8_lossy(payload).trim().to_string();
        if name.is_empty() {
            return false;
        }
        // Only the bare file name; a hostile META must not traverse paths.
        let base = name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .to_string();
        if base.is_empty() || base == "." || base == ".." {
            tracing::warn!(name, "ignoring META with unusable file name");
            return false;
        }
        if self.name.as_deref() == Some(base.as_str()) {
            return false;
        }
        tracing::info!(transfer_id = self.transfer_id, name = %base, "transfer named");
        self.name = Some(base);
        true
    }

    /// Feed one DATA packet.
    pub fn handle_data(&mut self, header: &PacketHeader, payload: &[u8]) -> SegmentOutcome {
        if self.chunk_total == 0 && header.chunk_total != 0 {
            self.chunk_total = header.chunk_total;
        }
        if header.chunk_total != self.chunk_total {
            tracing::warn!(
                transfer_id = self.transfer_id,
                declared = header.chunk_total,
                established = self.chunk_total,
                "chunk total disagrees with established transfer, dropping"
            );
            return SegmentOutcome::Dropped;
        }
        if header.chunk_index >= self.chunk_total {
            tracing::warn!(
                chunk_index = header.chunk_index,
                chunk_total = self.chunk_total,
                "chunk index out of range, dropping"
            );
            return SegmentOutcome::Dropped;
        }

        let slot = self
            .chunks
            .entry(header.chunk_index)
            .or_insert_with(|| ChunkSlot::Assembling(ChunkAssembly::new(header.seg_count)));

        match slot {
            // A chunk already completed is discarded silently.
            ChunkSlot::Done => SegmentOutcome::Dropped,
            ChunkSlot::Assembling(assembly) => {
                if assembly.seg_count() != header.seg_count {
                    tracing::warn!(
                        chunk_index = header.chunk_index,
                        declared = header.seg_count,
                        established = assembly.seg_count(),
                        "segment count disagrees with established chunk, dropping"
                    );
                    return SegmentOutcome::Dropped;
                }
                if assembly.insert(header.seg_index, payload) {
                    let bytes = assembly.assemble().expect("assembly just completed");
                    *slot = ChunkSlot::Done;
                    SegmentOutcome::Completed {
                        chunk_index: header.chunk_index,
                        bytes,
                    }
                } else {
                    SegmentOutcome::Stored
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PacketHeader, PacketType};

    fn data_header(chunk_index: u32, seg_index: u16, seg_count: u16) -> PacketHeader {
        PacketHeader {
            packet_type: PacketType::Data,
            transfer_id: 1,
            chunk_total: 4,
            chunk_index,
            seg_index,
            seg_count,
            payload_len: 0,
        }
    }

    #[test]
    fn segments_complete_in_any_order() {
        let mut transfer = TransferState::new(1, 4, PathBuf::from("t"));
        assert_eq!(
            transfer.handle_data(&data_header(0, 2, 3), b"CC"),
            SegmentOutcome::Stored
        );
        assert_eq!(
            transfer.handle_data(&data_header(0, 0, 3), b"AA"),
            SegmentOutcome::Stored
        );
        let outcome = transfer.handle_data(&data_header(0, 1, 3), b"BB");
        assert_eq!(
            outcome,
            SegmentOutcome::Completed {
                chunk_index: 0,
                bytes: b"AABBCC".to_vec()
            }
        );
        assert_eq!(transfer.complete_chunks(), 1);
    }

    #[test]
    fn duplicates_are_idempotent() {
        let mut transfer = TransferState::new(1, 4, PathBuf::from("t"));
        assert_eq!(
            transfer.handle_data(&data_header(1, 0, 2), b"xx"),
            SegmentOutcome::Stored
        );
        // Same segment again: no-op.
        assert_eq!(
            transfer.handle_data(&data_header(1, 0, 2), b"xx"),
            SegmentOutcome::Stored
        );
        // Same segment, different bytes: kept as first written.
        assert_eq!(
            transfer.handle_data(&data_header(1, 0, 2), b"yy"),
            SegmentOutcome::Stored
        );
        let outcome = transfer.handle_data(&data_header(1, 1, 2), b"zz");
        assert_eq!(
            outcome,
            SegmentOutcome::Completed {
                chunk_index: 1,
                bytes: b"xxzz".to_vec()
            }
        );
    }

    #[test]
    fn completed_chunks_discard_replays() {
        let mut transfer = TransferState::new(1, 4, PathBuf::from("t"));
        assert!(matches!(
            transfer.handle_data(&data_header(2, 0, 1), b"whole"),
            SegmentOutcome::Completed { .. }
        ));
        // Replay of the same chunk after completion: silent discard.
        assert_eq!(
            transfer.handle_data(&data_header(2, 0, 1), b"whole"),
            SegmentOutcome::Dropped
        );
        assert_eq!(transfer.complete_chunks(), 1);
    }

    #[test]
    fn conflicting_seg_count_is_dropped() {
        let mut transfer = TransferState::new(1, 4, PathBuf::from("t"));
        transfer.handle_data(&data_header(0, 0, 3), b"a");
        assert_eq!(
            transfer.handle_data(&data_header(0, 1, 5), b"b"),
            SegmentOutcome::Dropped
        );
    }

    #[test]
    fn conflicting_chunk_total_is_dropped() {
        let mut transfer = TransferState::new(1, 4, PathBuf::from("t"));
        let mut header = data_header(0, 0, 2);
        header.chunk_total = 9;
        assert_eq!(transfer.handle_data(&header, b"a"), SegmentOutcome::Dropped);
    }

    #[test]
    fn chunk_index_beyond_total_is_dropped() {
        let mut transfer = TransferState::new(1, 4, PathBuf::from("t"));
        assert_eq!(
            transfer.handle_data(&data_header(4, 0, 1), b"a"),
            SegmentOutcome::Dropped
        );
    }

    #[test]
    fn segments_interleaved_across_chunks() {
        let mut transfer = TransferState::new(1, 2, PathBuf::from("t"));
        let mut done = Vec::new();
        for (chunk, seg, bytes) in [
            (0u32, 0u16, b"A0".as_slice()),
            (1, 1, b"B1"),
            (0, 1, b"A1"),
            (1, 0, b"B0"),
        ] {
            if let SegmentOutcome::Completed { chunk_index, bytes } =
                transfer.handle_data(&data_header(chunk, seg, 2), bytes)
            {
                done.push((chunk_index, bytes));
            }
        }
        done.sort();
        assert_eq!(
            done,
            vec![(0, b"A0A1".to_vec()), (1, b"B0B1".to_vec())]
        );
    }

    #[test]
    fn meta_sets_name_once_and_sanitizes() {
        let mut transfer = TransferState::new(7, 0, PathBuf::from("t"));
        let header = PacketHeader {
            packet_type: PacketType::Meta,
            transfer_id: 7,
            chunk_total: 16,
            chunk_index: 0,
            seg_index: 0,
            seg_count: 0,
            payload_len: 0,
        };
        assert!(transfer.handle_meta(&header, b"../../etc/passwd"));
        assert_eq!(transfer.name(), Some("passwd"));
        assert_eq!(transfer.chunk_total(), 16);
        // Re-announcement with the same name is not "new".
        assert!(!transfer.handle_meta(&header, b"passwd"));
    }
}
