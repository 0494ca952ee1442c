//! Datagram transport for holographic chunk directories.
//!
//! Lifts chunk files onto an unreliable datagram channel without ever
//! inspecting their internal structure: the transmitter fragments each
//! chunk into `HNET` DATA packets and replays the whole set for a number
//! of loops in freshly shuffled order; the receiver reassembles segments
//! per chunk, writes completed chunk files, and hands the directory to the
//! codec once the link goes idle.
//!
//! There is no acknowledgement, retransmission request, or forward error
//! correction here — redundancy comes from the codec's self-similar chunks
//! and the transmitter's replay loops. Chunks and segments may arrive in
//! any order, duplicated or interleaved across chunks; reception is
//! idempotent.

#![forbid(unsafe_code)]

mod config;
mod error;
pub mod packet;
mod reassembly;
mod recv;
mod send;

pub use config::{DecodeMode, RxConfig, TxConfig};
pub use error::{NetError, PacketError};
pub use packet::{PacketHeader, PacketType, HEADER_LEN, MAX_UDP_PAYLOAD};
pub use reassembly::{ChunkAssembly, SegmentOutcome, TransferState};
pub use recv::{Receiver, RxReport};
pub use send::{send_file, TxReport};
