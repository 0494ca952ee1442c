//! Transport error types.

use thiserror::Error;

/// Datagram-level parse failures; each causes the packet to be dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Datagram shorter than the fixed header.
    #[error("short datagram: {len} bytes")]
    Short {
        /// Received datagram length.
        len: usize,
    },

    /// Datagram does not start with `HNET`.
    #[error("bad packet magic")]
    BadMagic,

    /// Protocol version this implementation does not speak.
    #[error("unsupported packet version {0}")]
    BadVersion(u8),

    /// Unknown packet type byte.
    #[error("unknown packet type {0}")]
    BadType(u8),

    /// Declared payload length disagrees with the datagram length.
    #[error("payload length {declared} disagrees with {actual} payload bytes")]
    PayloadLength {
        /// Length the header declares.
        declared: usize,
        /// Bytes actually present after the header.
        actual: usize,
    },

    /// A DATA packet with no segments cannot exist.
    #[error("zero segment count")]
    ZeroSegments,
}

/// Transfer-level failures.
#[derive(Debug, Error)]
pub enum NetError {
    /// Strict-mode decode attempted with chunks missing.
    #[error("incomplete transfer: {complete}/{total} chunks")]
    Incomplete {
        /// Chunk files completed.
        complete: u32,
        /// Chunk total announced by the transmitter.
        total: u32,
    },

    /// Configured datagram size cannot even hold the header.
    #[error("max payload {max_payload} leaves no room after the {header} byte header")]
    PayloadTooSmall {
        /// Configured datagram size.
        max_payload: usize,
        /// Fixed header length.
        header: usize,
    },

    /// A chunk file needs more segments than the 16-bit counter can carry.
    #[error("chunk of {len} bytes needs more than {max} segments")]
    ChunkTooLarge {
        /// Chunk file size.
        len: usize,
        /// Maximum representable segment count.
        max: u32,
    },

    /// Destination host/port did not resolve.
    #[error("cannot resolve {addr}")]
    BadAddress {
        /// The address string as given.
        addr: String,
    },

    /// Codec failure while encoding or decoding a transfer.
    #[error(transparent)]
    Codec(#[from] holo_codec::CodecError),

    /// Socket or filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_strings() {
        let err = NetError::Incomplete {
            complete: 3,
            total: 16,
        };
        assert_eq!(err.to_string(), "incomplete transfer: 3/16 chunks");

        let err = PacketError::PayloadLength {
            declared: 100,
            actual: 99,
        };
        assert!(err.to_string().contains("disagrees"));
    }
}
