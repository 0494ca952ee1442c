//! HNET datagram framing.
//!
//! Every datagram is one packet, network byte order throughout:
//!
//! ```text
//! magic       : 4 bytes  "HNET"
//! version     : u8       1
//! type        : u8       0 = META, 1 = DATA
//! transfer_id : u32
//! chunk_total : u32      B
//! chunk_index : u32      b (0 for META)
//! seg_index   : u16
//! seg_count   : u16
//! payload_len : u16
//! payload     : payload_len bytes
//! ```
//!
//! A META payload is the UTF-8 file name; a DATA payload is one segment of
//! a chunk file's bytes. `payload_len` must agree with the datagram length
//! or the packet is rejected outright.

use crate::error::PacketError;

/// Packet magic.
pub const MAGIC: [u8; 4] = *b"HNET";

/// Protocol version.
pub const VERSION: u8 = 1;

/// Fixed header length in bytes.
pub const HEADER_LEN: usize = 24;

/// IPv4 UDP payload ceiling; no datagram may exceed this.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// META announces a transfer, DATA carries one chunk segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketType {
    /// Transfer announcement carrying the file name.
    Meta,
    /// One segment of one chunk.
    Data,
}

impl PacketType {
    const fn wire(self) -> u8 {
        match self {
            Self::Meta => 0,
            Self::Data => 1,
        }
    }

    const fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Meta),
            1 => Some(Self::Data),
            _ => None,
        }
    }
}

/// Parsed HNET header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    /// META or DATA.
    pub packet_type: PacketType,
    /// Transfer this packet belongs to.
    pub transfer_id: u32,
    /// Chunk total `B` of the transfer.
    pub chunk_total: u32,
    /// Chunk index `b` (0 for META).
    pub chunk_index: u32,
    /// Segment index within the chunk.
    pub seg_index: u16,
    /// Segment count of the chunk.
    pub seg_count: u16,
    /// Declared payload length.
    pub payload_len: u16,
}

/// Serialize a packet into one datagram.
///
/// # Panics
///
/// Panics if `payload` exceeds `u16::MAX` bytes; callers fragment chunks
/// well below that.
#[must_use]
pub fn encode_packet(header: &PacketHeader, payload: &[u8]) -> Vec<u8> {
    let payload_len = u16::try_from(payload.len()).expect("segment payload fits u16");
    debug_assert_eq!(payload_len, header.payload_len);

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC);
    out.push(VERSION);
    out.push(header.packet_type.wire());
    out.extend_from_slice(&header.transfer_id.to_be_bytes());
    out.extend_from_slice(&header.chunk_total.to_be_bytes());
    out.extend_from_slice(&header.chunk_index.to_be_bytes());
    out.extend_from_slice(&header.seg_index.to_be_bytes());
    out.extend_from_slice(&header.seg_count.to_be_bytes());
    out.extend_from_slice(&payload_len.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Parse one datagram.
///
/// # Errors
///
/// Returns [`PacketError`] for short datagrams, wrong magic or version,
/// unknown type, a `payload_len` that disagrees with the datagram length,
/// or a DATA packet announcing zero segments.
pub fn parse_packet(datagram: &[u8]) -> Result<(PacketHeader, &[u8]), PacketError> {
    if datagram.len() < HEADER_LEN {
        return Err(PacketError::Short {
            len: datagram.len(),
        });
    }
    if datagram[0..4] != MAGIC {
        return Err(PacketError::BadMagic);
    }
    if datagram[4] != VERSION {
        return Err(PacketError::BadVersion(datagram[4]));
    }
    let packet_type = PacketType::from_wire(datagram[5]).ok_or(PacketError::BadType(datagram[5]))?;

    let be_u32 = |at: usize| u32::from_be_bytes([datagram[at], datagram[at + 1], datagram[at + 2], datagram[at + 3]]);
    let be_u16 = |at: usize| u16::from_be_bytes([datagram[at], datagram[at + 1]]);

    let header = PacketHeader {
        packet_type,
        transfer_id: be_u32(6),
        chunk_total: be_u32(10),
        chunk_index: be_u32(14),
        seg_index: be_u16(18),
        seg_count: be_u16(20),
        payload_len: be_u16(22),
    };

    let payload = &datagram[HEADER_LEN..];
    if usize::from(header.payload_len) != payload.len() {
        return Err(PacketError::PayloadLength {
            declared: usize::from(header.payload_len),
            actual: payload.len(),
        });
    }
    if matches!(packet_type, PacketType::Data) && header.seg_count == 0 {
        return Err(PacketError::ZeroSegments);
    }

    Ok((header, payload))
}

/// Build a META packet for a transfer.
#[must_use]
pub fn meta_packet(transfer_id: u32, chunk_total: u32, file_name: &str) -> Vec<u8> {
    let payload = file_name.as_bytes();
    let header = PacketHeader {
        packet_type: PacketType::Meta,
        transfer_id,
        chunk_total,
        chunk_index: 0,
        seg_index: 0,
        seg_count: 0,
        payload_len: u16::try_from(payload.len()).expect("file name fits u16"),
    };
    encode_packet(&header, payload)
}

/// Build a DATA packet for one chunk segment.
#[must_use]
pub fn data_packet(
    transfer_id: u32,
    chunk_total: u32,
    chunk_index: u32,
    seg_index: u16,
    seg_count: u16,
    payload: &[u8],
) -> Vec<u8> {
    let header = PacketHeader {
        packet_type: PacketType::Data,
        transfer_id,
        chunk_total,
        chunk_index,
        seg_index,
        seg_count,
        payload_len: u16::try_from(payload.len()).expect("segment payload fits u16"),
    };
    encode_packet(&header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_24_bytes_network_order() {
        let datagram = data_packet(0x0102_0304, 16, 7, 2, 5, b"abc");
        assert_eq!(datagram.len(), HEADER_LEN + 3);
        assert_eq!(&datagram[0..4], b"HNET");
        assert_eq!(datagram[4], 1);
        assert_eq!(datagram[5], 1);
        assert_eq!(&datagram[6..10], &[1, 2, 3, 4]);
        assert_eq!(&datagram[10..14], &[0, 0, 0, 16]);
        assert_eq!(&datagram[14..18], &[0, 0, 0, 7]);
        assert_eq!(&datagram[18..20], &[0, 2]);
        assert_eq!(&datagram[20..22], &[0, 5]);
        assert_eq!(&datagram[22..24], &[0, 3]);
    }

    #[test]
    fn roundtrip() {
        let datagram = data_packet(42, 8, 3, 1, 4, &[9u8; 100]);
        let (header, payload) = parse_packet(&datagram).unwrap();
        assert_eq!(header.packet_type, PacketType::Data);
        assert_eq!(header.transfer_id, 42);
        assert_eq!(header.chunk_total, 8);
        assert_eq!(header.chunk_index, 3);
        assert_eq!(header.seg_index, 1);
        assert_eq!(header.seg_count, 4);
        assert_eq!(payload, &[9u8; 100]);
    }

    #[test]
    fn meta_carries_file_name() {
        let datagram = meta_packet(7, 32, "photo.png");
        let (header, payload) = parse_packet(&datagram).unwrap();
        assert_eq!(header.packet_type, PacketType::Meta);
        assert_eq!(header.chunk_total, 32);
        assert_eq!(payload, b"photo.png");
    }

    #[test]
    fn short_datagram_rejected() {
        assert!(matches!(
            parse_packet(&[0u8; 10]),
            Err(PacketError::Short { len: 10 })
        ));
    }

    #[test]
    fn wrong_magic_rejected() {
        let mut datagram = meta_packet(1, 1, "x");
        datagram[0] = b'X';
        assert!(matches!(parse_packet(&datagram), Err(PacketError::BadMagic)));
    }

    #[test]
    fn wrong_version_rejected() {
        let mut datagram = meta_packet(1, 1, "x");
        datagram[4] = 9;
        assert!(matches!(
            parse_packet(&datagram),
            Err(PacketError::BadVersion(9))
        ));
    }

    #[test]
    fn unknown_type_rejected() {
        let mut datagram = meta_packet(1, 1, "x");
        datagram[5] = 2;
        assert!(matches!(
            parse_packet(&datagram),
            Err(PacketError::BadType(2))
        ));
    }

    #[test]
    fn payload_length_must_agree() {
        let mut datagram = data_packet(1, 1, 0, 0, 1, b"abcd");
        // Truncate the payload but leave the declared length.
        datagram.truncate(datagram.len() - 1);
        assert!(matches!(
            parse_packet(&datagram),
            Err(PacketError::PayloadLength {
                declared: 4,
                actual: 3
            })
        ));

        // And the reverse: declared shorter than present.
        let mut datagram = data_packet(1, 1, 0, 0, 1, b"abcd");
        datagram[22..24].copy_from_slice(&2u16.to_be_bytes());
        assert!(matches!(
            parse_packet(&datagram),
            Err(PacketError::PayloadLength {
                declared: 2,
                actual: 4
            })
        ));
    }

    #[test]
    fn data_with_zero_segments_rejected() {
        let header = PacketHeader {
            packet_type: PacketType::Data,
            transfer_id: 1,
            chunk_total: 1,
            chunk_index: 0,
            seg_index: 0,
            seg_count: 0,
            payload_len: 0,
        };
        let datagram = encode_packet(&header, &[]);
        assert!(matches!(
            parse_packet(&datagram),
            Err(PacketError::ZeroSegments)
        ));
    }

    #[test]
    fn empty_payload_is_legal() {
        let datagram = data_packet(1, 1, 0, 0, 1, &[]);
        let (header, payload) = parse_packet(&datagram).unwrap();
        assert_eq!(header.payload_len, 0);
        assert!(payload.is_empty());
    }
}
