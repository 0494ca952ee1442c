//! Chunk container format.
//!
//! One chunk is one self-contained binary file with a fixed-order layout
//! (big-endian integers, no TLV indirection):
//!
//! ```text
//! magic        : 4 bytes   "HIMG" | "HAUD" | "HBIN"
//! version      : u16       currently 2 for all modes
//! header_len   : u32       length of the mode-specific header
//! mode_header  : header_len bytes
//! coarse_len   : u32
//! coarse       : coarse_len bytes
//! slice_len    : u32
//! slice        : slice_len bytes
//! block_index  : u32       b
//! block_count  : u32       B
//! n_total      : u64       N
//! ```
//!
//! The magic doubles as the wire tag for mode dispatch; a decoder that sees
//! an unknown magic or a version above [`CHUNK_VERSION`] rejects the chunk.

use thiserror::Error;

/// Current container version, shared by all three modes.
pub const CHUNK_VERSION: u16 = 2;

const MAGIC_IMAGE: [u8; 4] = *b"HIMG";
const MAGIC_AUDIO: [u8; 4] = *b"HAUD";
const MAGIC_BINARY: [u8; 4] = *b"HBIN";

/// Container-level parse failures.
///
/// During a directory scan each of these causes the offending chunk to be
/// skipped; they are fatal only when no chunk survives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    /// File does not begin with a known chunk magic.
    #[error("unknown chunk magic {0:02x?}")]
    BadMagic([u8; 4]),

    /// Version above what this implementation supports.
    #[error("unsupported {mode:?} chunk version {version} (max {CHUNK_VERSION})")]
    BadVersion {
        /// Mode identified by the magic.
        mode: Mode,
        /// Declared version.
        version: u16,
    },

    /// Container ends before a declared section.
    #[error("truncated chunk: {section} needs {needed} bytes, {available} left")]
    Truncated {
        /// The section being read.
        section: &'static str,
        /// Bytes the section declares.
        needed: usize,
        /// Bytes remaining in the file.
        available: usize,
    },

    /// Mode header length disagrees with the mode's fixed layout.
    #[error("{mode:?} header is {found} bytes, expected {expected}")]
    HeaderLength {
        /// Mode identified by the magic.
        mode: Mode,
        /// Length the layout requires.
        expected: u32,
        /// Length the chunk declares.
        found: u32,
    },
}

/// The closed set of codec modes; the chunk magic is the wire tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// RGB raster, coarse = PNG thumbnail.
    Image,
    /// PCM waveform, coarse = downsampled track.
    Audio,
    /// Opaque bytes, coarse = leading prefix.
    Binary,
}

impl Mode {
    /// The 4-byte magic identifying this mode on disk.
    #[must_use]
    pub const fn magic(self) -> [u8; 4] {
        match self {
            Self::Image => MAGIC_IMAGE,
            Self::Audio => MAGIC_AUDIO,
            Self::Binary => MAGIC_BINARY,
        }
    }

    /// Map a magic back to its mode.
    #[must_use]
    pub const fn from_magic(magic: [u8; 4]) -> Option<Self> {
        match magic {
            MAGIC_IMAGE => Some(Self::Image),
            MAGIC_AUDIO => Some(Self::Audio),
            MAGIC_BINARY => Some(Self::Binary),
            _ => None,
        }
    }
}

/// Mode-specific chunk header.
///
/// Every field a decoder needs to size its buffers is here; a decoder never
/// guesses dimensions from payload contents.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModeHeader {
    /// `HIMG` v2 header.
    Image {
        /// Raster width in pixels.
        width: u32,
        /// Raster height in pixels.
        height: u32,
        /// Sample channels, always 3 (RGB).
        channels: u8,
        /// Bounding side of the stored thumbnail.
        thumb_side: u16,
    },
    /// `HAUD` v2 header.
    Audio {
        /// Frame count of the full waveform.
        frames: u32,
        /// Interleaved channels per frame.
        channels: u16,
        /// Sample rate in Hz.
        sample_rate: u32,
        /// Frame count of the coarse track.
        coarse_frames: u32,
    },
    /// `HBIN` v2 header.
    Binary {
        /// Total input length in bytes.
        total_len: u64,
        /// Length of the coarse prefix.
        coarse_len: u32,
    },
}

impl ModeHeader {
    /// The mode this header belongs to.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        match self {
            Self::Image { .. } => Mode::Image,
            Self::Audio { .. } => Mode::Audio,
            Self::Binary { .. } => Mode::Binary,
        }
    }

    const fn encoded_len(mode: Mode) -> u32 {
        match mode {
            Mode::Image => 4 + 4 + 1 + 2,
            Mode::Audio => 4 + 2 + 4 + 4,
            Mode::Binary => 8 + 4,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        match *self {
            Self::Image {
                width,
                height,
                channels,
                thumb_side,
            } => {
                out.extend_from_slice(&width.to_be_bytes());
                out.extend_from_slice(&height.to_be_bytes());
                out.push(channels);
                out.extend_from_slice(&thumb_side.to_be_bytes());
            }
            Self::Audio {
                frames,
                channels,
                sample_rate,
                coarse_frames,
            } => {
                out.extend_from_slice(&frames.to_be_bytes());
                out.extend_from_slice(&channels.to_be_bytes());
                out.extend_from_slice(&sample_rate.to_be_bytes());
                out.extend_from_slice(&coarse_frames.to_be_bytes());
            }
            Self::Binary {
                total_len,
                coarse_len,
            } => {
                out.extend_from_slice(&total_len.to_be_bytes());
                out.extend_from_slice(&coarse_len.to_be_bytes());
            }
        }
    }

    fn parse(mode: Mode, reader: &mut Reader<'_>) -> Result<Self, ContainerError> {
        Ok(match mode {
            Mode::Image => Self::Image {
                width: reader.u32("image width")?,
                height: reader.u32("image height")?,
                channels: reader.u8("image channels")?,
                thumb_side: reader.u16("thumbnail side")?,
            },
            Mode::Audio => Self::Audio {
                frames: reader.u32("audio frames")?,
                channels: reader.u16("audio channels")?,
                sample_rate: reader.u32("sample rate")?,
                coarse_frames: reader.u32("coarse frames")?,
            },
            Mode::Binary => Self::Binary {
                total_len: reader.u64("total length")?,
                coarse_len: reader.u32("coarse length")?,
            },
        })
    }
}

/// One self-contained chunk: full coarse payload plus one residual slice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Mode-specific header.
    pub header: ModeHeader,
    /// Coarse payload, byte-identical across all chunks of one object.
    pub coarse: Vec<u8>,
    /// Deflated residual slice for this block.
    pub slice: Vec<u8>,
    /// Block index `b`.
    pub block_index: u32,
    /// Block count `B`.
    pub block_count: u32,
    /// Flat residual length `N`.
    pub n_total: u64,
}

impl Chunk {
    /// The mode carried by this chunk's header.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.header.mode()
    }

    /// The tuple every chunk of one object must agree on.
    ///
    /// Chunks with differing identities in one directory are dropped in
    /// favor of the majority-consistent set.
    #[must_use]
    pub fn identity(&self) -> (ModeHeader, u32, u64) {
        (self.header.clone(), self.block_count, self.n_total)
    }

    /// Serialize into the on-disk container layout.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mode = self.mode();
        let header_len = ModeHeader::encoded_len(mode);
        let mut out = Vec::with_capacity(
            4 + 2 + 4 + header_len as usize + 4 + self.coarse.len() + 4 + self.slice.len() + 16,
        );
        out.extend_from_slice(&mode.magic());
        out.extend_from_slice(&CHUNK_VERSION.to_be_bytes());
        out.extend_from_slice(&header_len.to_be_bytes());
        self.header.write(&mut out);
        out.extend_from_slice(&u32_len(&self.coarse).to_be_bytes());
        out.extend_from_slice(&self.coarse);
        out.extend_from_slice(&u32_len(&self.slice).to_be_bytes());
        out.extend_from_slice(&self.slice);
        out.extend_from_slice(&self.block_index.to_be_bytes());
        out.extend_from_slice(&self.block_count.to_be_bytes());
        out.extend_from_slice(&self.n_total.to_be_bytes());
        out
    }

    /// Parse a chunk from its on-disk bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError`] for unknown magic, unsupported version, a
    /// mode header of the wrong length, or a container that ends before a
    /// declared section.
    pub fn parse(bytes: &[u8]) -> Result<Self, ContainerError> {
        let mut reader = Reader::new(bytes);

        let magic: [u8; 4] = reader
            .take(4, "magic")?
            .try_into()
            .expect("take(4) yields 4 bytes");
        let mode = Mode::from_magic(magic).ok_or(ContainerError::BadMagic(magic))?;

        let version = reader.u16("version")?;
        if version > CHUNK_VERSION {
            return Err(ContainerError::BadVersion { mode, version });
        }

        let header_len = reader.u32("header length")?;
        let expected = ModeHeader::encoded_len(mode);
        if header_len != expected {
            return Err(ContainerError::HeaderLength {
                mode,
                expected,
                found: header_len,
            });
        }
        let header = ModeHeader::parse(mode, &mut reader)?;

        let coarse_len = reader.u32("coarse length")? as usize;
        let coarse = reader.take(coarse_len, "coarse payload")?.to_vec();

        let slice_len = reader.u32("slice length")? as usize;
        let slice = reader.take(slice_len, "residual slice")?.to_vec();

        let block_index = reader.u32("block index")?;
        let block_count = reader.u32("block count")?;
        let n_total = reader.u64("residual length")?;

        Ok(Self {
            header,
            coarse,
            slice,
            block_index,
            block_count,
            n_total,
        })
    }
}

#[allow(clippy::cast_possible_truncation)]
fn u32_len(bytes: &[u8]) -> u32 {
    bytes.len() as u32
}

/// Sequential big-endian reader over a chunk file.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize, section: &'static str) -> Result<&'a [u8], ContainerError> {
        let available = self.buf.len() - self.pos;
        if len > available {
            return Err(ContainerError::Truncated {
                section,
                needed: len,
                available,
            });
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn u8(&mut self, section: &'static str) -> Result<u8, ContainerError> {
        Ok(self.take(1, section)?[0])
    }

    fn u16(&mut self, section: &'static str) -> Result<u16, ContainerError> {
        let b = self.take(2, section)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, section: &'static str) -> Result<u32, ContainerError> {
        let b = self.take(4, section)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self, section: &'static str) -> Result<u64, ContainerError> {
        let b = self.take(8, section)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}
