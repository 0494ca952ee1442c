//! Transport configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Transmitter tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxConfig {
    /// Destination UDP port.
    ///
    /// Default: 5000
    pub port: u16,

    /// Target holographic chunk size handed to the codec, in KiB.
    ///
    /// Default: 32
    pub chunk_kb: u32,

    /// Full passes over the chunk set; each pass reshuffles.
    ///
    /// Default: 3
    pub loops: u32,

    /// Maximum datagram size, header included.
    ///
    /// Default: 1400 (conservative for typical MTUs)
    pub max_payload: usize,

    /// Pause between datagrams.
    ///
    /// Default: 500µs
    #[serde(with = "duration_secs_f64")]
    pub delay: Duration,

    /// Shuffle seed; fixing it makes the packet order reproducible.
    ///
    /// Default: None (entropy-seeded)
    pub seed: Option<u64>,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            chunk_kb: 32,
            loops: 3,
            max_payload: 1400,
            delay: Duration::from_micros(500),
            seed: None,
        }
    }
}

/// Receiver tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RxConfig {
    /// UDP port to listen on.
    ///
    /// Default: 5000
    pub port: u16,

    /// Directory where reconstructed files are written.
    ///
    /// Default: "."
    pub base_dir: PathBuf,

    /// Silence on the socket before the receiver advances to decoding.
    ///
    /// Default: 30s
    #[serde(with = "duration_secs_f64")]
    pub idle_timeout: Duration,

    /// Largest datagram accepted.
    ///
    /// Default: 65507 (IPv4 UDP ceiling)
    pub max_payload: usize,

    /// Decode policy once the link goes idle.
    ///
    /// Default: Best
    pub decode_mode: DecodeMode,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            base_dir: PathBuf::from("."),
            idle_timeout: Duration::from_secs(30),
            max_payload: crate::packet::MAX_UDP_PAYLOAD,
            decode_mode: DecodeMode::Best,
        }
    }
}

/// What to do with a transfer whose chunk set may be incomplete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeMode {
    /// Decode whatever arrived; the codec degrades gracefully.
    Best,
    /// Decode only when every announced chunk is complete.
    Strict,
}

impl std::str::FromStr for DecodeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best" => Ok(Self::Best),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown decode mode '{other}' (best|strict)")),
        }
    }
}

/// Serde helper for `Duration` as fractional seconds.
mod duration_secs_f64 {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be non-negative"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
