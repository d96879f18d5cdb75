//! Encoding policies and configuration

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Error;

/// 5 MiB
pub const DEFAULT_BUDGET_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_MAX_FILES: usize = 10;
pub const DEFAULT_MAX_DIMENSION: u32 = 800;
pub const DEFAULT_START_QUALITY: u8 = 85;
pub const DEFAULT_MIN_QUALITY: u8 = 10;
pub const DEFAULT_QUALITY_STEP: u8 = 5;

/// How each uploaded image is turned into embedded bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EncodingPolicy {
    /// Downscale, then lower JPEG quality until the running total fits the budget
    Recompress,
    /// Embed the upload unchanged after checking the codec can open it
    RawBytesOnly,
    /// Decode and re-encode in the same format at full fidelity
    LosslessReencode,
    /// HEIC stays opaque; everything else is `LosslessReencode`
    #[default]
    PassthroughHeicElseLossless,
}

impl EncodingPolicy {
    pub const ALL: [EncodingPolicy; 4] = [
        EncodingPolicy::Recompress,
        EncodingPolicy::RawBytesOnly,
        EncodingPolicy::LosslessReencode,
        EncodingPolicy::PassthroughHeicElseLossless,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingPolicy::Recompress => "recompress",
            EncodingPolicy::RawBytesOnly => "raw",
            EncodingPolicy::LosslessReencode => "lossless",
            EncodingPolicy::PassthroughHeicElseLossless => "passthrough-heic",
        }
    }
}

impl fmt::Display for EncodingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncodingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "recompress" => Ok(EncodingPolicy::Recompress),
            "raw" | "raw-bytes" => Ok(EncodingPolicy::RawBytesOnly),
            "lossless" => Ok(EncodingPolicy::LosslessReencode),
            "passthrough-heic" | "passthrough" => Ok(EncodingPolicy::PassthroughHeicElseLossless),
            _ => Err(Error::Validation(format!(
                "unknown encoding policy '{}' (expected recompress, raw, lossless or passthrough-heic)",
                s
            ))),
        }
    }
}

/// How the decoder writes non-HEIC payloads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeMode {
    /// Decoded bytes are written unchanged
    #[default]
    Verbatim,
    /// Decoded bytes are round-tripped through the image codec
    Reencode,
}

/// Encoder limits and policy
#[derive(Debug, Clone)]
pub struct EmbedConfig {
    pub policy: EncodingPolicy,
    /// Upper bound on the number of files per request
    pub max_files: usize,
    /// Cumulative ceiling on base64 payload bytes
    pub budget_bytes: usize,
    /// Longer side after downscaling (`Recompress` only)
    pub max_dimension: u32,
    pub start_quality: u8,
    pub min_quality: u8,
    pub quality_step: u8,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            policy: EncodingPolicy::default(),
            max_files: DEFAULT_MAX_FILES,
            budget_bytes: DEFAULT_BUDGET_BYTES,
            max_dimension: DEFAULT_MAX_DIMENSION,
            start_quality: DEFAULT_START_QUALITY,
            min_quality: DEFAULT_MIN_QUALITY,
            quality_step: DEFAULT_QUALITY_STEP,
        }
    }
}

impl EmbedConfig {
    pub fn with_policy(policy: EncodingPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }
}

/// Configuration handed to [`crate::Service`] once at startup
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub embed: EmbedConfig,
    pub decode_mode: DecodeMode,
    /// Parent directory for per-request work areas (system temp dir when `None`)
    pub work_root: Option<PathBuf>,
}
