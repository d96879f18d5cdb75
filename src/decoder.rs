//! Container decoder

use base64::Engine;
use tracing::{debug, info};

use crate::codec::{self, FALLBACK_EXTENSION, HEIC_EXTENSION};
use crate::config::DecodeMode;
use crate::container::{image_blocks, label_is_heic, split_label, ExtractedFile};
use crate::error::{Error, Result};

/// Recovers the embedded images from container text
pub struct Decoder {
    mode: DecodeMode,
}

impl Decoder {
    /// Create a decoder that writes payloads verbatim
    pub fn new() -> Self {
        Self {
            mode: DecodeMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: DecodeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// Decode raw container bytes, which must be UTF-8
    pub fn decode_bytes(&self, data: &[u8]) -> Result<Vec<ExtractedFile>> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::Parse(format!("container is not valid UTF-8: {}", e)))?;
        self.decode(text)
    }

    /// Decode every image block in order. The first bad block aborts the whole decode.
    pub fn decode(&self, input: &str) -> Result<Vec<ExtractedFile>> {
        let files = image_blocks(input)
            .enumerate()
            .map(|(i, block)| self.decode_block(i + 1, block))
            .collect::<Result<Vec<_>>>()?;

        info!(files = files.len(), mode = ?self.mode, "container decoded");
        Ok(files)
    }

    fn decode_block(&self, index: usize, block: &str) -> Result<ExtractedFile> {
        let (label, payload) = split_label(block).ok_or_else(|| {
            Error::Parse(format!("error processing image {}: missing ':' after label", index))
        })?;

        let base64_str = Self::filter_base64_data(payload.trim());
        let data = base64::engine::general_purpose::STANDARD
            .decode(&base64_str)
            .map_err(|e| Error::Parse(format!("error processing image {}: {}", index, e)))?;
        if data.is_empty() {
            return Err(Error::Parse(format!("error processing image {}: empty payload", index)));
        }

        if label_is_heic(label) {
            debug!(index, label, size = data.len(), "heic payload kept verbatim");
            return Ok(ExtractedFile {
                index,
                extension: HEIC_EXTENSION.to_string(),
                data,
            });
        }

        let file = match self.mode {
            DecodeMode::Verbatim => {
                let extension = codec::sniff_format(&data)
                    .map(codec::format_extension)
                    .unwrap_or(FALLBACK_EXTENSION);
                ExtractedFile {
                    index,
                    extension: extension.to_string(),
                    data,
                }
            }
            DecodeMode::Reencode => {
                let wrap = |e: Error| Error::Codec(format!("error processing image {}: {}", index, e.cause_text()));
                let (image, format) = codec::open_image(label, &data).map_err(wrap)?;
                let data = codec::encode_lossless(&image, format).map_err(wrap)?;
                ExtractedFile {
                    index,
                    extension: codec::format_extension(format).to_string(),
                    data,
                }
            }
        };

        debug!(index, label, extension = %file.extension, size = file.data.len(), "image decoded");
        Ok(file)
    }

    /// Drop line breaks so wrapped payloads decode
    fn filter_base64_data(payload: &str) -> String {
        payload.chars().filter(|&c| c != '\n' && c != '\r').collect()
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
