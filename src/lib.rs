//! # pixelfuse
//!
//! Embeds a batch of images into one text container and extracts them back
//! out into a zip archive.
//!
//! ## Container Format
//!
//! A header line, then one block per image, every block followed by a blank line:
//!
//! ```text
//! Filename: holiday
//!
//! Image 1 (beach.jpg):
//! /9j/4AAQSkZJRgABAQEAYABgAAD/2wBD...
//!
//! Image 2 (IMG_0042.HEIC):
//! AAAAGGZ0eXBoZWljAAAAAG1pZjFoZWlj...
//! ```
//!
//! Blocks are split on `\n\n`; base64 payloads never contain a blank line.
//! The label ends at the `:` closing the label line, so filenames may contain colons.
//!
//! ## Encoding Policies
//!
//! See [`EncodingPolicy`]. The default, `PassthroughHeicElseLossless`, embeds
//! HEIC uploads byte-for-byte and re-encodes everything else at full fidelity.
//! `Recompress` downscales and searches JPEG quality to stay under the 5 MiB budget.
//!
//! ## Features
//!
//! - `cli` (default): the `pixelfuse` binary.
//! - `heif`: decode HEIC pixels with the system libheif. Without it, HEIC
//!   uploads are rejected by policies that need pixels (`Recompress`,
//!   `LosslessReencode`). Encoders, services and the binary pick the decoder
//!   up automatically.
//!
//! ## Failure Model
//!
//! Both directions are all-or-nothing: the first bad file or block aborts the
//! request with an [`Error`] naming it, and no partial container or archive
//! is produced.

pub mod bundle;
pub mod codec;
pub mod config;
pub mod container;
pub mod decoder;
pub mod encoder;
pub mod error;
#[cfg(feature = "heif")]
pub mod heif;
pub mod quality;
pub mod service;

pub use codec::{ColorMode, HeifDecoder, RawFrame, UnavailableHeif};
pub use config::{DecodeMode, EmbedConfig, EncodingPolicy, ServiceConfig};
pub use container::{Container, ContainerBlock, ExtractedFile, UploadedFile};
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{Error, ErrorKind, Result};
#[cfg(feature = "heif")]
pub use heif::LibHeifDecoder;
pub use quality::{find_acceptable_encoding, QualitySearch};
pub use service::Service;
