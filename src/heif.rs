//! HEIC pixel decoding through the system libheif

use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

use crate::codec::{ColorMode, HeifDecoder, RawFrame};
use crate::error::{Error, Result};

/// [`HeifDecoder`] backed by `libheif-rs`.
///
/// Decodes the primary image into interleaved 8-bit RGB, or RGBA when the
/// image carries an alpha channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibHeifDecoder;

impl HeifDecoder for LibHeifDecoder {
    fn decode(&self, data: &[u8]) -> Result<RawFrame> {
        let lib = LibHeif::new();
        let ctx = HeifContext::read_from_bytes(data).map_err(heif_error)?;
        let handle = ctx.primary_image_handle().map_err(heif_error)?;

        let (chroma, mode) = if handle.has_alpha_channel() {
            (RgbChroma::Rgba, ColorMode::Rgba)
        } else {
            (RgbChroma::Rgb, ColorMode::Rgb)
        };
        let image = lib
            .decode(&handle, ColorSpace::Rgb(chroma), None)
            .map_err(heif_error)?;

        let planes = image.planes();
        let plane = planes
            .interleaved
            .ok_or_else(|| Error::Codec("decoded HEIC has no interleaved plane".to_string()))?;

        Ok(RawFrame {
            mode,
            width: plane.width,
            height: plane.height,
            stride: plane.stride,
            data: plane.data.to_vec(),
        })
    }
}

fn heif_error(err: libheif_rs::HeifError) -> Error {
    Error::Codec(format!("HEIC decode failed: {err}"))
}
