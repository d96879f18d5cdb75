//! Image codec orchestration
//!
//! Pixel work is delegated to the `image` crate. HEIC pixel decoding is
//! delegated to a [`HeifDecoder`]: `LibHeifDecoder` with the `heif` feature,
//! otherwise [`UnavailableHeif`], which rejects HEIC whenever a policy needs pixels.

use std::io::Cursor;
use std::str::FromStr;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};

use crate::error::{Error, Result};

pub const HEIC_MEDIA_TYPE: &str = "image/heic";
pub const HEIC_EXTENSION: &str = "heic";
/// Extension used when the codec cannot name the format
pub const FALLBACK_EXTENSION: &str = "jpeg";
/// JPEG quality used for full-fidelity re-encodes
pub const LOSSLESS_JPEG_QUALITY: u8 = 100;

// ISO-BMFF brands announced by HEIF/HEIC files
const HEIF_BRANDS: &[&[u8; 4]] = &[
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"mif1", b"msf1",
];

/// HEIC by filename suffix (case-insensitive) or declared media type
pub fn is_heic(filename: &str, media_type: &str) -> bool {
    filename.to_ascii_lowercase().ends_with(".heic") || media_type.eq_ignore_ascii_case(HEIC_MEDIA_TYPE)
}

/// Cheap container check: an `ftyp` box with a HEIF brand
pub fn sniff_heic(data: &[u8]) -> bool {
    if data.len() < 12 || &data[4..8] != b"ftyp" {
        return false;
    }
    HEIF_BRANDS.iter().any(|brand| &data[8..12] == *brand)
}

/// Lower-case format name used as the extracted file extension
pub fn format_extension(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        ImageFormat::Bmp => "bmp",
        ImageFormat::WebP => "webp",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Ico => "ico",
        ImageFormat::Avif => "avif",
        ImageFormat::Pnm => "ppm",
        ImageFormat::Tga => "tga",
        ImageFormat::Dds => "dds",
        ImageFormat::Hdr => "hdr",
        ImageFormat::OpenExr => "exr",
        ImageFormat::Farbfeld => "ff",
        ImageFormat::Qoi => "qoi",
        _ => FALLBACK_EXTENSION,
    }
}

/// Guess the format from magic bytes without decoding
pub fn sniff_format(data: &[u8]) -> Option<ImageFormat> {
    image::guess_format(data).ok()
}

fn reader<'a>(filename: &str, data: &'a [u8]) -> Result<ImageReader<Cursor<&'a [u8]>>> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| Error::Codec(e.to_string()))?;
    if reader.format().is_none() {
        return Err(Error::Codec(format!("cannot identify image file: {}", filename)));
    }
    Ok(reader)
}

/// Open an image far enough to read its header, without decoding pixels
pub fn probe_image(filename: &str, data: &[u8]) -> Result<ImageFormat> {
    let reader = reader(filename, data)?;
    let format = reader
        .format()
        .ok_or_else(|| Error::Codec(format!("cannot identify image file: {}", filename)))?;
    reader.into_dimensions()?;
    Ok(format)
}

/// Fully decode an image, returning it with its detected format
pub fn open_image(filename: &str, data: &[u8]) -> Result<(DynamicImage, ImageFormat)> {
    let reader = reader(filename, data)?;
    let format = reader
        .format()
        .ok_or_else(|| Error::Codec(format!("cannot identify image file: {}", filename)))?;
    let image = reader.decode()?;
    Ok((image, format))
}

/// Shrink so the longer side is at most `max_dimension`; never upscales
pub fn downscale(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= max_dimension && height <= max_dimension {
        return image;
    }
    image.thumbnail(max_dimension, max_dimension)
}

/// Encode `image` as `format`. `quality` only affects JPEG.
pub fn encode_image(image: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());

    match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(|e| Error::Codec(format!("JPEG encode failed: {e}")))?;
        }
        ImageFormat::WebP => {
            // The bundled WebP encoder is lossless and only takes 8-bit RGB(A)
            DynamicImage::ImageRgba8(image.to_rgba8())
                .write_to(&mut buf, ImageFormat::WebP)
                .map_err(|e| Error::Codec(format!("WebP encode failed: {e}")))?;
        }
        other => {
            image
                .write_to(&mut buf, other)
                .map_err(|e| Error::Codec(format!("{:?} encode failed: {e}", other)))?;
        }
    }

    Ok(buf.into_inner())
}

/// Re-encode in `format` without any quality reduction
pub fn encode_lossless(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    encode_image(image, format, LOSSLESS_JPEG_QUALITY)
}

/// Pixel layout reported by a HEIF decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    L,
    La,
    Rgb,
    Rgba,
}

impl ColorMode {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            ColorMode::L => 1,
            ColorMode::La => 2,
            ColorMode::Rgb => 3,
            ColorMode::Rgba => 4,
        }
    }
}

impl FromStr for ColorMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "L" => Ok(ColorMode::L),
            "LA" => Ok(ColorMode::La),
            "RGB" => Ok(ColorMode::Rgb),
            "RGBA" => Ok(ColorMode::Rgba),
            _ => Err(Error::Codec(format!("unsupported color mode: {}", s))),
        }
    }
}

/// Decoded pixel buffer as produced by a HEIF decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub mode: ColorMode,
    pub width: u32,
    pub height: u32,
    /// Bytes per row in `data`, at least `width * bytes_per_pixel`
    pub stride: usize,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Rebuild a tightly packed image from the strided buffer
    pub fn into_image(self) -> Result<DynamicImage> {
        let row_len = self.width as usize * self.mode.bytes_per_pixel();
        let rows = self.height as usize;
        if self.stride < row_len {
            return Err(Error::Codec(format!(
                "stride {} is shorter than a row of {} bytes",
                self.stride, row_len
            )));
        }
        let needed = if rows == 0 { 0 } else { self.stride * (rows - 1) + row_len };
        if self.data.len() < needed {
            return Err(Error::Codec(format!(
                "frame buffer holds {} bytes, {} needed",
                self.data.len(),
                needed
            )));
        }

        let packed = if self.stride == row_len {
            let mut data = self.data;
            data.truncate(row_len * rows);
            data
        } else {
            let mut packed = Vec::with_capacity(row_len * rows);
            for row in self.data.chunks(self.stride).take(rows) {
                packed.extend_from_slice(&row[..row_len]);
            }
            packed
        };

        let (width, height) = (self.width, self.height);
        let image = match self.mode {
            ColorMode::L => image::GrayImage::from_raw(width, height, packed).map(DynamicImage::ImageLuma8),
            ColorMode::La => image::GrayAlphaImage::from_raw(width, height, packed).map(DynamicImage::ImageLumaA8),
            ColorMode::Rgb => image::RgbImage::from_raw(width, height, packed).map(DynamicImage::ImageRgb8),
            ColorMode::Rgba => image::RgbaImage::from_raw(width, height, packed).map(DynamicImage::ImageRgba8),
        };
        image.ok_or_else(|| Error::Codec("frame buffer does not match its dimensions".to_string()))
    }
}

/// Source of decoded HEIC frames
pub trait HeifDecoder: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<RawFrame>;
}

/// Default decoder for builds without a HEIF library
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableHeif;

impl HeifDecoder for UnavailableHeif {
    fn decode(&self, data: &[u8]) -> Result<RawFrame> {
        if !sniff_heic(data) {
            return Err(Error::Codec("not a HEIF container".to_string()));
        }
        Err(Error::Codec("HEIC pixel decoding is not available in this build".to_string()))
    }
}

/// The HEIF decoder this build was compiled with
pub fn default_heif_decoder() -> Arc<dyn HeifDecoder> {
    #[cfg(feature = "heif")]
    {
        Arc::new(crate::heif::LibHeifDecoder)
    }
    #[cfg(not(feature = "heif"))]
    {
        Arc::new(UnavailableHeif)
    }
}

/// Decode a HEIC upload into a standard in-memory image
pub fn open_heic(decoder: &dyn HeifDecoder, data: &[u8]) -> Result<DynamicImage> {
    decoder.decode(data)?.into_image()
}
