//! Container encoder

use std::sync::Arc;

use base64::Engine;
use image::ImageFormat;
use tracing::{debug, info};

use crate::codec::{self, HeifDecoder};
use crate::config::{EmbedConfig, EncodingPolicy};
use crate::container::{Container, UploadedFile};
use crate::error::{Error, Result};
use crate::quality::QualitySearch;

/// Embeds a batch of uploads into a [`Container`]
pub struct Encoder {
    config: EmbedConfig,
    heif: Arc<dyn HeifDecoder>,
}

impl Encoder {
    /// Create an encoder with the default policy and limits
    pub fn new() -> Self {
        Self::with_config(EmbedConfig::default())
    }

    pub fn with_config(config: EmbedConfig) -> Self {
        Self {
            config,
            heif: codec::default_heif_decoder(),
        }
    }

    /// Plug in a HEIF decoder for policies that need HEIC pixels
    pub fn with_heif_decoder(mut self, decoder: Arc<dyn HeifDecoder>) -> Self {
        self.heif = decoder;
        self
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    /// Encode `files` in upload order.
    ///
    /// Fails as a whole on the first bad file; a partial container is never returned.
    pub fn encode(&self, files: &[UploadedFile], output_name: &str) -> Result<Container> {
        if files.len() > self.config.max_files {
            return Err(Error::Validation(format!(
                "too many files: {} uploaded, at most {} allowed",
                files.len(),
                self.config.max_files
            )));
        }
        check_line("output file name", output_name)?;
        for file in files {
            check_line("file name", &file.filename)?;
        }

        let mut container = Container::new(output_name);
        let mut total_size = 0usize;

        for file in files {
            let bytes = self
                .embed_file(file, total_size)
                .map_err(|e| e.in_file(&file.filename))?;
            let payload = base64::engine::general_purpose::STANDARD.encode(&bytes);

            if total_size + payload.len() > self.config.budget_bytes {
                return Err(Error::budget_exceeded(&file.filename, self.config.budget_bytes));
            }
            total_size += payload.len();

            let block = container.push(file.filename.as_str(), payload);
            debug!(
                index = block.index,
                filename = %file.filename,
                size = block.payload_len(),
                total_size,
                "embedded image"
            );
        }

        info!(
            output_name,
            files = container.blocks.len(),
            total_size,
            policy = %self.config.policy,
            "container encoded"
        );
        Ok(container)
    }

    /// Encode directly to a writer
    pub fn encode_to_writer<W: std::io::Write>(
        &self,
        files: &[UploadedFile],
        output_name: &str,
        mut writer: W,
    ) -> Result<()> {
        let container = self.encode(files, output_name)?;
        writer.write_all(container.render().as_bytes())?;
        Ok(())
    }

    fn quality_search(&self) -> QualitySearch {
        QualitySearch {
            start: self.config.start_quality,
            floor: self.config.min_quality,
            step: self.config.quality_step,
        }
    }

    /// Bytes to embed for one upload under the configured policy
    fn embed_file(&self, file: &UploadedFile, total_size: usize) -> Result<Vec<u8>> {
        let heic = file.is_heic();

        match (self.config.policy, heic) {
            (EncodingPolicy::Recompress, _) => {
                // HEIC has no encoder; it is recompressed as JPEG
                let (image, format) = if heic {
                    (codec::open_heic(self.heif.as_ref(), &file.data)?, ImageFormat::Jpeg)
                } else {
                    codec::open_image(&file.filename, &file.data)?
                };
                let image = codec::downscale(image, self.config.max_dimension);
                let (bytes, quality) =
                    self.quality_search()
                        .find(&image, format, total_size, self.config.budget_bytes)?;
                debug!(filename = %file.filename, quality, "recompressed");
                Ok(bytes)
            }
            (EncodingPolicy::RawBytesOnly, true) => {
                if !codec::sniff_heic(&file.data) {
                    return Err(Error::Codec(format!("cannot identify image file: {}", file.filename)));
                }
                Ok(file.data.clone())
            }
            (EncodingPolicy::RawBytesOnly, false) => {
                codec::probe_image(&file.filename, &file.data)?;
                Ok(file.data.clone())
            }
            (EncodingPolicy::PassthroughHeicElseLossless, true) => Ok(file.data.clone()),
            (EncodingPolicy::LosslessReencode, true) => {
                let image = codec::open_heic(self.heif.as_ref(), &file.data)?;
                codec::encode_lossless(&image, ImageFormat::Png)
            }
            (EncodingPolicy::LosslessReencode | EncodingPolicy::PassthroughHeicElseLossless, false) => {
                let (image, format) = codec::open_image(&file.filename, &file.data)?;
                codec::encode_lossless(&image, format)
            }
        }
    }
}

/// Names are written into single-line headers and labels
fn check_line(what: &str, name: &str) -> Result<()> {
    if name.contains(['\n', '\r']) {
        return Err(Error::Validation(format!("{} must not contain line breaks: {:?}", what, name)));
    }
    Ok(())
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::{heic_bytes, jpeg_bytes, png_bytes, SolidHeif};
    use crate::decoder::Decoder;
    use crate::error::ErrorKind;
    use crate::quality::{embedded_len, find_acceptable_encoding};
    use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

    fn b64(data: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(data)
    }

    fn unb64(text: &str) -> Vec<u8> {
        base64::engine::general_purpose::STANDARD.decode(text).unwrap()
    }

    fn encoder(policy: EncodingPolicy) -> Encoder {
        Encoder::with_config(EmbedConfig::with_policy(policy))
    }

    /// High-frequency JPEG whose size drops with every quality step
    fn noisy_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let v = x.wrapping_mul(2654435761).wrapping_add(y.wrapping_mul(40503)) >> 5;
            Rgb([v as u8, (v >> 8) as u8, (v >> 16) as u8])
        });
        codec::encode_image(&DynamicImage::ImageRgb8(img), ImageFormat::Jpeg, 95).unwrap()
    }

    /// What `Recompress` hands to the quality search for an upload
    fn decoded(data: &[u8]) -> DynamicImage {
        codec::open_image("x.jpg", data).unwrap().0
    }

    #[test]
    fn test_encode_grammar() {
        let files = vec![
            UploadedFile::new("a.png", "image/png", png_bytes(4, 4)),
            UploadedFile::new("b.heic", "image/heic", heic_bytes()),
        ];
        let container = Encoder::new().encode(&files, "album").unwrap();
        let text = container.render();

        assert!(text.starts_with("Filename: album\n\nImage 1 (a.png):\n"));
        assert!(text.contains(&format!("Image 2 (b.heic):\n{}\n\n", b64(&heic_bytes()))));
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn test_encode_too_many_files_before_processing() {
        // Garbage content would fail with a codec error if anything were processed
        let files: Vec<_> = (0..11)
            .map(|i| UploadedFile::new(format!("f{}.png", i), "image/png", b"garbage".to_vec()))
            .collect();

        let err = Encoder::new().encode(&files, "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadInput);
        assert!(err.to_string().contains("too many files"));
    }

    #[test]
    fn test_encode_ten_files_allowed() {
        let files: Vec<_> = (0..10)
            .map(|i| UploadedFile::new(format!("f{}.png", i), "image/png", png_bytes(2, 2)))
            .collect();
        let container = Encoder::new().encode(&files, "x").unwrap();
        assert_eq!(container.blocks.len(), 10);
        assert_eq!(container.blocks[9].label(), "Image 10 (f9.png)");
    }

    #[test]
    fn test_output_name_with_line_break_rejected() {
        let files = vec![UploadedFile::new("real.heic", "image/heic", heic_bytes())];
        let name = "trip\n\nImage 1 (evil.heic):\nSU5KRUNURUQ=";

        let err = Encoder::new().encode(&files, name).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadInput);
        assert!(err.to_string().contains("output file name"));

        let err = Encoder::new().encode(&files, "trip\r").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadInput);
    }

    #[test]
    fn test_filename_with_line_break_rejected_before_processing() {
        // The first file is garbage; the name check must fire before any decode
        let files = vec![
            UploadedFile::new("garbage.png", "image/png", b"garbage".to_vec()),
            UploadedFile::new("a\n\nb.heic", "image/heic", heic_bytes()),
        ];
        let err = Encoder::new().encode(&files, "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadInput);
        assert!(err.to_string().contains("file name"));
    }

    #[test]
    fn test_one_upload_decodes_to_one_block() {
        let files = vec![UploadedFile::new("real (1): copy.heic", "image/heic", heic_bytes())];
        let text = Encoder::new().encode(&files, "trip: day 1").unwrap().render();
        let extracted = Decoder::new().decode(&text).unwrap();
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].data, heic_bytes());
    }

    #[test]
    fn test_passthrough_heic_is_opaque() {
        // Not a decodable image at all; passthrough must never open it
        let files = vec![UploadedFile::new("IMG_0001.HEIC", "", heic_bytes())];
        let container = encoder(EncodingPolicy::PassthroughHeicElseLossless)
            .encode(&files, "x")
            .unwrap();
        assert_eq!(unb64(&container.blocks[0].payload), heic_bytes());
    }

    #[test]
    fn test_passthrough_heic_by_media_type() {
        let files = vec![UploadedFile::new("upload", "image/heic", b"anything".to_vec())];
        let container = Encoder::new().encode(&files, "x").unwrap();
        assert_eq!(unb64(&container.blocks[0].payload), b"anything");
    }

    #[test]
    fn test_raw_bytes_only_embeds_original() {
        let jpeg = jpeg_bytes(20, 10);
        let files = vec![UploadedFile::new("a.jpg", "image/jpeg", jpeg.clone())];
        let container = encoder(EncodingPolicy::RawBytesOnly).encode(&files, "x").unwrap();
        assert_eq!(unb64(&container.blocks[0].payload), jpeg);
    }

    #[test]
    fn test_raw_bytes_only_rejects_unidentifiable() {
        let files = vec![UploadedFile::new("notes.txt", "text/plain", b"hello".to_vec())];
        let err = encoder(EncodingPolicy::RawBytesOnly).encode(&files, "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert_eq!(err.to_string(), "codec error: cannot identify image file: notes.txt");

        let files = vec![UploadedFile::new("fake.heic", "", b"not heif".to_vec())];
        let err = encoder(EncodingPolicy::RawBytesOnly).encode(&files, "x").unwrap_err();
        assert!(err.to_string().contains("fake.heic"));
    }

    #[test]
    fn test_lossless_reencode_keeps_pixels_and_format() {
        let png = png_bytes(12, 7);
        let files = vec![UploadedFile::new("a.png", "image/png", png.clone())];
        let container = encoder(EncodingPolicy::LosslessReencode).encode(&files, "x").unwrap();

        let embedded = unb64(&container.blocks[0].payload);
        let (original, _) = codec::open_image("a.png", &png).unwrap();
        let (restored, format) = codec::open_image("a.png", &embedded).unwrap();
        assert_eq!(format, ImageFormat::Png);
        assert_eq!(original.to_rgba8().into_raw(), restored.to_rgba8().into_raw());
    }

    #[test]
    fn test_lossless_heic_needs_decoder() {
        let files = vec![UploadedFile::new("a.heic", "image/heic", heic_bytes())];
        let err = encoder(EncodingPolicy::LosslessReencode).encode(&files, "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(err.to_string().starts_with("codec error: cannot process image file: a.heic. Error:"));

        let container = encoder(EncodingPolicy::LosslessReencode)
            .with_heif_decoder(Arc::new(SolidHeif))
            .encode(&files, "x")
            .unwrap();
        let embedded = unb64(&container.blocks[0].payload);
        assert_eq!(codec::sniff_format(&embedded), Some(ImageFormat::Png));
    }

    #[test]
    fn test_recompress_downscales() {
        let files = vec![UploadedFile::new("wide.png", "image/png", png_bytes(1600, 400))];
        let container = encoder(EncodingPolicy::Recompress).encode(&files, "x").unwrap();

        let embedded = unb64(&container.blocks[0].payload);
        let (image, format) = codec::open_image("wide.png", &embedded).unwrap();
        assert_eq!(format, ImageFormat::Png);
        assert_eq!(image.dimensions(), (800, 200));
    }

    #[test]
    fn test_recompress_heic_becomes_jpeg() {
        let files = vec![UploadedFile::new("a.heic", "image/heic", heic_bytes())];
        let container = encoder(EncodingPolicy::Recompress)
            .with_heif_decoder(Arc::new(SolidHeif))
            .encode(&files, "x")
            .unwrap();
        let embedded = unb64(&container.blocks[0].payload);
        assert_eq!(codec::sniff_format(&embedded), Some(ImageFormat::Jpeg));
    }

    #[test]
    fn test_budget_exceeded_fails_whole_request() {
        let config = EmbedConfig {
            budget_bytes: 64,
            ..EmbedConfig::with_policy(EncodingPolicy::RawBytesOnly)
        };
        let files = vec![
            UploadedFile::new("small.heic", "image/heic", heic_bytes()),
            UploadedFile::new("big.png", "image/png", png_bytes(32, 32)),
        ];
        let err = Encoder::with_config(config).encode(&files, "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SizeExceeded);
        assert!(err.to_string().contains("big.png"));
    }

    #[test]
    fn test_recompress_over_budget_at_floor_fails() {
        let config = EmbedConfig {
            budget_bytes: 100,
            ..EmbedConfig::with_policy(EncodingPolicy::Recompress)
        };
        let files = vec![UploadedFile::new("a.jpg", "image/jpeg", jpeg_bytes(64, 64))];
        let err = Encoder::with_config(config).encode(&files, "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SizeExceeded);
    }

    #[test]
    fn test_recompress_lowers_quality_to_fit_then_resets() {
        let first = jpeg_bytes(16, 16);
        let second = noisy_jpeg(256, 256);
        let third = jpeg_bytes(8, 8);

        let encoded_at = |data: &[u8], quality: u8| {
            codec::encode_image(&decoded(data), ImageFormat::Jpeg, quality).unwrap()
        };
        let first_85 = embedded_len(encoded_at(&first, 85).len());
        let second_85 = embedded_len(encoded_at(&second, 85).len());
        let second_80 = embedded_len(encoded_at(&second, 80).len());
        let third_85 = embedded_len(encoded_at(&third, 85).len());
        // One step down frees more room than the third image needs
        assert!(second_85 - second_80 > third_85);

        // Image 2 cannot stay at 85; image 3 still fits at 85 afterwards
        let budget = first_85 + second_85 - 1;
        let config = EmbedConfig {
            budget_bytes: budget,
            ..EmbedConfig::with_policy(EncodingPolicy::Recompress)
        };
        let files = vec![
            UploadedFile::new("first.jpg", "image/jpeg", first.clone()),
            UploadedFile::new("second.jpg", "image/jpeg", second.clone()),
            UploadedFile::new("third.jpg", "image/jpeg", third.clone()),
        ];
        let container = Encoder::with_config(config).encode(&files, "fit").unwrap();

        assert!(container.payload_size() <= budget);
        assert_eq!(unb64(&container.blocks[0].payload), encoded_at(&first, 85));
        assert_ne!(unb64(&container.blocks[1].payload), encoded_at(&second, 85));
        assert_eq!(unb64(&container.blocks[1].payload), encoded_at(&second, 80));

        let (standalone, quality) =
            find_acceptable_encoding(&decoded(&third), ImageFormat::Jpeg, 0, usize::MAX).unwrap();
        assert_eq!(quality, 85);
        assert_eq!(unb64(&container.blocks[2].payload), standalone);
    }

    #[test]
    fn test_codec_failure_names_file() {
        let files = vec![
            UploadedFile::new("ok.png", "image/png", png_bytes(2, 2)),
            UploadedFile::new("broken.png", "image/png", png_bytes(8, 8)[..40].to_vec()),
        ];
        let err = Encoder::new().encode(&files, "x").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert!(err.to_string().contains("broken.png"));
    }

    #[test]
    fn test_encode_to_writer() {
        let files = vec![UploadedFile::new("a.heic", "image/heic", b"xyz".to_vec())];
        let mut out = Vec::new();
        Encoder::new().encode_to_writer(&files, "w", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Filename: w\n\nImage 1 (a.heic):\neHl6\n\n");
    }
}
