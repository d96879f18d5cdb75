//! Container data structures and block grammar

use std::fmt;
use std::path::Path;

// Container format constants
pub const HEADER_PREFIX: &str = "Filename: ";
pub const BLOCK_DELIMITER: &str = "\n\n";
pub const LABEL_PREFIX: &str = "Image";
pub const LABEL_TERMINATOR: &str = ":\n";

/// Prefix of every entry name in the extraction archive
pub const EXTRACTED_PREFIX: &str = "extracted_image_";

/// An image supplied by the caller, in upload order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    /// Media type declared by the client (may be empty)
    pub media_type: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, media_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, declaring a media type from its extension
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let media_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(media_type_for_extension)
            .unwrap_or("application/octet-stream");
        Ok(Self::new(filename, media_type, data))
    }

    pub fn is_heic(&self) -> bool {
        crate::codec::is_heic(&self.filename, &self.media_type)
    }
}

/// Media type for a file extension, if it names an image
pub fn media_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        "ico" => Some("image/x-icon"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

/// An image recovered from a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// 1-based position among the container's image blocks
    pub index: usize,
    /// Lower-case extension without the dot
    pub extension: String,
    pub data: Vec<u8>,
}

impl ExtractedFile {
    /// Entry name inside the extraction archive
    pub fn archive_name(&self) -> String {
        format!("{}{}.{}", EXTRACTED_PREFIX, self.index, self.extension)
    }
}

/// A single embedded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerBlock {
    /// 1-based position in upload order
    pub index: usize,
    /// Original upload name, kept verbatim in the label
    pub filename: String,
    /// Base64 text of the embedded bytes
    pub payload: String,
}

impl ContainerBlock {
    pub fn new(index: usize, filename: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            index,
            filename: filename.into(),
            payload: payload.into(),
        }
    }

    /// Label line without the trailing colon, e.g. `Image 1 (cat.png)`
    pub fn label(&self) -> String {
        format!("{} {} ({})", LABEL_PREFIX, self.index, self.filename)
    }

    /// Size this block contributes to the budget
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// A header line followed by ordered image blocks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    pub output_name: String,
    pub blocks: Vec<ContainerBlock>,
}

impl Container {
    pub fn new(output_name: impl Into<String>) -> Self {
        Self {
            output_name: output_name.into(),
            blocks: Vec::new(),
        }
    }

    /// Append a block; its index is the next upload position
    pub fn push(&mut self, filename: impl Into<String>, payload: impl Into<String>) -> &ContainerBlock {
        let index = self.blocks.len() + 1;
        self.blocks.push(ContainerBlock::new(index, filename, payload));
        &self.blocks[index - 1]
    }

    /// Sum of all payload lengths
    pub fn payload_size(&self) -> usize {
        self.blocks.iter().map(ContainerBlock::payload_len).sum()
    }

    /// File name the container is persisted under: `{output_name}.txt`
    ///
    /// Only the final path component of the output name is used, so a
    /// caller-supplied name can never escape the target directory.
    pub fn file_name(&self) -> String {
        let base = Path::new(&self.output_name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .unwrap_or("container");
        format!("{}.txt", base)
    }

    /// Render to the text grammar
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", HEADER_PREFIX, self.output_name, BLOCK_DELIMITER)?;
        for block in &self.blocks {
            write!(f, "{}:\n{}{}", block.label(), block.payload, BLOCK_DELIMITER)?;
        }
        Ok(())
    }
}

/// Split a container into raw blocks on the blank-line delimiter,
/// keeping only those that start with the image label prefix.
pub fn image_blocks(text: &str) -> impl Iterator<Item = &str> {
    text.split(BLOCK_DELIMITER)
        .filter(|block| block.starts_with(LABEL_PREFIX))
}

/// Split a raw block into `(label, payload)`.
///
/// The label ends at the first `:` that closes the label line, so colons
/// inside the filename survive. Blocks written on a single line fall back
/// to the first `:`.
pub fn split_label(block: &str) -> Option<(&str, &str)> {
    if let Some(pos) = block.find(LABEL_TERMINATOR) {
        return Some((&block[..pos], &block[pos + LABEL_TERMINATOR.len()..]));
    }
    if let Some(pos) = block.find(":\r\n") {
        return Some((&block[..pos], &block[pos + 3..]));
    }
    block.split_once(':')
}

/// True when a label marks an opaque HEIC payload
pub fn label_is_heic(label: &str) -> bool {
    label.to_ascii_lowercase().contains("heic")
}
