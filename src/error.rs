//! Error taxonomy shared by the encoder, decoder and bundler

use thiserror::Error;

/// Convenience alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure aborts the whole batch; no variant is recoverable per item.
#[derive(Debug, Error)]
pub enum Error {
    /// Input-shape violation (too many files, empty output name, ...)
    #[error("validation error: {0}")]
    Validation(String),

    /// The running total would pass the size budget and no quality reduction is left
    #[error("validation error: image file {filename} exceeds {limit} limit. Try uploading fewer images or reducing their sizes")]
    BudgetExceeded { filename: String, limit: String },

    /// Image bytes could not be identified, decoded or re-encoded
    #[error("codec error: {0}")]
    Codec(String),

    /// Malformed container text
    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Coarse classification reported to callers alongside the message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadInput,
    Unsupported,
    SizeExceeded,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::Parse(_) => ErrorKind::BadInput,
            Error::BudgetExceeded { .. } => ErrorKind::SizeExceeded,
            Error::Codec(_) => ErrorKind::Unsupported,
            Error::Io(_) | Error::Archive(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn budget_exceeded(filename: &str, budget_bytes: usize) -> Self {
        Error::BudgetExceeded {
            filename: filename.to_string(),
            limit: limit_text(budget_bytes),
        }
    }

    /// Wrap a per-file failure with the offending filename.
    ///
    /// Budget and validation errors pass through untouched so their kind survives.
    pub(crate) fn in_file(self, filename: &str) -> Self {
        match self {
            Error::BudgetExceeded { .. } | Error::Validation(_) => self,
            Error::Codec(cause) if cause.starts_with("cannot identify image file") => Error::Codec(cause),
            other => Error::Codec(format!(
                "cannot process image file: {}. Error: {}",
                filename,
                other.cause_text()
            )),
        }
    }

    /// The message without the classification prefix
    pub(crate) fn cause_text(&self) -> String {
        match self {
            Error::Validation(msg) | Error::Codec(msg) | Error::Parse(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

const MIB: usize = 1024 * 1024;

/// `5MB` for whole-MiB budgets, the exact byte count otherwise
fn limit_text(budget_bytes: usize) -> String {
    if budget_bytes > 0 && budget_bytes % MIB == 0 {
        format!("{}MB", budget_bytes / MIB)
    } else {
        format!("{} byte", budget_bytes)
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Codec(err.to_string())
    }
}
