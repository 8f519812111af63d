use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed cause carried by encoder failures.
pub type EncodeCause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding failed at quality {quality}: {source}")]
    Encode {
        quality: u8,
        #[source]
        source: EncodeCause,
    },

    #[error("Invalid quality value: {0}. Must be between 1 and 100")]
    InvalidQuality(u8),

    #[error("Invalid quality range: min {min} is greater than max {max}")]
    InvalidQualityRange { min: u8, max: u8 },

    #[error("Invalid iteration limit: {0}. Must be at least 1")]
    InvalidIterations(u32),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("File too large: {0} bytes. Maximum allowed: {1} bytes")]
    FileTooLarge(u64, u64),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to create output directory: {0}")]
    DirectoryCreationFailed(PathBuf),

    #[error("Failed to replace {path}: {source}")]
    ReplaceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No image files found in input path: {0}")]
    NoImageFilesFound(String),

    #[error("Output {path} is already written by {first}")]
    OutputConflict { path: PathBuf, first: PathBuf },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl CompressionError {
    /// Wraps any codec failure as an encode error for the given quality.
    pub fn encode<E>(quality: u8, cause: E) -> Self
    where
        E: Into<EncodeCause>,
    {
        CompressionError::Encode {
            quality,
            source: cause.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CompressionError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            CompressionError::Encode { .. } => ErrorKind::Encode,
            CompressionError::InvalidQuality(_)
            | CompressionError::InvalidQualityRange { .. }
            | CompressionError::InvalidIterations(_)
            | CompressionError::InvalidSize(_)
            | CompressionError::ThreadPool(_) => ErrorKind::InvalidOptions,
            CompressionError::Io(_)
            | CompressionError::FileTooLarge(..)
            | CompressionError::FileNotFound(_)
            | CompressionError::DirectoryCreationFailed(_)
            | CompressionError::ReplaceFailed { .. }
            | CompressionError::NoImageFilesFound(_)
            | CompressionError::OutputConflict { .. } => ErrorKind::Io,
        }
    }
}

/// Coarse classification of a failure, as shown in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    UnsupportedFormat,
    Encode,
    Io,
    InvalidOptions,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnsupportedFormat => "UnsupportedFormatError",
            ErrorKind::Encode => "EncodeError",
            ErrorKind::Io => "IOError",
            ErrorKind::InvalidOptions => "InvalidOptionsError",
        };
        write!(f, "{}", name)
    }
}

pub type Result<T> = std::result::Result<T, CompressionError>;
