use std::any::Any;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("No WebP encoder available")]
    NoEncoderAvailable,

    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    #[error("Failed to encode WebP: {0}")]
    EncodeError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output path equals input path: {}", .0.display())]
    OutputPathCollision(PathBuf),

    #[error("Please select one or more image files.")]
    NoFilesSelected,

    #[error("You have selected {selected} files. The maximum number of files allowed is {max}.")]
    SelectionLimitExceeded { selected: usize, max: usize },

    #[error("Worker pool error: {0}")]
    ThreadPool(String),

    #[error("Conversion interrupted after {processed} of {total} files")]
    Interrupted { processed: usize, total: usize },
}

impl From<image::ImageError> for ConvertError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::IoError(io) => ConvertError::Io(io),
            image::ImageError::Encoding(enc) => ConvertError::EncodeError(enc.to_string()),
            image::ImageError::Unsupported(u) => ConvertError::UnsupportedFormat(u.to_string()),
            other => ConvertError::DecodeError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
