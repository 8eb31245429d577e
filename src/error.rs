//! Error types for the segmentation pipeline

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to load '{}'", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("'{}' has {channels} channels (expected 3)", path.display())]
    UnsupportedChannels { path: PathBuf, channels: u8 },

    #[error("failed to load model from '{}': {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("failed to compute encoded image: {0}")]
    Embedding(String),

    #[error("no image embedding computed for a {width}x{height} image")]
    MissingEmbedding { width: u32, height: u32 },

    #[error("failed to compute masks: {0}")]
    MaskDecoding(String),

    #[error("failed to write '{}'", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_error_names_file() {
        let err = Error::UnsupportedChannels {
            path: PathBuf::from("cat.png"),
            channels: 4,
        };
        assert_eq!(err.to_string(), "'cat.png' has 4 channels (expected 3)");
    }

    #[test]
    fn test_stage_error_message() {
        let err = Error::Embedding("bad shape".to_string());
        assert_eq!(err.to_string(), "failed to compute encoded image: bad shape");
    }

    #[test]
    fn test_cause_printed_once_in_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "disk gone");
        let err = Error::Decode {
            path: PathBuf::from("nope.jpg"),
            source: image::ImageError::IoError(io),
        };
        assert_eq!(err.to_string(), "failed to load 'nope.jpg'");

        let line = format!("{:#}", anyhow::Error::from(err));
        assert!(line.starts_with("failed to load 'nope.jpg': "));
        assert_eq!(line.matches("disk gone").count(), 1);
    }

    #[test]
    fn test_write_cause_printed_once_in_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = Error::Write {
            path: PathBuf::from("out/mask_0.jpg"),
            source: image::ImageError::IoError(io),
        };
        let line = format!("{:#}", anyhow::Error::from(err));
        assert!(line.starts_with("failed to write 'out/mask_0.jpg': "));
        assert_eq!(line.matches("read-only").count(), 1);
    }
}
