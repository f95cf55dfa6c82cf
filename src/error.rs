//! Crate-level error type.
//!
//! Only true failures live here (unreadable input, bad configuration, IO).
//! A document without an address is a normal outcome and never an error.

use thiserror::Error;

use crate::config::ConfigError;
use crate::llm::LlmError;
use crate::ocr::OcrError;
use crate::profile::ProfileError;

#[derive(Debug, Error)]
pub enum LienscanError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

pub type Result<T> = std::result::Result<T, LienscanError>;
