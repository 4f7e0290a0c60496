// src/error.rs
use std::io;
use thiserror::Error;

// Re-export anyhow's Result type
pub use anyhow::Result;

/// Custom Error type for the rtstat library
#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Histogram error: {0}")]
    Histogram(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Other error: {0}")]
    Other(String),
}
