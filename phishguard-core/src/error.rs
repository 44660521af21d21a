use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Failed to read key file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write key file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid key material: {0}")]
    Pem(String),

    #[error("Shared secret must be base64 or hex: {0}")]
    Secret(String),

    #[error("Key generation failed: {0}")]
    Generate(String),
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read model file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse model file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid model: {0}")]
    Invalid(String),
}

/// Failures that abort a verdict. Network and cache trouble never ends up
/// here; it degrades to neutral values instead.
#[derive(Error, Debug)]
pub enum VerdictError {
    #[error("Payload cannot be canonicalized: {0}")]
    Canonical(#[from] serde_json::Error),

    #[error("Signing failed: {0}")]
    Signing(String),
}
