//! Error types for the display output HAL

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no usable baseparameter backing store")]
    BackingStoreUnavailable,

    #[error("baseparameter record too short: {len} bytes, need {need}")]
    RecordTooShort { len: u64, need: u64 },

    #[error("no connected primary-capable connector")]
    ConnectorResolutionFailed,

    #[error("invalid mode string: {0}")]
    InvalidMode(String),

    #[error("property {key}: {reason}")]
    Property { key: String, reason: String },

    #[error("gamma error: {0}")]
    Gamma(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
