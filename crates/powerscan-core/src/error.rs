//! Error types for powerscan-core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("malformed subnet specification '{input}': {reason}")]
    MalformedInput { input: String, reason: String },

    #[error("no network interfaces found while expanding connected subnets")]
    NoInterfaces,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
