//! Error types for the protocol probes.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response from {peer}: {reason}")]
    BadResponse { peer: String, reason: String },

    #[error("could not build query packet: {0}")]
    QueryBuild(String),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
