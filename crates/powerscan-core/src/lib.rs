//! Shared data model and orchestration primitives for powerscan.
//!
//! This crate holds everything the scan orchestrator and the protocol probes
//! have in common: the fixed protocol enumeration and device records
//! (`device`), the IP range registry and its CLI-side accumulator (`range`),
//! subnet expansion from CIDR strings or connected interfaces (`subnet`),
//! and the counting gate that bounds concurrent probe connections (`gate`).

pub mod device;
pub mod error;
pub mod gate;
pub mod range;
pub mod subnet;

pub use error::{CoreError, Result};
