//! Protocol probes for powerscan.
//!
//! Each probe is an opaque discovery routine: given its options, possibly an
//! address range, and the shared [`ProbeContext`], it returns whatever
//! devices it found. Probe errors are diagnostics for the orchestrator,
//! never run failures.

pub mod avahi;
pub mod error;
pub mod ipmi;
pub mod oldnut;
pub mod serial;
pub mod simulation;
pub mod snmp;
pub mod usb;
pub mod xml_http;

use std::sync::Arc;
use std::time::Duration;

use powerscan_core::device::ScanKind;
use powerscan_core::gate::ScanGate;

pub use error::{ProbeError, Result};

/// Per-run context every probe shares: the common network timeout and the
/// gate bounding per-address fan-out.
#[derive(Clone)]
pub struct ProbeContext {
    pub timeout: Duration,
    pub gate: Arc<ScanGate>,
}

/// Whether the probe backing `kind` was compiled in and can work on this
/// platform. Unavailable kinds are skipped with a diagnostic, even when
/// requested.
pub const fn available(kind: ScanKind) -> bool {
    match kind {
        ScanKind::Usb => cfg!(all(feature = "usb", target_os = "linux")),
        ScanKind::Snmp => cfg!(feature = "snmp"),
        ScanKind::XmlHttp => cfg!(feature = "xml"),
        ScanKind::OldNut => true,
        ScanKind::Simulation => true,
        ScanKind::Avahi => cfg!(feature = "avahi"),
        ScanKind::Ipmi => cfg!(feature = "ipmi"),
        ScanKind::Serial => cfg!(unix),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
