//! Serial probe: check an explicit list of candidate serial port nodes.
//!
//! Serial is never part of a complete scan; it only runs when the user
//! names ports, and a port counts as a candidate when it opens read-write.

use std::fs::OpenOptions;

use tracing::debug;

use powerscan_core::device::{Device, DeviceList, ScanKind};

use crate::error::Result;

/// Probe the named ports, comma-separated; bare names get `/dev/` prefixed.
pub async fn scan(ports: &str) -> Result<DeviceList> {
    let mut devices = DeviceList::new();
    for path in expand_port_list(ports) {
        if openable(&path) {
            devices.push(Device::new(ScanKind::Serial, "blazer_ser", path));
        } else {
            debug!(port = %path, "serial port not usable");
        }
    }
    Ok(devices)
}

fn expand_port_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            if name.starts_with('/') {
                name.to_string()
            } else {
                format!("/dev/{name}")
            }
        })
        .collect()
}

fn openable(path: &str) -> bool {
    OpenOptions::new().read(true).write(true).open(path).is_ok()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_get_dev_prefixed() {
        assert_eq!(
            expand_port_list("ttyS0,/dev/ttyUSB0, ttyS1"),
            vec!["/dev/ttyS0", "/dev/ttyUSB0", "/dev/ttyS1"]
        );
    }

    #[test]
    fn empty_entries_are_dropped() {
        assert_eq!(expand_port_list(""), Vec::<String>::new());
        assert_eq!(expand_port_list(",,ttyS0,"), vec!["/dev/ttyS0"]);
    }
}
