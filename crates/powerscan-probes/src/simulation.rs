//! Simulation probe: list recorded device files the dummy driver can replay.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use powerscan_core::device::{Device, DeviceList, ScanKind};

use crate::error::Result;

pub const DEFAULT_CONFPATH: &str = "/etc/nut";

/// Scan the configuration directory for `.dev` and `.seq` files.
pub async fn scan() -> Result<DeviceList> {
    scan_dir(&confpath())
}

fn confpath() -> PathBuf {
    std::env::var_os("NUT_CONFPATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFPATH))
}

fn scan_dir(dir: &Path) -> Result<DeviceList> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "no configuration directory, no simulation devices");
            return Ok(DeviceList::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| {
            Path::new(name)
                .extension()
                .is_some_and(|ext| ext == "dev" || ext == "seq")
        })
        .collect();
    names.sort();

    Ok(names
        .into_iter()
        .map(|name| Device::new(ScanKind::Simulation, "dummy-ups", name))
        .collect())
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn finds_dev_and_seq_files_only() {
        let tmp = TempDir::new().unwrap();
        for name in ["ups1.dev", "flaky.seq", "ups.conf", "notes.txt", "seq"] {
            File::create(tmp.path().join(name)).unwrap();
        }

        let devices = scan_dir(tmp.path()).unwrap();
        let ports: Vec<_> = devices.iter().map(|d| d.port.as_str()).collect();
        assert_eq!(ports, vec!["flaky.seq", "ups1.dev"]);
        assert!(devices.iter().all(|d| d.driver == "dummy-ups"));
    }

    #[test]
    fn missing_directory_is_an_empty_result() {
        let tmp = TempDir::new().unwrap();
        let gone = tmp.path().join("absent");
        assert!(scan_dir(&gone).unwrap().is_empty());
    }
}
