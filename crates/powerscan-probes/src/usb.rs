//! USB probe: walk the sysfs USB device tree for known UPS HID vendors.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use powerscan_core::device::{Device, DeviceList, LinkDetail, ScanKind};

use crate::error::Result;

pub const SYSFS_USB_ROOT: &str = "/sys/bus/usb/devices";

/// Vendor ids of UPS families the HID driver can talk to.
const UPS_VENDORS: &[(&str, &str)] = &[
    ("0463", "MGE UPS Systems"),
    ("047c", "Dell"),
    ("050d", "Belkin"),
    ("051d", "APC"),
    ("0592", "Powerware"),
    ("06da", "Phoenixtec Power"),
    ("0764", "Cyber Power Systems"),
    ("09ae", "Tripp Lite"),
    ("0d9f", "Powercom"),
    ("10af", "Liebert"),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct UsbOptions {
    pub link_detail: LinkDetail,
}

/// Scan the local USB buses.
pub async fn scan(opts: &UsbOptions) -> Result<DeviceList> {
    scan_sysfs(Path::new(SYSFS_USB_ROOT), opts.link_detail)
}

fn scan_sysfs(root: &Path, detail: LinkDetail) -> Result<DeviceList> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(root = %root.display(), "no USB sysfs tree on this system");
            return Ok(DeviceList::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut names: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        // entries with a ':' are interfaces, not devices
        .filter(|name| !name.contains(':'))
        .collect();
    names.sort();

    let mut devices = DeviceList::new();
    for name in names {
        let dir = root.join(&name);
        let Some(vendor_id) = read_attr(&dir, "idVendor") else {
            continue;
        };
        let Some((_, vendor_name)) = UPS_VENDORS
            .iter()
            .find(|(id, _)| id.eq_ignore_ascii_case(&vendor_id))
        else {
            debug!(device = %name, vendor = %vendor_id, "not a known UPS vendor");
            continue;
        };
        devices.push(device_from_sysfs(&dir, &name, &vendor_id, vendor_name, detail));
    }
    Ok(devices)
}

fn device_from_sysfs(
    dir: &Path,
    name: &str,
    vendor_id: &str,
    vendor_name: &str,
    detail: LinkDetail,
) -> Device {
    let mut device = Device::new(ScanKind::Usb, "usbhid-ups", "auto")
        .with_attr("vendorid", vendor_id)
        .with_attr("vendor", vendor_name);
    if let Some(product_id) = read_attr(dir, "idProduct") {
        device = device.with_attr("productid", product_id);
    }
    if let Some(product) = read_attr(dir, "product") {
        device = device.with_attr("product", product);
    }
    if let Some(serial) = read_attr(dir, "serial") {
        device = device.with_attr("serial", serial);
    }

    // Topology identity is change-prone; only emit what was asked for.
    if detail.level() >= 1 {
        if let Some(bus) = read_attr(dir, "busnum") {
            device = device.with_attr("bus", bus);
        }
        let busport = name.rsplit('.').next().unwrap_or(name);
        device = device.with_attr("busport", busport);
    }
    if detail.level() >= 2 {
        if let Some(devnum) = read_attr(dir, "devnum") {
            device = device.with_attr("device", devnum);
        }
    }
    if detail.level() >= 3 {
        if let Some(bcd) = read_attr(dir, "bcdDevice") {
            device = device.with_attr("bcddevice", bcd);
        }
    }
    device
}

fn read_attr(dir: &Path, attr: &str) -> Option<String> {
    fs::read_to_string(dir.join(attr))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_device(root: &Path, name: &str, attrs: &[(&str, &str)]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for (attr, value) in attrs {
            fs::write(dir.join(attr), format!("{value}\n")).unwrap();
        }
    }

    fn detail(bumps: u8) -> LinkDetail {
        let mut d = LinkDetail::default();
        for _ in 0..bumps {
            d.bump();
        }
        d
    }

    fn attr<'a>(device: &'a Device, key: &str) -> Option<&'a str> {
        device
            .attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn finds_known_vendor_and_skips_others() {
        let tmp = TempDir::new().unwrap();
        fake_device(
            tmp.path(),
            "1-1",
            &[
                ("idVendor", "0463"),
                ("idProduct", "ffff"),
                ("product", "Eaton 5PX"),
                ("serial", "G202D12345"),
            ],
        );
        fake_device(tmp.path(), "1-2", &[("idVendor", "dead"), ("idProduct", "beef")]);
        // interface entries must be ignored even with a matching vendor
        fake_device(tmp.path(), "1-1:1.0", &[("idVendor", "0463")]);

        let devices = scan_sysfs(tmp.path(), LinkDetail::default()).unwrap();
        assert_eq!(devices.len(), 1);
        let device = &devices[0];
        assert_eq!(device.driver, "usbhid-ups");
        assert_eq!(device.port, "auto");
        assert_eq!(attr(device, "vendorid"), Some("0463"));
        assert_eq!(attr(device, "vendor"), Some("MGE UPS Systems"));
        assert_eq!(attr(device, "product"), Some("Eaton 5PX"));
        assert_eq!(attr(device, "serial"), Some("G202D12345"));
        assert_eq!(attr(device, "bus"), None);
    }

    #[test]
    fn link_detail_levels_add_topology_attributes() {
        let tmp = TempDir::new().unwrap();
        fake_device(
            tmp.path(),
            "2-1.4",
            &[
                ("idVendor", "051d"),
                ("busnum", "2"),
                ("devnum", "7"),
                ("bcdDevice", "0106"),
            ],
        );

        // one -U: level 0, nothing extra
        let devices = scan_sysfs(tmp.path(), detail(1)).unwrap();
        assert_eq!(attr(&devices[0], "bus"), None);

        // two -U: bus and busport
        let devices = scan_sysfs(tmp.path(), detail(2)).unwrap();
        assert_eq!(attr(&devices[0], "bus"), Some("2"));
        assert_eq!(attr(&devices[0], "busport"), Some("4"));
        assert_eq!(attr(&devices[0], "device"), None);

        // three -U: device number too
        let devices = scan_sysfs(tmp.path(), detail(3)).unwrap();
        assert_eq!(attr(&devices[0], "device"), Some("7"));
        assert_eq!(attr(&devices[0], "bcddevice"), None);

        // four or more -U saturate at full detail
        let devices = scan_sysfs(tmp.path(), detail(9)).unwrap();
        assert_eq!(attr(&devices[0], "bcddevice"), Some("0106"));
    }

    #[test]
    fn missing_sysfs_tree_is_an_empty_result() {
        let tmp = TempDir::new().unwrap();
        let gone = tmp.path().join("no-such-tree");
        let devices = scan_sysfs(&gone, LinkDetail::default()).unwrap();
        assert!(devices.is_empty());
    }
}
