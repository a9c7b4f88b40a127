//! Rendering discovered devices as ups.conf sections or parsable lines.

use std::fmt::Write;

use powerscan_core::device::{Device, DeviceList, ScanKind};

use crate::runner::ScanReport;

/// Output flavor selected on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// ups.conf sections with sanity-check comments.
    #[default]
    UpsConfSanity,
    /// Plain ups.conf sections.
    UpsConf,
    /// One machine-parsable line per device.
    Parsable,
}

impl OutputFormat {
    /// Render every bus of the report, in canonical order. Buses that
    /// found nothing render as nothing.
    pub fn render(self, report: &ScanReport) -> String {
        let mut out = String::new();
        for kind in ScanKind::ALL {
            let devices = report.devices(kind);
            match self {
                OutputFormat::UpsConfSanity => render_ups_conf(&mut out, kind, devices, true),
                OutputFormat::UpsConf => render_ups_conf(&mut out, kind, devices, false),
                OutputFormat::Parsable => render_parsable(&mut out, devices),
            }
        }
        out
    }
}

fn section_name(kind: ScanKind, ordinal: usize) -> String {
    format!("nutdev-{}{}", kind.bus(), ordinal)
}

fn render_ups_conf(out: &mut String, kind: ScanKind, devices: &DeviceList, sanity: bool) {
    for (i, device) in devices.iter().enumerate() {
        let name = section_name(kind, i + 1);
        if sanity {
            for warning in sanity_warnings(kind, devices, i) {
                let _ = writeln!(out, "# WARNING: {warning}");
            }
        }
        let _ = writeln!(out, "[{name}]");
        let _ = writeln!(out, "\tdriver = \"{}\"", device.driver);
        let _ = writeln!(out, "\tport = \"{}\"", device.port);
        for (key, value) in &device.attributes {
            let _ = writeln!(out, "\t{key} = \"{value}\"");
        }
        let _ = writeln!(out);
    }
}

/// Issues worth a comment above a section: a missing port, or another
/// device in the same bus list that resolved to the same driver and port.
fn sanity_warnings(kind: ScanKind, devices: &DeviceList, index: usize) -> Vec<String> {
    let device = &devices[index];
    let mut warnings = Vec::new();
    if device.port.is_empty() {
        warnings.push("no port value was found for this device".to_string());
    }
    for (other_index, other) in devices.iter().enumerate() {
        if other_index != index
            && other.driver == device.driver
            && other.port == device.port
            && !device.port.is_empty()
        {
            warnings.push(format!(
                "same driver and port as \"{}\", please check for duplicates",
                section_name(kind, other_index + 1)
            ));
            break;
        }
    }
    warnings
}

fn render_parsable(out: &mut String, devices: &DeviceList) {
    for device in devices {
        let _ = write!(
            out,
            "driver=\"{}\",port=\"{}\"",
            device.driver, device.port
        );
        for (key, value) in &device.attributes {
            let _ = write!(out, ",{key}=\"{value}\"");
        }
        out.push('\n');
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use powerscan_core::device::Device;

    fn report_with(devices: Vec<Device>) -> ScanReport {
        let mut report = ScanReport::default();
        for device in devices {
            report.results[device.kind.index()].push(device);
        }
        report
    }

    #[test]
    fn ups_conf_sections_in_canonical_order() {
        let report = report_with(vec![
            Device::new(ScanKind::Snmp, "snmp-ups", "192.0.2.1").with_attr("community", "public"),
            Device::new(ScanKind::Usb, "usbhid-ups", "auto").with_attr("vendorid", "0463"),
        ]);
        let rendered = OutputFormat::UpsConf.render(&report);
        assert_eq!(
            rendered,
            "[nutdev-usb1]\n\
             \tdriver = \"usbhid-ups\"\n\
             \tport = \"auto\"\n\
             \tvendorid = \"0463\"\n\
             \n\
             [nutdev-snmp1]\n\
             \tdriver = \"snmp-ups\"\n\
             \tport = \"192.0.2.1\"\n\
             \tcommunity = \"public\"\n\
             \n"
        );
    }

    #[test]
    fn sanity_format_flags_duplicates() {
        let report = report_with(vec![
            Device::new(ScanKind::OldNut, "nutclient", "ups@192.0.2.1:3493"),
            Device::new(ScanKind::OldNut, "nutclient", "ups@192.0.2.1:3493"),
        ]);
        let rendered = OutputFormat::UpsConfSanity.render(&report);
        assert!(rendered.contains(
            "# WARNING: same driver and port as \"nutdev-nut2\", please check for duplicates\n[nutdev-nut1]"
        ));
        assert!(rendered.contains(
            "# WARNING: same driver and port as \"nutdev-nut1\", please check for duplicates\n[nutdev-nut2]"
        ));
    }

    #[test]
    fn sanity_format_flags_missing_port() {
        let report = report_with(vec![Device::new(ScanKind::Serial, "blazer_ser", "")]);
        let rendered = OutputFormat::UpsConfSanity.render(&report);
        assert!(rendered.contains("# WARNING: no port value was found for this device"));
    }

    #[test]
    fn parsable_lines() {
        let report = report_with(vec![
            Device::new(ScanKind::Usb, "usbhid-ups", "auto")
                .with_attr("vendorid", "051d")
                .with_attr("productid", "0002"),
        ]);
        let rendered = OutputFormat::Parsable.render(&report);
        assert_eq!(
            rendered,
            "driver=\"usbhid-ups\",port=\"auto\",vendorid=\"051d\",productid=\"0002\"\n"
        );
    }

    #[test]
    fn empty_report_renders_nothing() {
        let report = ScanReport::default();
        assert_eq!(OutputFormat::UpsConfSanity.render(&report), "");
        assert_eq!(OutputFormat::Parsable.render(&report), "");
    }
}
