//! Protocol kinds and discovered-device records.

use std::fmt;

/// The fixed set of protocol buses a scan run can cover, in dispatch,
/// join and report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanKind {
    Usb,
    Snmp,
    XmlHttp,
    OldNut,
    Simulation,
    Avahi,
    Ipmi,
    Serial,
}

impl ScanKind {
    /// Every kind, in the canonical order.
    pub const ALL: [ScanKind; 8] = [
        ScanKind::Usb,
        ScanKind::Snmp,
        ScanKind::XmlHttp,
        ScanKind::OldNut,
        ScanKind::Simulation,
        ScanKind::Avahi,
        ScanKind::Ipmi,
        ScanKind::Serial,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Position in the canonical order, usable as an array index.
    pub fn index(self) -> usize {
        match self {
            ScanKind::Usb => 0,
            ScanKind::Snmp => 1,
            ScanKind::XmlHttp => 2,
            ScanKind::OldNut => 3,
            ScanKind::Simulation => 4,
            ScanKind::Avahi => 5,
            ScanKind::Ipmi => 6,
            ScanKind::Serial => 7,
        }
    }

    /// Human-readable bus name for log and report output.
    pub fn label(self) -> &'static str {
        match self {
            ScanKind::Usb => "USB",
            ScanKind::Snmp => "SNMP",
            ScanKind::XmlHttp => "XML/HTTP",
            ScanKind::OldNut => "NUT",
            ScanKind::Simulation => "NUT simulation",
            ScanKind::Avahi => "Avahi",
            ScanKind::Ipmi => "IPMI",
            ScanKind::Serial => "serial",
        }
    }

    /// Short tag used when generating configuration section names.
    pub fn bus(self) -> &'static str {
        match self {
            ScanKind::Usb => "usb",
            ScanKind::Snmp => "snmp",
            ScanKind::XmlHttp => "xml",
            ScanKind::OldNut => "nut",
            ScanKind::Simulation => "sim",
            ScanKind::Avahi => "avahi",
            ScanKind::Ipmi => "ipmi",
            ScanKind::Serial => "serial",
        }
    }

    /// Whether the probe for this kind walks the IP range registry.
    pub fn range_scoped(self) -> bool {
        matches!(
            self,
            ScanKind::Snmp | ScanKind::XmlHttp | ScanKind::OldNut | ScanKind::Ipmi
        )
    }

    /// Whether the probe has a useful target even without any ranges
    /// (broadcast discovery or a local device node).
    pub fn has_default_target(self) -> bool {
        matches!(self, ScanKind::XmlHttp | ScanKind::Ipmi)
    }
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Requested verbosity for change-prone USB topology identity attributes.
///
/// Starts unset; each bump raises the level by one, saturating at
/// [`LinkDetail::MAX`]. The first bump lands on level zero, so a single
/// request changes nothing but marks the knob as touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkDetail(Option<u8>);

impl LinkDetail {
    pub const MAX: u8 = 3;

    pub fn bump(&mut self) {
        self.0 = Some(match self.0 {
            None => 0,
            Some(level) => (level + 1).min(Self::MAX),
        });
    }

    pub fn level(self) -> u8 {
        self.0.unwrap_or(0)
    }
}

/// One discovered device candidate: the driver that can talk to it, the
/// port string that reaches it, and any extra configuration attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub kind: ScanKind,
    pub driver: String,
    pub port: String,
    pub attributes: Vec<(String, String)>,
}

impl Device {
    pub fn new(kind: ScanKind, driver: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            kind,
            driver: driver.into(),
            port: port.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }
}

pub type DeviceList = Vec<Device>;

/// Append `found` to `acc`, preserving both orders. Never deduplicates;
/// merging with an empty list is the identity.
pub fn merge(mut acc: DeviceList, found: DeviceList) -> DeviceList {
    acc.extend(found);
    acc
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_order_matches_indices() {
        for (i, kind) in ScanKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
        assert_eq!(ScanKind::COUNT, 8);
    }

    #[test]
    fn range_scoped_kinds() {
        let scoped: Vec<_> = ScanKind::ALL
            .iter()
            .copied()
            .filter(|k| k.range_scoped())
            .collect();
        assert_eq!(
            scoped,
            vec![
                ScanKind::Snmp,
                ScanKind::XmlHttp,
                ScanKind::OldNut,
                ScanKind::Ipmi
            ]
        );
        assert!(ScanKind::XmlHttp.has_default_target());
        assert!(ScanKind::Ipmi.has_default_target());
        assert!(!ScanKind::Snmp.has_default_target());
    }

    #[test]
    fn merge_appends_in_order() {
        let a = vec![Device::new(ScanKind::Usb, "usbhid-ups", "auto")];
        let b = vec![
            Device::new(ScanKind::Usb, "usbhid-ups", "auto").with_attr("vendorid", "0463"),
            Device::new(ScanKind::Usb, "usbhid-ups", "auto").with_attr("vendorid", "051d"),
        ];
        let merged = merge(a.clone(), b.clone());
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0], a[0]);
        assert_eq!(merged[1], b[0]);
        assert_eq!(merged[2], b[1]);
    }

    #[test]
    fn merge_with_empty_is_identity() {
        let a = vec![Device::new(ScanKind::Snmp, "snmp-ups", "192.0.2.1")];
        assert_eq!(merge(a.clone(), Vec::new()), a);
        assert_eq!(merge(Vec::new(), a.clone()), a);
    }

    #[test]
    fn link_detail_saturates() {
        let mut detail = LinkDetail::default();
        assert_eq!(detail.level(), 0);
        detail.bump();
        assert_eq!(detail.level(), 0);
        detail.bump();
        assert_eq!(detail.level(), 1);
        for _ in 0..10 {
            detail.bump();
        }
        assert_eq!(detail.level(), LinkDetail::MAX);
    }

}
