//! Probe dispatch, per-range aggregation, and the ordered join phase.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use powerscan_core::device::{merge, DeviceList, LinkDetail, ScanKind};
use powerscan_core::gate::ScanGate;
use powerscan_core::range::{AddressRange, RangeRegistry};
use powerscan_probes::ipmi::IpmiOptions;
use powerscan_probes::oldnut::OldNutOptions;
use powerscan_probes::snmp::SnmpOptions;
use powerscan_probes::usb::UsbOptions;
use powerscan_probes::xml_http::XmlHttpOptions;
use powerscan_probes::{self as probes, ProbeContext};

/// Everything one scan run needs: which buses to cover, the shared timeout
/// and connection ceiling, and the per-protocol options.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub allowed: [bool; ScanKind::COUNT],
    pub timeout: Duration,
    pub max_tasks: Option<usize>,
    pub link_detail: LinkDetail,
    pub snmp: SnmpOptions,
    pub ipmi: IpmiOptions,
    pub xml: XmlHttpOptions,
    pub oldnut: OldNutOptions,
    pub serial_ports: Option<String>,
}

impl ScanOptions {
    pub fn allows(&self, kind: ScanKind) -> bool {
        self.allowed[kind.index()]
    }
}

/// Dispatch decision for one protocol kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// One probe call per registered range, aggregated in registry order.
    RunRanges,
    /// One probe call against the protocol's default target (broadcast
    /// discovery or a local device).
    RunDefault,
    /// One probe call; the protocol does not walk ranges.
    RunOnce,
    SkipNotRequested,
    SkipUnavailable,
    SkipNoRanges,
}

/// Decide how `kind` is dispatched. Pure; the inputs capture the whole
/// decision surface.
pub fn plan(kind: ScanKind, allowed: bool, available: bool, range_count: usize) -> Disposition {
    if !allowed {
        return Disposition::SkipNotRequested;
    }
    if !available {
        return Disposition::SkipUnavailable;
    }
    if !kind.range_scoped() {
        return Disposition::RunOnce;
    }
    if range_count == 0 {
        if kind.has_default_target() {
            Disposition::RunDefault
        } else {
            Disposition::SkipNoRanges
        }
    } else {
        Disposition::RunRanges
    }
}

/// Result of one run: one device list per protocol kind, dispatched or not.
#[derive(Debug)]
pub struct ScanReport {
    pub results: [DeviceList; ScanKind::COUNT],
}

impl Default for ScanReport {
    fn default() -> Self {
        Self {
            results: std::array::from_fn(|_| DeviceList::new()),
        }
    }
}

impl ScanReport {
    pub fn devices(&self, kind: ScanKind) -> &DeviceList {
        &self.results[kind.index()]
    }

    pub fn total(&self) -> usize {
        self.results.iter().map(Vec::len).sum()
    }
}

/// Run every requested probe concurrently and join in canonical order.
pub async fn run(opts: ScanOptions, registry: RangeRegistry) -> ScanReport {
    let run_id = Uuid::new_v4();
    let gate = Arc::new(ScanGate::sized(opts.max_tasks));
    let registry = Arc::new(registry);
    let opts = Arc::new(opts);
    info!(
        %run_id,
        ranges = registry.len(),
        gate = gate.limit(),
        "starting scan run"
    );

    let mut handles: Vec<(ScanKind, Option<JoinHandle<DeviceList>>)> = Vec::new();
    for kind in ScanKind::ALL {
        let disposition = plan(
            kind,
            opts.allows(kind),
            probes::available(kind),
            registry.len(),
        );
        match disposition {
            Disposition::SkipNotRequested => {
                debug!(bus = %kind, "not requested, skipped");
                handles.push((kind, None));
            }
            Disposition::SkipUnavailable => {
                info!(bus = %kind, "scan support not available in this build, skipped");
                handles.push((kind, None));
            }
            Disposition::SkipNoRanges => {
                info!(bus = %kind, "no IP ranges requested, skipped");
                handles.push((kind, None));
            }
            Disposition::RunRanges | Disposition::RunDefault | Disposition::RunOnce => {
                info!(bus = %kind, "scanning bus");
                let handle = tokio::spawn(run_probe(
                    kind,
                    disposition,
                    opts.clone(),
                    registry.clone(),
                    gate.clone(),
                ));
                handles.push((kind, Some(handle)));
            }
        }
    }

    let mut report = ScanReport::default();
    for (kind, handle) in handles {
        let Some(handle) = handle else { continue };
        match handle.await {
            Ok(devices) => {
                debug!(bus = %kind, found = devices.len(), "probe finished");
                report.results[kind.index()] = devices;
            }
            Err(e) => {
                error!(bus = %kind, error = %e, "probe task failed, reporting nothing for this bus");
            }
        }
    }
    info!(%run_id, found = report.total(), "scan run done");
    report
}

async fn run_probe(
    kind: ScanKind,
    disposition: Disposition,
    opts: Arc<ScanOptions>,
    registry: Arc<RangeRegistry>,
    gate: Arc<ScanGate>,
) -> DeviceList {
    let ctx = ProbeContext {
        timeout: opts.timeout,
        gate,
    };
    match disposition {
        Disposition::RunRanges => {
            let mut acc = DeviceList::new();
            for range in registry.iter() {
                debug!(bus = %kind, range = %range, "scanning range");
                let found = probe_once(kind, &opts, Some(range), &ctx).await;
                acc = merge(acc, found);
            }
            acc
        }
        Disposition::RunDefault | Disposition::RunOnce => {
            probe_once(kind, &opts, None, &ctx).await
        }
        _ => DeviceList::new(),
    }
}

async fn probe_once(
    kind: ScanKind,
    opts: &ScanOptions,
    range: Option<&AddressRange>,
    ctx: &ProbeContext,
) -> DeviceList {
    let result = match kind {
        ScanKind::Usb => {
            let usb = UsbOptions {
                link_detail: opts.link_detail,
            };
            probes::usb::scan(&usb).await
        }
        ScanKind::Snmp => match range {
            Some(range) => probes::snmp::scan(&opts.snmp, range, ctx).await,
            None => Ok(DeviceList::new()),
        },
        ScanKind::XmlHttp => probes::xml_http::scan(&opts.xml, range, ctx).await,
        ScanKind::OldNut => match range {
            Some(range) => probes::oldnut::scan(&opts.oldnut, range, ctx).await,
            None => Ok(DeviceList::new()),
        },
        ScanKind::Simulation => probes::simulation::scan().await,
        ScanKind::Avahi => probes::avahi::scan(ctx).await,
        ScanKind::Ipmi => probes::ipmi::scan(&opts.ipmi, range, ctx).await,
        ScanKind::Serial => match &opts.serial_ports {
            Some(ports) => probes::serial::scan(ports).await,
            None => Ok(DeviceList::new()),
        },
    };
    match result {
        Ok(devices) => devices,
        Err(e) => {
            warn!(bus = %kind, error = %e, "probe failed");
            DeviceList::new()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
