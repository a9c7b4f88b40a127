//! Probe for running NUT data servers (upsd), using the classic text
//! protocol: connect, ask `LIST UPS`, emit one candidate per advertised UPS.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

use powerscan_core::device::{Device, DeviceList, ScanKind};
use powerscan_core::range::AddressRange;

use crate::error::Result;
use crate::ProbeContext;

pub const DEFAULT_PORT: u16 = 3493;

#[derive(Debug, Clone)]
pub struct OldNutOptions {
    pub port: u16,
}

impl Default for OldNutOptions {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

/// Scan one address range for upsd listeners.
pub async fn scan(
    opts: &OldNutOptions,
    range: &AddressRange,
    ctx: &ProbeContext,
) -> Result<DeviceList> {
    let mut tasks = JoinSet::new();
    for addr in range.hosts() {
        let permit = ctx.gate.acquire().await;
        let port = opts.port;
        let dur = ctx.timeout;
        tasks.spawn(async move {
            let found = query_upsd(addr, port, dur).await;
            drop(permit);
            found
        });
    }

    let mut devices = DeviceList::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(found) => devices.extend(found),
            Err(e) => warn!(error = %e, "upsd query task failed"),
        }
    }
    Ok(devices)
}

async fn query_upsd(addr: IpAddr, port: u16, dur: Duration) -> DeviceList {
    let target = SocketAddr::new(addr, port);
    let stream = match timeout(dur, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            debug!(%target, error = %e, "no upsd listener");
            return DeviceList::new();
        }
        Err(_) => {
            debug!(%target, "upsd connect timed out");
            return DeviceList::new();
        }
    };

    match timeout(dur, list_ups(stream, addr, port)).await {
        Ok(Ok(devices)) => devices,
        Ok(Err(e)) => {
            debug!(%target, error = %e, "upsd session failed");
            DeviceList::new()
        }
        Err(_) => {
            debug!(%target, "upsd session timed out");
            DeviceList::new()
        }
    }
}

async fn list_ups(mut stream: TcpStream, addr: IpAddr, port: u16) -> Result<DeviceList> {
    stream.write_all(b"LIST UPS\n").await?;
    let mut lines = BufReader::new(stream).lines();
    let mut devices = DeviceList::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.starts_with("BEGIN LIST UPS") {
            continue;
        }
        if line.starts_with("END LIST UPS") || line.starts_with("ERR") {
            break;
        }
        if let Some((name, desc)) = parse_ups_line(line) {
            let mut device = Device::new(
                ScanKind::OldNut,
                "nutclient",
                format!("{name}@{addr}:{port}"),
            );
            if !desc.is_empty() {
                device = device.with_attr("desc", desc);
            }
            devices.push(device);
        }
    }
    Ok(devices)
}

/// Parse a `UPS <name> "<description>"` protocol line.
fn parse_ups_line(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("UPS ")?;
    let (name, desc) = match rest.split_once(' ') {
        Some((name, desc)) => (name, desc.trim().trim_matches('"')),
        None => (rest, ""),
    };
    if name.is_empty() {
        return None;
    }
    Some((name, desc))
}

// ── Tests ────────────────────────────────────────────────────────────────
