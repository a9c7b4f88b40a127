//! IPMI probe: RMCP/ASF presence pings against BMC management LANs, or the
//! local IPMI device node when no ranges were requested.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

use powerscan_core::device::{Device, DeviceList, ScanKind};
use powerscan_core::range::AddressRange;

use crate::error::Result;
use crate::ProbeContext;

pub const DEFAULT_PORT: u16 = 623;

/// RMCP Presence Ping (ASF message type 0x80, IANA enterprise 4542).
const ASF_PING: [u8; 12] = [
    0x06, 0x00, 0xff, 0x06, 0x00, 0x00, 0x11, 0xbe, 0x80, 0x00, 0x00, 0x00,
];

/// ASF message type of a Presence Pong, at offset 8 of the RMCP header.
const ASF_PONG_TYPE: u8 = 0x40;

const LOCAL_NODES: &[&str] = &["/dev/ipmi0", "/dev/ipmi/0", "/dev/ipmidev/0"];

#[derive(Debug, Clone, Default)]
pub struct IpmiOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_type: Option<String>,
    pub cipher_suite_id: Option<i32>,
}

/// Scan BMCs over the given range, or the local device without one.
pub async fn scan(
    opts: &IpmiOptions,
    range: Option<&AddressRange>,
    ctx: &ProbeContext,
) -> Result<DeviceList> {
    match range {
        None => Ok(local_probe()),
        Some(range) => lan_scan(opts, range, ctx).await,
    }
}

/// Look for a local IPMI device node.
fn local_probe() -> DeviceList {
    for node in LOCAL_NODES {
        if Path::new(node).exists() {
            debug!(%node, "local IPMI device node present");
            return vec![Device::new(ScanKind::Ipmi, "nut-ipmipsu", "id0")];
        }
    }
    DeviceList::new()
}

async fn lan_scan(
    opts: &IpmiOptions,
    range: &AddressRange,
    ctx: &ProbeContext,
) -> Result<DeviceList> {
    let mut tasks = JoinSet::new();
    for addr in range.hosts() {
        let permit = ctx.gate.acquire().await;
        let dur = ctx.timeout;
        tasks.spawn(async move {
            let found = ping_bmc(addr, dur).await;
            drop(permit);
            found
        });
    }

    let mut devices = DeviceList::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(addr)) => {
                let mut device = Device::new(ScanKind::Ipmi, "nut-ipmipsu", addr.to_string());
                for (key, value) in section_attributes(opts) {
                    device = device.with_attr(key, value);
                }
                devices.push(device);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "IPMI ping task failed"),
        }
    }
    Ok(devices)
}

async fn ping_bmc(addr: IpAddr, dur: Duration) -> Option<IpAddr> {
    let bind = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind).await.ok()?;
    socket.connect((addr, DEFAULT_PORT)).await.ok()?;
    socket.send(&ASF_PING).await.ok()?;

    let mut buf = [0u8; 256];
    let n = timeout(dur, socket.recv(&mut buf)).await.ok()?.ok()?;
    if is_pong(&buf[..n]) {
        debug!(%addr, "BMC answered presence ping");
        Some(addr)
    } else {
        None
    }
}

fn is_pong(data: &[u8]) -> bool {
    data.len() >= 12 && data.get(8) == Some(&ASF_PONG_TYPE)
}

fn section_attributes(opts: &IpmiOptions) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    if let Some(v) = &opts.username {
        attrs.push(("username".into(), v.clone()));
    }
    if let Some(v) = &opts.password {
        attrs.push(("password".into(), v.clone()));
    }
    if let Some(v) = &opts.auth_type {
        attrs.push(("authType".into(), v.clone()));
    }
    if let Some(v) = opts.cipher_suite_id {
        attrs.push(("cipher_suite_id".into(), v.to_string()));
    }
    attrs
}

// ── Tests ────────────────────────────────────────────────────────────────
