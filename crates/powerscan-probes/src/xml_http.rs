//! NetXML probe: UDP discovery of XML/HTTP network management cards.
//!
//! Cards answer a `<SCAN_REQUEST/>` datagram on their management port with a
//! `<PRODUCT_INFO>` document describing the product and its HTTP endpoint.
//! Without ranges the request is broadcast; with ranges every address is
//! queried individually.

use std::net::IpAddr;
use std::time::Duration;

use serde::Deserialize;
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use powerscan_core::device::{Device, DeviceList, ScanKind};
use powerscan_core::range::AddressRange;

use crate::error::Result;
use crate::ProbeContext;

pub const DEFAULT_UDP_PORT: u16 = 4679;
pub const DEFAULT_HTTP_PORT: u16 = 80;

const SCAN_REQUEST: &[u8] = b"<SCAN_REQUEST/>";

#[derive(Debug, Clone)]
pub struct XmlHttpOptions {
    pub udp_port: u16,
    pub http_port: u16,
}

impl Default for XmlHttpOptions {
    fn default() -> Self {
        Self {
            udp_port: DEFAULT_UDP_PORT,
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProductInfo {
    #[serde(rename = "@name")]
    name: Option<String>,
    #[serde(rename = "@type")]
    product_type: Option<String>,
    #[serde(rename = "@version")]
    version: Option<String>,
}

/// Discover NetXML cards, broadcast without ranges, unicast per address
/// otherwise.
pub async fn scan(
    opts: &XmlHttpOptions,
    range: Option<&AddressRange>,
    ctx: &ProbeContext,
) -> Result<DeviceList> {
    match range {
        None => broadcast_scan(opts, ctx).await,
        Some(range) => unicast_scan(opts, range, ctx).await,
    }
}

async fn broadcast_scan(opts: &XmlHttpOptions, ctx: &ProbeContext) -> Result<DeviceList> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;
    socket
        .send_to(SCAN_REQUEST, ("255.255.255.255", opts.udp_port))
        .await?;
    debug!(port = opts.udp_port, "broadcast NetXML scan request sent");

    let deadline = Instant::now() + ctx.timeout;
    let mut devices = DeviceList::new();
    let mut buf = [0u8; 2048];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, peer))) => {
                if let Some(device) = device_from_reply(peer.ip(), &buf[..n], opts.http_port) {
                    devices.push(device);
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "NetXML broadcast receive failed");
                break;
            }
            Err(_) => break, // collection window over
        }
    }
    Ok(devices)
}

async fn unicast_scan(
    opts: &XmlHttpOptions,
    range: &AddressRange,
    ctx: &ProbeContext,
) -> Result<DeviceList> {
    let mut tasks = JoinSet::new();
    for addr in range.hosts() {
        let permit = ctx.gate.acquire().await;
        let udp_port = opts.udp_port;
        let http_port = opts.http_port;
        let dur = ctx.timeout;
        tasks.spawn(async move {
            let found = query_card(addr, udp_port, http_port, dur).await;
            drop(permit);
            found
        });
    }

    let mut devices = DeviceList::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(device)) => devices.push(device),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "NetXML query task failed"),
        }
    }
    Ok(devices)
}

async fn query_card(addr: IpAddr, udp_port: u16, http_port: u16, dur: Duration) -> Option<Device> {
    let bind = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind).await.ok()?;
    socket.connect((addr, udp_port)).await.ok()?;
    socket.send(SCAN_REQUEST).await.ok()?;
    let mut buf = [0u8; 2048];
    let n = timeout(dur, socket.recv(&mut buf)).await.ok()?.ok()?;
    device_from_reply(addr, &buf[..n], http_port)
}

/// Turn one answer datagram into a device candidate, if it parses.
fn device_from_reply(peer: IpAddr, data: &[u8], http_port: u16) -> Option<Device> {
    let text = std::str::from_utf8(data).ok()?;
    let info: ProductInfo = match quick_xml::de::from_str(text) {
        Ok(info) => info,
        Err(e) => {
            debug!(%peer, error = %e, "ignoring non-NetXML datagram");
            return None;
        }
    };

    let port = if http_port == DEFAULT_HTTP_PORT {
        format!("http://{peer}")
    } else {
        format!("http://{peer}:{http_port}")
    };
    let mut device = Device::new(ScanKind::XmlHttp, "netxml-ups", port);
    let desc: Vec<String> = [&info.name, &info.product_type, &info.version]
        .into_iter()
        .flatten()
        .cloned()
        .collect();
    if !desc.is_empty() {
        device = device.with_attr("desc", desc.join(" "));
    }
    Some(device)
}

// ── Tests ────────────────────────────────────────────────────────────────
