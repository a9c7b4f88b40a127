//! Service-discovery probe: one-shot mDNS query for advertised NUT servers.
//!
//! Sends a PTR question for `_nut._tcp.local` to the mDNS multicast group
//! with the unicast-response bit set and collects answers until the common
//! timeout runs out.

use std::net::IpAddr;

use dns_parser::{Builder, Packet, QueryClass, QueryType, RData};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

use powerscan_core::device::{Device, DeviceList, ScanKind};

use crate::error::{ProbeError, Result};
use crate::ProbeContext;

pub const SERVICE_NAME: &str = "_nut._tcp.local";
const MDNS_GROUP: (&str, u16) = ("224.0.0.251", 5353);

/// Query the local network for advertised NUT services.
pub async fn scan(ctx: &ProbeContext) -> Result<DeviceList> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let query = build_query()?;
    socket.send_to(&query, MDNS_GROUP).await?;
    debug!(service = SERVICE_NAME, "mDNS query sent");

    let deadline = Instant::now() + ctx.timeout;
    let mut devices = DeviceList::new();
    let mut buf = [0u8; 4096];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, peer))) => devices.extend(devices_from_reply(peer.ip(), &buf[..n])),
            Ok(Err(e)) => {
                warn!(error = %e, "mDNS receive failed");
                break;
            }
            Err(_) => break, // collection window over
        }
    }
    Ok(devices)
}

fn build_query() -> Result<Vec<u8>> {
    let mut builder = Builder::new_query(0, false);
    builder.add_question(SERVICE_NAME, true, QueryType::PTR, QueryClass::IN);
    builder
        .build()
        .map_err(|_| ProbeError::QueryBuild("mDNS question does not fit one packet".into()))
}

/// Extract advertised service instances from one answer datagram.
fn devices_from_reply(peer: IpAddr, data: &[u8]) -> DeviceList {
    let packet = match Packet::parse(data) {
        Ok(packet) => packet,
        Err(e) => {
            debug!(%peer, error = %e, "ignoring unparsable mDNS datagram");
            return DeviceList::new();
        }
    };

    // SRV records carry the concrete host:port a PTR instance points at.
    let srv = packet
        .answers
        .iter()
        .chain(packet.additional.iter())
        .find_map(|record| match &record.data {
            RData::SRV(srv) => Some((srv.target.to_string(), srv.port)),
            _ => None,
        });

    let mut devices = DeviceList::new();
    for answer in packet.answers.iter().chain(packet.additional.iter()) {
        let RData::PTR(ptr) = &answer.data else {
            continue;
        };
        if !answer.name.to_string().starts_with("_nut._tcp") {
            continue;
        }
        let port = match &srv {
            Some((host, port)) => format!("{host}:{port}"),
            None => peer.to_string(),
        };
        devices.push(
            Device::new(ScanKind::Avahi, "nutclient", port)
                .with_attr("service", ptr.0.to_string()),
        );
    }
    devices
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_carries_the_service_question() {
        let query = build_query().unwrap();
        let packet = Packet::parse(&query).unwrap();
        assert_eq!(packet.questions.len(), 1);
        let question = &packet.questions[0];
        assert_eq!(question.qname.to_string(), SERVICE_NAME);
        assert_eq!(question.qtype, QueryType::PTR);
        assert!(question.prefer_unicast);
    }

    #[test]
    fn garbage_replies_yield_nothing() {
        let peer: IpAddr = "192.0.2.5".parse().unwrap();
        assert!(devices_from_reply(peer, b"").is_empty());
        assert!(devices_from_reply(peer, b"\x00\x01\x02").is_empty());
        // our own query holds no answers
        let query = build_query().unwrap();
        assert!(devices_from_reply(peer, &query).is_empty());
    }
}
