//! SNMP probe: a single SNMPv1 GET of sysDescr per address over UDP/161.
//!
//! The packet is small and fixed-shape, so the BER encoding is built and
//! read by hand rather than pulling in a full SNMP stack. Security options
//! beyond the community string are not used on the wire; they are forwarded
//! into the emitted configuration attributes.

use std::net::IpAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

use powerscan_core::device::{Device, DeviceList, ScanKind};
use powerscan_core::range::AddressRange;

use crate::error::Result;
use crate::ProbeContext;

pub const DEFAULT_PORT: u16 = 161;
pub const DEFAULT_COMMUNITY: &str = "public";

/// sysDescr.0
const SYSDESCR_OID: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 1, 0];

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_GET_REQUEST: u8 = 0xa0;
const TAG_GET_RESPONSE: u8 = 0xa2;

#[derive(Debug, Clone, Default)]
pub struct SnmpOptions {
    pub community: Option<String>,
    pub sec_level: Option<String>,
    pub sec_name: Option<String>,
    pub auth_password: Option<String>,
    pub priv_password: Option<String>,
    pub auth_protocol: Option<String>,
    pub priv_protocol: Option<String>,
}

impl SnmpOptions {
    fn community(&self) -> &str {
        self.community.as_deref().unwrap_or(DEFAULT_COMMUNITY)
    }
}

/// Scan one address range for SNMP agents.
pub async fn scan(
    opts: &SnmpOptions,
    range: &AddressRange,
    ctx: &ProbeContext,
) -> Result<DeviceList> {
    let mut tasks = JoinSet::new();
    let mut request_id: u32 = 1;
    for addr in range.hosts() {
        let permit = ctx.gate.acquire().await;
        let community = opts.community().to_string();
        let dur = ctx.timeout;
        let id = request_id;
        request_id = request_id.wrapping_add(1);
        tasks.spawn(async move {
            let found = probe_agent(addr, community, id, dur).await;
            drop(permit);
            found
        });
    }

    let mut devices = DeviceList::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(addr)) => devices.push(device_for(addr, opts)),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "SNMP query task failed"),
        }
    }
    Ok(devices)
}

async fn probe_agent(
    addr: IpAddr,
    community: String,
    request_id: u32,
    dur: Duration,
) -> Option<(IpAddr, String)> {
    let bind = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(bind).await.ok()?;
    socket.connect((addr, DEFAULT_PORT)).await.ok()?;
    let request = build_get_request(&community, request_id);
    socket.send(&request).await.ok()?;

    let mut buf = [0u8; 1500];
    let n = timeout(dur, socket.recv(&mut buf)).await.ok()?.ok()?;
    let desc = extract_sysdescr(&buf[..n])?;
    debug!(%addr, sysdescr = %desc, "SNMP agent answered");
    Some((addr, desc))
}

fn device_for(found: (IpAddr, String), opts: &SnmpOptions) -> Device {
    let (addr, desc) = found;
    let mut device =
        Device::new(ScanKind::Snmp, "snmp-ups", addr.to_string()).with_attr("desc", desc);
    for (key, value) in section_attributes(opts) {
        device = device.with_attr(key, value);
    }
    device
}

/// Security attributes emitted into the device section: community for v1,
/// the usmUser parameter set when a v3 security name was given.
fn section_attributes(opts: &SnmpOptions) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    if let Some(sec_name) = &opts.sec_name {
        attrs.push(("snmp_version".into(), "v3".into()));
        attrs.push(("secName".into(), sec_name.clone()));
        if let Some(v) = &opts.sec_level {
            attrs.push(("secLevel".into(), v.clone()));
        }
        if let Some(v) = &opts.auth_password {
            attrs.push(("authPassword".into(), v.clone()));
        }
        if let Some(v) = &opts.priv_password {
            attrs.push(("privPassword".into(), v.clone()));
        }
        if let Some(v) = &opts.auth_protocol {
            attrs.push(("authProtocol".into(), v.clone()));
        }
        if let Some(v) = &opts.priv_protocol {
            attrs.push(("privProtocol".into(), v.clone()));
        }
    } else {
        attrs.push(("community".into(), opts.community().to_string()));
    }
    attrs
}

// ── BER encoding ─────────────────────────────────────────────────────────

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 4);
    out.push(tag);
    if content.len() < 128 {
        out.push(content.len() as u8);
    } else {
        let len_bytes = (content.len() as u32).to_be_bytes();
        let skip = len_bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (len_bytes.len() - skip) as u8);
        out.extend_from_slice(&len_bytes[skip..]);
    }
    out.extend_from_slice(content);
    out
}

/// Minimal two's-complement integer content for a non-negative value.
fn int_content(value: u32) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes
        .iter()
        .take_while(|b| **b == 0)
        .count()
        .min(bytes.len() - 1);
    let mut out = Vec::new();
    if bytes[skip] & 0x80 != 0 {
        out.push(0);
    }
    out.extend_from_slice(&bytes[skip..]);
    out
}

fn oid_content(oid: &[u32]) -> Vec<u8> {
    let mut out = vec![(oid[0] * 40 + oid[1]) as u8];
    for &arc in &oid[2..] {
        let mut chunk = [0u8; 5];
        let mut i = chunk.len();
        let mut v = arc;
        loop {
            i -= 1;
            chunk[i] = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                break;
            }
        }
        for (j, b) in chunk[i..].iter().enumerate() {
            let last = j == chunk.len() - i - 1;
            out.push(if last { *b } else { *b | 0x80 });
        }
    }
    out
}

/// Build an SNMPv1 GetRequest for sysDescr.0.
fn build_get_request(community: &str, request_id: u32) -> Vec<u8> {
    let varbind = tlv(
        TAG_SEQUENCE,
        &[
            tlv(TAG_OID, &oid_content(SYSDESCR_OID)),
            tlv(TAG_NULL, &[]),
        ]
        .concat(),
    );
    let varbind_list = tlv(TAG_SEQUENCE, &varbind);
    let pdu = tlv(
        TAG_GET_REQUEST,
        &[
            tlv(TAG_INTEGER, &int_content(request_id)),
            tlv(TAG_INTEGER, &int_content(0)), // error-status
            tlv(TAG_INTEGER, &int_content(0)), // error-index
            varbind_list,
        ]
        .concat(),
    );
    tlv(
        TAG_SEQUENCE,
        &[
            tlv(TAG_INTEGER, &int_content(0)), // version-1
            tlv(TAG_OCTET_STRING, community.as_bytes()),
            pdu,
        ]
        .concat(),
    )
}

// ── BER reading ──────────────────────────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_tlv(&mut self) -> Option<(u8, &'a [u8])> {
        let tag = *self.buf.get(self.pos)?;
        let first = *self.buf.get(self.pos + 1)?;
        let (len, header) = if first < 0x80 {
            (first as usize, 2)
        } else {
            let n = (first & 0x7f) as usize;
            if n == 0 || n > 4 {
                return None;
            }
            let mut len = 0usize;
            for i in 0..n {
                len = (len << 8) | *self.buf.get(self.pos + 2 + i)? as usize;
            }
            (len, 2 + n)
        };
        let start = self.pos + header;
        let content = self.buf.get(start..start + len)?;
        self.pos = start + len;
        Some((tag, content))
    }
}

/// Pull the sysDescr string out of a GetResponse, if that is what the
/// datagram holds and its error-status is zero.
fn extract_sysdescr(datagram: &[u8]) -> Option<String> {
    let (tag, message) = Reader::new(datagram).read_tlv()?;
    if tag != TAG_SEQUENCE {
        return None;
    }
    let mut message = Reader::new(message);
    let (_, _version) = message.read_tlv()?;
    let (_, _community) = message.read_tlv()?;
    let (tag, pdu) = message.read_tlv()?;
    if tag != TAG_GET_RESPONSE {
        return None;
    }

    let mut pdu = Reader::new(pdu);
    let (_, _request_id) = pdu.read_tlv()?;
    let (_, error_status) = pdu.read_tlv()?;
    if error_status.iter().any(|b| *b != 0) {
        return None;
    }
    let (_, _error_index) = pdu.read_tlv()?;
    let (tag, varbind_list) = pdu.read_tlv()?;
    if tag != TAG_SEQUENCE {
        return None;
    }

    let (tag, varbind) = Reader::new(varbind_list).read_tlv()?;
    if tag != TAG_SEQUENCE {
        return None;
    }
    let mut varbind = Reader::new(varbind);
    let (_, _oid) = varbind.read_tlv()?;
    let (tag, value) = varbind.read_tlv()?;
    if tag != TAG_OCTET_STRING {
        return None;
    }
    Some(String::from_utf8_lossy(value).into_owned())
}

// ── Tests ────────────────────────────────────────────────────────────────
