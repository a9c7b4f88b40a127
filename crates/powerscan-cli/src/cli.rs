//! Command-line surface and the order-preserving collection of range
//! options into the range registry.

use std::net::IpAddr;

use anyhow::Context;
use clap::{ArgAction, ArgMatches, Parser};
use tracing::warn;

use powerscan_core::range::{AddressRange, PendingRange, RangeRegistry};
use powerscan_core::subnet::{self, AutoScope};

#[derive(Parser, Debug)]
#[command(
    name = "powerscan",
    version,
    about = "Scan for available power devices on attached buses and networks"
)]
pub struct Cli {
    /// Network operation timeout in seconds.
    #[arg(short = 't', long, value_name = "SECONDS")]
    pub timeout: Option<String>,

    /// Ceiling on concurrently open scanning connections.
    #[arg(short = 'T', long = "thread", value_name = "MAX")]
    pub thread: Option<String>,

    /// First address of a scan range; may be repeated.
    #[arg(short = 's', long = "start-ip", value_name = "IP")]
    pub start_ip: Vec<IpAddr>,

    /// Last address of a scan range; may be repeated.
    #[arg(short = 'e', long = "end-ip", value_name = "IP")]
    pub end_ip: Vec<IpAddr>,

    /// Subnet to scan as CIDR, or auto/auto4/auto6 for connected subnets.
    #[arg(short = 'm', long = "mask-cidr", value_name = "CIDR")]
    pub mask_cidr: Vec<String>,

    /// SNMP v1 community string (default "public").
    #[arg(short = 'c', long, value_name = "COMMUNITY")]
    pub community: Option<String>,

    /// SNMPv3 security level (noAuthNoPriv, authNoPriv, authPriv).
    #[arg(short = 'l', long = "sec-level", value_name = "LEVEL")]
    pub sec_level: Option<String>,

    /// SNMPv3 security name.
    #[arg(short = 'u', long = "sec-name", value_name = "NAME")]
    pub sec_name: Option<String>,

    /// SNMPv3 authentication passphrase.
    #[arg(short = 'W', long = "auth-password", value_name = "PASSWORD")]
    pub auth_password: Option<String>,

    /// SNMPv3 privacy passphrase.
    #[arg(short = 'X', long = "priv-password", value_name = "PASSWORD")]
    pub priv_password: Option<String>,

    /// SNMPv3 authentication protocol (MD5, SHA, ...).
    #[arg(short = 'w', long = "auth-protocol", value_name = "PROTOCOL")]
    pub auth_protocol: Option<String>,

    /// SNMPv3 privacy protocol (DES, AES, ...).
    #[arg(short = 'x', long = "priv-protocol", value_name = "PROTOCOL")]
    pub priv_protocol: Option<String>,

    /// IPMI username.
    #[arg(short = 'b', long = "username", value_name = "NAME")]
    pub username: Option<String>,

    /// IPMI password.
    #[arg(short = 'B', long = "password", value_name = "PASSWORD")]
    pub password: Option<String>,

    /// IPMI 1.5 authentication type (MD5, none, ...).
    #[arg(short = 'd', long = "auth-type", value_name = "TYPE")]
    pub auth_type: Option<String>,

    /// IPMI 2.0 RMCP+ cipher suite id.
    #[arg(short = 'L', long = "cipher-suite-id", value_name = "ID")]
    pub cipher_suite_id: Option<i32>,

    /// Port of the remote NUT data server to probe.
    #[arg(short = 'p', long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Serial ports to check, comma-separated.
    #[arg(short = 'E', long = "eaton-serial", value_name = "PORTS")]
    pub eaton_serial: Option<String>,

    /// Scan all supported buses (default when nothing is selected).
    #[arg(short = 'C', long = "complete-scan")]
    pub complete_scan: bool,

    /// Scan USB devices; repeat to report more link topology detail.
    #[arg(short = 'U', long = "usb-scan", action = ArgAction::Count)]
    pub usb_scan: u8,

    /// Scan SNMP devices.
    #[arg(short = 'S', long = "snmp-scan")]
    pub snmp_scan: bool,

    /// Scan XML/HTTP devices.
    #[arg(short = 'M', long = "xml-scan")]
    pub xml_scan: bool,

    /// Scan running NUT data servers (old connect method).
    #[arg(short = 'O', long = "oldnut-scan")]
    pub oldnut_scan: bool,

    /// Scan NUT servers advertised over mDNS.
    #[arg(short = 'A', long = "avahi-scan")]
    pub avahi_scan: bool,

    /// Scan NUT simulation device files.
    #[arg(short = 'n', long = "nut-simulation-scan")]
    pub nut_simulation_scan: bool,

    /// Scan IPMI power supplies.
    #[arg(short = 'I', long = "ipmi-scan")]
    pub ipmi_scan: bool,

    /// Display as ups.conf sections with sanity-check comments (default).
    #[arg(short = 'Q', long = "disp-nut-conf-with-sanity-check")]
    pub disp_sanity: bool,

    /// Display as plain ups.conf sections.
    #[arg(short = 'N', long = "disp-nut-conf")]
    pub disp_nut_conf: bool,

    /// Display one machine-parsable line per device.
    #[arg(short = 'P', long = "disp-parsable")]
    pub disp_parsable: bool,

    /// Only report warnings and errors.
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Raise log verbosity; repeat for more.
    #[arg(short = 'D', long = "debug", action = ArgAction::Count)]
    pub debug: u8,

    /// List the buses this build can scan and exit.
    #[arg(short = 'a', long)]
    pub available: bool,
}

/// One `-s`/`-e`/`-m` occurrence, in its original command-line position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeToken {
    Start(IpAddr),
    End(IpAddr),
    Mask(String),
}

/// Reconstruct the command-line order of range options.
///
/// Parsed values keep per-flag order only; the argv indices put the three
/// flags back into one sequence so the pending buffer pairs them the way
/// they were written.
pub fn range_tokens(cli: &Cli, matches: &ArgMatches) -> Vec<RangeToken> {
    let mut tokens: Vec<(usize, RangeToken)> = Vec::new();
    if let Some(indices) = matches.indices_of("start_ip") {
        for (index, addr) in indices.zip(&cli.start_ip) {
            tokens.push((index, RangeToken::Start(*addr)));
        }
    }
    if let Some(indices) = matches.indices_of("end_ip") {
        for (index, addr) in indices.zip(&cli.end_ip) {
            tokens.push((index, RangeToken::End(*addr)));
        }
    }
    if let Some(indices) = matches.indices_of("mask_cidr") {
        for (index, spec) in indices.zip(&cli.mask_cidr) {
            tokens.push((index, RangeToken::Mask(spec.clone())));
        }
    }
    tokens.sort_by_key(|(index, _)| *index);
    tokens.into_iter().map(|(_, token)| token).collect()
}

/// Replay ordered range tokens into a registry.
pub fn build_registry(tokens: Vec<RangeToken>) -> anyhow::Result<RangeRegistry> {
    build_registry_with(tokens, |scope| {
        subnet::auto_detect_ranges(scope).map_err(Into::into)
    })
}

fn build_registry_with(
    tokens: Vec<RangeToken>,
    mut auto_expand: impl FnMut(AutoScope) -> anyhow::Result<Vec<AddressRange>>,
) -> anyhow::Result<RangeRegistry> {
    let mut registry = RangeRegistry::new();
    let mut pending = PendingRange::default();
    let mut auto_done = false;

    for token in tokens {
        match token {
            RangeToken::Start(addr) => pending.set_start(addr, &mut registry),
            RangeToken::End(addr) => pending.set_end(addr, &mut registry),
            RangeToken::Mask(spec) => {
                // a subnet option closes any half-built range first
                pending.flush(&mut registry);
                match AutoScope::parse(&spec) {
                    Some(scope) => {
                        if auto_done {
                            warn!(request = %spec, "connected subnets already requested, ignoring");
                            continue;
                        }
                        auto_done = true;
                        for range in auto_expand(scope)
                            .context("expanding connected subnets")?
                        {
                            registry.push(range);
                        }
                    }
                    None => {
                        registry.push(subnet::cidr_to_range(&spec)?);
                    }
                }
            }
        }
    }
    pending.flush(&mut registry);
    Ok(registry)
}

// ── Tests ────────────────────────────────────────────────────────────────
