//! powerscan: discover network- and bus-attached power devices.

mod cli;
mod config;
mod report;
mod runner;

use std::time::Duration;

use anyhow::bail;
use clap::{CommandFactory, FromArgMatches};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use powerscan_core::device::{LinkDetail, ScanKind};
use powerscan_probes as probes;
use powerscan_probes::ipmi::IpmiOptions;
use powerscan_probes::oldnut::OldNutOptions;
use powerscan_probes::snmp::SnmpOptions;

use crate::cli::Cli;
use crate::config::Defaults;
use crate::report::OutputFormat;
use crate::runner::ScanOptions;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    init_logging(cli.quiet, cli.debug);

    if cli.available {
        print_available();
        return Ok(());
    }
    check_capabilities(&cli)?;

    let defaults = config::load("powerscan");
    let registry = cli::build_registry(cli::range_tokens(&cli, &matches))?;
    let opts = scan_options(&cli, &defaults);
    let format = output_format(&cli);

    let scan_report = runner::run(opts, registry).await;
    print!("{}", format.render(&scan_report));
    Ok(())
}

/// Results go to stdout; everything the subscriber emits goes to stderr.
fn init_logging(quiet: bool, debug: u8) {
    let level = match debug {
        0 if quiet => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// List the buses this build can scan, one per line.
fn print_available() {
    println!("OLDNUT");
    for (kind, tag) in [
        (ScanKind::Usb, "USB"),
        (ScanKind::Snmp, "SNMP"),
        (ScanKind::XmlHttp, "XML"),
        (ScanKind::Avahi, "AVAHI"),
        (ScanKind::Ipmi, "IPMI"),
        (ScanKind::Serial, "EATON_SERIAL"),
    ] {
        if probes::available(kind) {
            println!("{tag}");
        }
    }
}

/// Reject protocol-specific options whose bus cannot be scanned by this
/// build before any work starts.
fn check_capabilities(cli: &Cli) -> anyhow::Result<()> {
    let snmp_opts_used = cli.community.is_some()
        || cli.sec_level.is_some()
        || cli.sec_name.is_some()
        || cli.auth_password.is_some()
        || cli.priv_password.is_some()
        || cli.auth_protocol.is_some()
        || cli.priv_protocol.is_some();
    let ipmi_opts_used = cli.username.is_some()
        || cli.password.is_some()
        || cli.auth_type.is_some()
        || cli.cipher_suite_id.is_some();

    let checks = [
        (cli.usb_scan > 0, ScanKind::Usb, "-U/--usb-scan"),
        (cli.snmp_scan, ScanKind::Snmp, "-S/--snmp-scan"),
        (snmp_opts_used, ScanKind::Snmp, "SNMP options"),
        (cli.xml_scan, ScanKind::XmlHttp, "-M/--xml-scan"),
        (cli.avahi_scan, ScanKind::Avahi, "-A/--avahi-scan"),
        (cli.ipmi_scan, ScanKind::Ipmi, "-I/--ipmi-scan"),
        (ipmi_opts_used, ScanKind::Ipmi, "IPMI options"),
        (
            cli.eaton_serial.is_some(),
            ScanKind::Serial,
            "-E/--eaton-serial",
        ),
    ];
    for (used, kind, what) in checks {
        if used && !probes::available(kind) {
            bail!("{what} requires {kind} scan support, which this build does not have");
        }
    }
    Ok(())
}

/// Which buses the flags select; nothing selected means a complete scan
/// (every bus except serial, which always needs explicit ports).
fn allowed_kinds(cli: &Cli) -> ([bool; ScanKind::COUNT], LinkDetail) {
    let mut link_detail = LinkDetail::default();
    for _ in 0..cli.usb_scan {
        link_detail.bump();
    }

    let mut allowed = [false; ScanKind::COUNT];
    allowed[ScanKind::Usb.index()] = cli.usb_scan > 0;
    allowed[ScanKind::Snmp.index()] = cli.snmp_scan;
    allowed[ScanKind::XmlHttp.index()] = cli.xml_scan;
    allowed[ScanKind::OldNut.index()] = cli.oldnut_scan;
    allowed[ScanKind::Simulation.index()] = cli.nut_simulation_scan;
    allowed[ScanKind::Avahi.index()] = cli.avahi_scan;
    allowed[ScanKind::Ipmi.index()] = cli.ipmi_scan;
    allowed[ScanKind::Serial.index()] = cli.eaton_serial.is_some();

    if cli.complete_scan || allowed.iter().all(|requested| !requested) {
        for kind in ScanKind::ALL {
            if kind != ScanKind::Serial {
                allowed[kind.index()] = true;
            }
        }
    }
    (allowed, link_detail)
}

fn scan_options(cli: &Cli, defaults: &Defaults) -> ScanOptions {
    let (allowed, link_detail) = allowed_kinds(cli);
    ScanOptions {
        allowed,
        timeout: parse_timeout(cli.timeout.as_deref(), defaults.timeout_secs),
        max_tasks: parse_thread_ceiling(cli.thread.as_deref()).or(defaults.max_tasks),
        link_detail,
        snmp: SnmpOptions {
            community: cli
                .community
                .clone()
                .or_else(|| Some(defaults.community.clone())),
            sec_level: cli.sec_level.clone(),
            sec_name: cli.sec_name.clone(),
            auth_password: cli.auth_password.clone(),
            priv_password: cli.priv_password.clone(),
            auth_protocol: cli.auth_protocol.clone(),
            priv_protocol: cli.priv_protocol.clone(),
        },
        ipmi: IpmiOptions {
            username: cli.username.clone().or_else(|| defaults.ipmi_username.clone()),
            password: cli.password.clone().or_else(|| defaults.ipmi_password.clone()),
            auth_type: cli.auth_type.clone(),
            cipher_suite_id: cli.cipher_suite_id,
        },
        xml: Default::default(),
        oldnut: OldNutOptions {
            port: cli.port.unwrap_or(defaults.oldnut_port),
        },
        serial_ports: cli.eaton_serial.clone(),
    }
}

/// Lenient timeout parsing: anything not a positive integer falls back to
/// the default with a warning.
fn parse_timeout(arg: Option<&str>, default_secs: u64) -> Duration {
    match arg.map(str::parse::<i64>) {
        None => Duration::from_secs(default_secs),
        Some(Ok(secs)) if secs > 0 => Duration::from_secs(secs as u64),
        Some(_) => {
            warn!(default = default_secs, "illegal timeout value, using default");
            Duration::from_secs(default_secs)
        }
    }
}

/// Lenient ceiling parsing: anything not a positive integer means "use the
/// computed default", with a warning.
fn parse_thread_ceiling(arg: Option<&str>) -> Option<usize> {
    match arg.map(str::parse::<i64>) {
        None => None,
        Some(Ok(n)) if n > 0 => Some(n as usize),
        Some(_) => {
            warn!("illegal connection ceiling value, using default");
            None
        }
    }
}

fn output_format(cli: &Cli) -> OutputFormat {
    if cli.disp_parsable {
        OutputFormat::Parsable
    } else if cli.disp_nut_conf {
        OutputFormat::UpsConf
    } else {
        OutputFormat::UpsConfSanity
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
