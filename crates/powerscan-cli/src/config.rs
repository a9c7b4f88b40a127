//! Layered scan defaults: optional `powerscan.toml` plus `POWERSCAN__`
//! environment variables. Command-line flags always win over these.

use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct Defaults {
    /// Network operation timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Ceiling on concurrently open scanning connections.
    #[serde(default)]
    pub max_tasks: Option<usize>,

    /// SNMP v1 community string.
    #[serde(default = "default_community")]
    pub community: String,

    /// Port of remote NUT data servers.
    #[serde(default = "default_oldnut_port")]
    pub oldnut_port: u16,

    /// IPMI credentials.
    #[serde(default)]
    pub ipmi_username: Option<String>,
    #[serde(default)]
    pub ipmi_password: Option<String>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_community() -> String {
    "public".to_string()
}

fn default_oldnut_port() -> u16 {
    3493
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_tasks: None,
            community: default_community(),
            oldnut_port: default_oldnut_port(),
            ipmi_username: None,
            ipmi_password: None,
        }
    }
}

/// Load defaults from `<name>.toml` (if present) and the environment.
/// Anything unreadable falls back to the built-ins.
pub fn load(name: &str) -> Defaults {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(name).required(false))
        .add_source(
            config::Environment::with_prefix("POWERSCAN")
                .separator("__")
                .try_parsing(true),
        );

    match builder.build().and_then(|cfg| cfg.try_deserialize()) {
        Ok(defaults) => defaults,
        Err(e) => {
            debug!(error = %e, "no usable defaults source, using built-ins");
            Defaults::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────
