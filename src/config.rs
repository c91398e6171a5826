//! Configuration (A3): the values spec §9 flags as configuration knobs
//! rather than invariants, plus the fixed TCP mesh table and device paths.
//! Deserializable from a TOML file, matching how the teacher's `serde`
//! stack is used elsewhere in this corpus.

use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use error::{Error, Result};

/// Single-pole low-pass filter size (spec §9 Open Question 3). The source
/// hard-codes 16 with no justification; this crate treats it as a tunable.
fn default_filter_size() -> usize {
    16
}

/// Odometry left/right pairing window, in seconds (spec §9 Open Question
/// 4). The source hard-codes 50 ms.
fn default_pairing_window_s() -> f64 {
    0.050
}

fn default_vn200_baud() -> u32 {
    57600
}

fn default_kangaroo_baud() -> u32 {
    9600
}

fn default_adsb_baud() -> u32 {
    57600
}

fn default_retry_attempts() -> u32 {
    10_000
}

fn default_retry_interval_ms() -> u64 {
    10
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_filter_size")]
    pub filter_size: usize,

    #[serde(default = "default_pairing_window_s")]
    pub odometry_pairing_window_s: f64,

    #[serde(default = "default_vn200_baud")]
    pub vn200_baud: u32,

    #[serde(default = "default_kangaroo_baud")]
    pub kangaroo_baud: u32,

    #[serde(default = "default_adsb_baud")]
    pub adsb_baud: u32,

    #[serde(default = "default_retry_attempts")]
    pub tcp_retry_attempts: u32,

    #[serde(default = "default_retry_interval_ms")]
    pub tcp_retry_interval_ms: u64,

    /// Peer role name -> fixed `ip:port` mesh address.
    #[serde(default)]
    pub peers: HashMap<String, SocketAddr>,

    /// Serial device path overrides, keyed by logical device name
    /// (`"vn200"`, `"kangaroo"`, `"adsb"`).
    #[serde(default)]
    pub device_paths: HashMap<String, String>,

    /// Peer roles (keys into `peers`) this instance accepts connections
    /// from rather than connects to — i.e. the roles for which this
    /// process plays guidance's side of the mesh (spec §4.12 step 3).
    #[serde(default)]
    pub accept_roles: Vec<String>,

    /// The peer role to wait on for the initial-conditions handshake
    /// (spec §4.12 step 5). `None` for the guidance subsystem itself,
    /// which has no guidance socket to wait on.
    #[serde(default)]
    pub guidance_role: Option<String>,

    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Config {
    pub fn tcp_retry_interval(&self) -> Duration {
        Duration::from_millis(self.tcp_retry_interval_ms)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::Config {
            inner: format!("reading {}: {}", path.display(), e),
        })?;
        toml::from_str(&text).map_err(|e| {
            Error::Config {
                inner: format!("parsing {}: {}", path.display(), e),
            }
            .into()
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            filter_size: default_filter_size(),
            odometry_pairing_window_s: default_pairing_window_s(),
            vn200_baud: default_vn200_baud(),
            kangaroo_baud: default_kangaroo_baud(),
            adsb_baud: default_adsb_baud(),
            tcp_retry_attempts: default_retry_attempts(),
            tcp_retry_interval_ms: default_retry_interval_ms(),
            peers: HashMap::new(),
            device_paths: HashMap::new(),
            accept_roles: Vec::new(),
            guidance_role: None,
            log_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let c = Config::default();
        assert_eq!(c.filter_size, 16);
        assert!((c.odometry_pairing_window_s - 0.050).abs() < 1e-12);
    }

    #[test]
    fn parses_minimal_toml() {
        let toml_text = r#"
            filter_size = 8
            [peers]
            guidance = "127.0.0.1:31400"
        "#;
        let cfg: Config = toml::from_str(toml_text).unwrap();
        assert_eq!(cfg.filter_size, 8);
        assert_eq!(cfg.odometry_pairing_window_s, default_pairing_window_s());
        assert!(cfg.peers.contains_key("guidance"));
    }
}
