//! Herd configuration.
//!
//! A single TOML file, read once at startup, describes the whole herd: the
//! port map, the (possibly asymmetric) adjacency lists, and the Places API
//! credentials. Runtime changes are out of scope — every daemon in the herd
//! is expected to load the same file.
//!
//! ```toml
//! api_key = "..."
//!
//! [ports]
//! Bailey   = 10000
//! Bona     = 10001
//!
//! [neighbors]
//! Bailey = ["Bona"]
//! Bona   = ["Bailey"]
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_places_url() -> String {
    "https://places.googleapis.com/v1/places:searchNearby".to_string()
}

// Bounds the WHATSAT round-trip; the daemon makes a single attempt.
fn default_http_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct HerdConfig {
    /// Host every daemon binds to and connects to. The herd runs on one
    /// machine behind a proxy, hence the loopback default.
    #[serde(default = "default_host")]
    pub host: String,
    /// Places API key, injected into every search request.
    pub api_key: String,
    /// Places endpoint. Overridable so tests can point at a stub.
    #[serde(default = "default_places_url")]
    pub places_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Daemon name → TCP port.
    pub ports: HashMap<String, u16>,
    /// Daemon name → names it pushes gossip to. Not required to be
    /// symmetric; a name absent here simply has no outgoing edges.
    #[serde(default)]
    pub neighbors: HashMap<String, Vec<String>>,
}

impl HerdConfig {
    /// Load and parse the configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: HerdConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    pub fn port_of(&self, name: &str) -> Option<u16> {
        self.ports.get(name).copied()
    }

    pub fn neighbors_of(&self, name: &str) -> &[String] {
        self.neighbors.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All configured daemon names, sorted — for the usage message.
    pub fn server_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.ports.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
