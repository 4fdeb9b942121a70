use std::path::{Path, PathBuf};

use advmac::MacAddr6;
use serde::Deserialize;

use crate::duid::{DuidType, HardwareType};
use crate::error::ConfigError;
use crate::identity::fqdn::FqdnOp;
use crate::identity::oro::RequestableOption;

/// Host-facing session configuration. Constructed programmatically (the
/// usual path) or loaded from JSON via `load_from_file` for parity with
/// the teacher's file-backed bootstrap. Immutable once the session has
/// been started — see `ConfigError::MutateWhileStarted`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub interface: String,
    pub interface_index: u32,
    pub duid_type: DuidType,
    pub hw_type: HardwareType,
    /// DUID-LLT time field; 0 lets `Duid::create` synthesize one.
    pub duid_time: u32,
    pub mac: MacAddr6,
    pub iaid: u32,
    pub t1: u32,
    pub t2: u32,
    pub rapid_commit: bool,
    /// Whether the IP stack performs Duplicate Address Detection before an
    /// address is considered `Valid` (spec §4.5).
    pub dad_enabled: bool,
    pub requested_options: Vec<RequestableOption>,
    pub fqdn: Option<(String, FqdnOp)>,
    pub persist_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            interface: "eth0".to_string(),
            interface_index: 0,
            duid_type: DuidType::LinkLayerPlusTime,
            hw_type: HardwareType::Ethernet,
            duid_time: 0,
            mac: MacAddr6::new([0, 0, 0, 0, 0, 0]),
            iaid: 1,
            t1: 0,
            t2: 0,
            rapid_commit: false,
            dad_enabled: true,
            requested_options: vec![],
            fqdn: None,
            persist_path: None,
        }
    }
}

/// Loose on-disk shape deserialized before validation into `SessionConfig`,
/// matching the teacher's `ServerConfig`/`Config` split in the original
/// `src/config.rs`.
#[derive(Deserialize)]
struct FileConfig {
    interface: String,
    interface_index: u32,
    mac: MacAddr6,
    #[serde(default)]
    duid_type: Option<String>,
    #[serde(default)]
    duid_time: u32,
    iaid: u32,
    #[serde(default)]
    t1: u32,
    #[serde(default)]
    t2: u32,
    #[serde(default)]
    rapid_commit: bool,
    #[serde(default = "default_true")]
    dad_enabled: bool,
    #[serde(default)]
    requested_options: Vec<String>,
    #[serde(default)]
    fqdn: Option<String>,
    #[serde(default)]
    persist_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

trait PathContext<T> {
    fn context<P: AsRef<Path>>(self, path: P) -> Result<T, ConfigError>;
}

impl<T> PathContext<T> for serde_json::Result<T> {
    fn context<P: AsRef<Path>>(self, path: P) -> Result<T, ConfigError> {
        self.map_err(|e| ConfigError::Parsing { err: e, path: path.as_ref().to_path_buf() })
    }
}

impl<T> PathContext<T> for std::io::Result<T> {
    fn context<P: AsRef<Path>>(self, path: P) -> Result<T, ConfigError> {
        self.map_err(|e| ConfigError::Io { err: e, path: path.as_ref().to_path_buf() })
    }
}

impl SessionConfig {
    /// Load and validate a `SessionConfig` from a JSON file, in the shape
    /// of the teacher's `Config::load_from_files`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<SessionConfig, ConfigError> {
        let file_config: FileConfig =
            serde_json::from_reader(std::fs::File::open(&path).context(&path)?).context(&path)?;

        let duid_type = match file_config.duid_type.as_deref() {
            Some("link_layer_only") => DuidType::LinkLayerOnly,
            _ => DuidType::LinkLayerPlusTime,
        };

        let mut requested_options = Vec::with_capacity(file_config.requested_options.len());
        for name in &file_config.requested_options {
            requested_options.push(match name.as_str() {
                "dns" => RequestableOption::Dns,
                "sntp" => RequestableOption::Sntp,
                "timezone" => RequestableOption::Timezone,
                "domain_name" => RequestableOption::DomainName,
                "fqdn" => RequestableOption::Fqdn,
                other => return Err(ConfigError::UnknownOptionName(other.to_string())),
            });
        }

        Ok(SessionConfig {
            interface: file_config.interface,
            interface_index: file_config.interface_index,
            duid_type,
            hw_type: HardwareType::Ethernet,
            duid_time: file_config.duid_time,
            mac: file_config.mac,
            iaid: file_config.iaid,
            t1: file_config.t1,
            t2: file_config.t2,
            rapid_commit: file_config.rapid_commit,
            dad_enabled: file_config.dad_enabled,
            requested_options,
            fqdn: file_config.fqdn.map(|domain| (domain, FqdnOp::ClientPerformsUpdate)),
            persist_path: file_config.persist_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_iaid() {
        let config = SessionConfig::default();
        assert_ne!(config.iaid, 0);
    }
}
