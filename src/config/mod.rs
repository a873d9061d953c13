//! Configuration file handling: a JSON document at a fixed/overridable
//! path, polled for mtime changes and hot-reloaded by the
//! [`crate::capture::logger::Logger`] worker. Missing keys fall back to
//! defaults, filling gaps in a partially-specified file.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// One entry in an `ignored_*`/`detailed_*` list: either a numeric packet id
/// or a packet's stable name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PacketSelector {
    /// Matches by numeric wire id.
    Id(i32),
    /// Matches by stable packet name (e.g. `"ClientboundPlayerChat"`).
    Name(String),
}

impl PacketSelector {
    /// Whether this selector matches a decoded packet identified by both
    /// its numeric id and stable name.
    pub fn matches(&self, id: i32, name: &str) -> bool {
        match self {
            PacketSelector::Id(selector_id) => *selector_id == id,
            PacketSelector::Name(selector_name) => selector_name == name,
        }
    }
}

/// The four filter lists kept per `(ConnectionState, SimpleOrigin)` pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseFilters {
    /// Clientbound packets not logged at all.
    pub ignored_clientbound: Vec<PacketSelector>,
    /// Serverbound packets not logged at all.
    pub ignored_serverbound: Vec<PacketSelector>,
    /// Clientbound packets logged with a full structured field dump.
    pub detailed_clientbound: Vec<PacketSelector>,
    /// Serverbound packets logged with a full structured field dump.
    pub detailed_serverbound: Vec<PacketSelector>,
}

impl PhaseFilters {
    fn is_ignored(&self, clientbound: bool, id: i32, name: &str) -> bool {
        let list = if clientbound {
            &self.ignored_clientbound
        } else {
            &self.ignored_serverbound
        };
        list.iter().any(|s| s.matches(id, name))
    }

    fn is_detailed(&self, clientbound: bool, id: i32, name: &str) -> bool {
        let list = if clientbound {
            &self.detailed_clientbound
        } else {
            &self.detailed_serverbound
        };
        list.iter().any(|s| s.matches(id, name))
    }
}

/// The proxy's JSON configuration document. All fields default when
/// absent from the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `host[:port]` of the real upstream server.
    #[serde(rename = "ServerAddress")]
    pub server_address: String,
    /// Port the proxy accepts real clients on.
    #[serde(rename = "LocalPort")]
    pub local_port: u16,
    /// Enable the text log sink.
    #[serde(rename = "LogToTxtFile")]
    pub log_to_txt_file: bool,
    /// Enable the self-describing binary capture sink.
    #[serde(rename = "LogToBinFile")]
    pub log_to_bin_file: bool,
    /// Enable the console sink.
    #[serde(rename = "LogToConsole")]
    pub log_to_console: bool,
    /// Enable `.mcpr` replay recording.
    #[serde(rename = "LogToReplay")]
    pub log_to_replay: bool,
    /// Append a hex dump to each text/console log line.
    #[serde(rename = "LogRawBytes")]
    pub log_raw_bytes: bool,
    /// Emit the periodic top-10 recap table to the console.
    #[serde(rename = "NetworkRecapToConsole")]
    pub network_recap_to_console: bool,
    /// Require the upstream connection to run in authenticated (online)
    /// mode.
    #[serde(rename = "Online")]
    pub online: bool,
    /// Selects which cached Microsoft/Mojang profile to authenticate as.
    #[serde(rename = "MicrosoftAccountCacheKey")]
    pub microsoft_account_cache_key: Option<String>,
    /// Handshake-state filters.
    #[serde(rename = "Handshaking")]
    pub handshaking: PhaseFilters,
    /// Status-state filters.
    #[serde(rename = "Status")]
    pub status: PhaseFilters,
    /// Login-state filters.
    #[serde(rename = "Login")]
    pub login: PhaseFilters,
    /// Configuration-state filters.
    #[serde(rename = "Configuration")]
    pub configuration: PhaseFilters,
    /// Play-state filters.
    #[serde(rename = "Play")]
    pub play: PhaseFilters,
    /// `host:port` of the recursive resolver used for the `_minecraft._tcp`
    /// SRV lookup. Defaults to `8.8.8.8:53`.
    #[serde(rename = "DnsResolver")]
    pub dns_resolver: String,
    /// Read-idle timeout in seconds before a steady-state
    /// [`crate::net::Connection`] is closed once past its initial handshake.
    #[serde(rename = "ReadIdleTimeoutSecs")]
    pub read_idle_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_address: "localhost:25565".to_string(),
            local_port: 25564,
            log_to_txt_file: true,
            log_to_bin_file: false,
            log_to_console: true,
            log_to_replay: false,
            log_raw_bytes: false,
            network_recap_to_console: false,
            online: true,
            microsoft_account_cache_key: None,
            handshaking: PhaseFilters::default(),
            status: PhaseFilters::default(),
            login: PhaseFilters::default(),
            configuration: PhaseFilters::default(),
            play: PhaseFilters::default(),
            dns_resolver: "8.8.8.8:53".to_string(),
            read_idle_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Loads and parses `path`. Missing keys are filled with defaults by
    /// `#[serde(default)]`; a missing or unparsable file is an error here,
    /// but callers should warn and keep the previous in-memory config
    /// rather than propagating it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RelayError::Config(format!("reading {}: {e}", path.as_ref().display())))?;
        serde_json::from_str(&contents)
            .map_err(|e| RelayError::Config(format!("parsing {}: {e}", path.as_ref().display())))
    }

    /// Looks up the filters for `state`.
    pub fn filters_for(&self, state: crate::proto::ConnectionState) -> &PhaseFilters {
        use crate::proto::ConnectionState::*;
        match state {
            Handshake => &self.handshaking,
            Status => &self.status,
            Login => &self.login,
            Configuration => &self.configuration,
            Play => &self.play,
        }
    }

    /// Whether `(state, clientbound, id, name)` should be skipped by the
    /// text/console sinks entirely.
    pub fn is_ignored(
        &self,
        state: crate::proto::ConnectionState,
        clientbound: bool,
        id: i32,
        name: &str,
    ) -> bool {
        self.filters_for(state).is_ignored(clientbound, id, name)
    }

    /// Whether `(state, clientbound, id, name)` should get a full structured
    /// field dump in the text/console sinks.
    pub fn is_detailed(
        &self,
        state: crate::proto::ConnectionState,
        clientbound: bool,
        id: i32,
        name: &str,
    ) -> bool {
        self.filters_for(state).is_detailed(clientbound, id, name)
    }
}

/// Polls a configuration file's mtime on the cadence the Logger worker
/// drives, and reloads it without losing the log file when it changes. A
/// missing/unparsable file warns and keeps the previous in-memory config.
pub struct ConfigWatcher {
    path: PathBuf,
    current: Config,
    last_mtime: Option<SystemTime>,
}

impl ConfigWatcher {
    /// Loads the initial config from `path`, falling back to defaults (with
    /// a warning) if it cannot be read or parsed.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = Config::load(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "using default configuration");
            Config::default()
        });
        let last_mtime = mtime_of(&path);
        ConfigWatcher {
            path,
            current,
            last_mtime,
        }
    }

    /// The most recently (successfully) loaded configuration.
    pub fn current(&self) -> &Config {
        &self.current
    }

    /// Checks the file's mtime; if it changed, attempts a reload. Returns
    /// `true` if the in-memory config changed as a result. A failed reload
    /// warns and keeps the previous config, never panics.
    pub fn check_reload(&mut self) -> bool {
        let Some(mtime) = mtime_of(&self.path) else {
            return false;
        };
        if Some(mtime) == self.last_mtime {
            return false;
        }
        self.last_mtime = Some(mtime);

        match Config::load(&self.path) {
            Ok(config) => {
                tracing::info!(path = %self.path.display(), "configuration reloaded");
                self.current = config;
                true
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "keeping previous configuration");
                false
            }
        }
    }
}

fn mtime_of(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.local_port, 25564);
        assert!(config.log_to_txt_file);
        assert_eq!(config.dns_resolver, "8.8.8.8:53");
    }

    #[test]
    fn partial_file_keeps_explicit_values() {
        let config: Config =
            serde_json::from_str(r#"{"ServerAddress": "play.example.com", "Online": false}"#)
                .unwrap();
        assert_eq!(config.server_address, "play.example.com");
        assert!(!config.online);
        assert_eq!(config.local_port, 25564);
    }

    #[test]
    fn packet_selector_matches_id_or_name() {
        let by_id = PacketSelector::Id(5);
        let by_name = PacketSelector::Name("ServerboundChat".into());
        assert!(by_id.matches(5, "Anything"));
        assert!(!by_id.matches(6, "Anything"));
        assert!(by_name.matches(99, "ServerboundChat"));
    }
}
