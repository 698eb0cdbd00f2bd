use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Deserialize;

pub const DEFAULT_ALLOWED_PROTOCOLS: &str = "http,https,mailto";
pub const DEFAULT_CREATE_WARNING: &str = "Your post has been rejected by the Link Filter.";
pub const DEFAULT_EDIT_WARNING: &str = "Your edit has been rejected by the Link Filter.";

// ---------------------------------------------------------------------------
// ConfigFile — deserialized from TOML (all fields optional)
// ---------------------------------------------------------------------------

/// A protocol list written either as a TOML array or as one
/// comma-separated string (`"http, https, mailto"`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ProtocolList {
    Csv(String),
    Items(Vec<String>),
}

impl ProtocolList {
    pub fn into_protocols(self) -> Vec<String> {
        match self {
            ProtocolList::Csv(s) => split_protocol_list(&s),
            ProtocolList::Items(items) => crate::policy::trim_protocols(items.as_slice()),
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub reject_plain_links: Option<bool>,
    pub allowed_protocols_embedded: Option<ProtocolList>,
    pub allowed_protocols_plain: Option<ProtocolList>,
    pub rewrite_protocols: Option<ProtocolList>,
    #[serde(default)]
    pub warnings: WarningsConfigFile,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct WarningsConfigFile {
    pub create: Option<String>,
    pub edit: Option<String>,
}

// ---------------------------------------------------------------------------
// FilterConfig — resolved (all fields concrete)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    /// When false, plain links are never checked against the plain allow-list.
    pub reject_plain_links: bool,
    pub allowed_protocols_embedded: Vec<String>,
    pub allowed_protocols_plain: Vec<String>,
    /// Plain links with these schemes are escaped instead of rejected.
    pub rewrite_protocols: Vec<String>,
    pub create_warning_message: String,
    pub edit_warning_message: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            reject_plain_links: false,
            allowed_protocols_embedded: split_protocol_list(DEFAULT_ALLOWED_PROTOCOLS),
            allowed_protocols_plain: split_protocol_list(DEFAULT_ALLOWED_PROTOCOLS),
            rewrite_protocols: Vec::new(),
            create_warning_message: DEFAULT_CREATE_WARNING.into(),
            edit_warning_message: DEFAULT_EDIT_WARNING.into(),
        }
    }
}

/// Split a comma-separated protocol setting, trimming and dropping empties.
pub fn split_protocol_list(list: &str) -> Vec<String> {
    let parts: Vec<&str> = list.split(',').collect();
    crate::policy::trim_protocols(parts.as_slice())
}

/// Command-line values that override the config file.
///
/// Kept separately so a reloaded config file can have the same overrides
/// applied again.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub reject_plain_links: Option<bool>,
    pub allow_embedded: Option<String>,
    pub allow_plain: Option<String>,
    pub rewrite: Option<String>,
}

impl ConfigFile {
    /// Merge CLI values (overwrites non-None fields).
    pub fn merge_cli(&mut self, cli: &CliOverrides) {
        if let Some(v) = cli.reject_plain_links {
            debug!("config: CLI override reject_plain_links={v}");
            self.reject_plain_links = Some(v);
        }
        if let Some(v) = &cli.allow_embedded {
            debug!("config: CLI override allowed_protocols_embedded={v}");
            self.allowed_protocols_embedded = Some(ProtocolList::Csv(v.clone()));
        }
        if let Some(v) = &cli.allow_plain {
            debug!("config: CLI override allowed_protocols_plain={v}");
            self.allowed_protocols_plain = Some(ProtocolList::Csv(v.clone()));
        }
        if let Some(v) = &cli.rewrite {
            debug!("config: CLI override rewrite_protocols={v}");
            self.rewrite_protocols = Some(ProtocolList::Csv(v.clone()));
        }
    }

    /// Resolve to a FilterConfig by applying defaults to missing fields.
    pub fn resolve(self) -> FilterConfig {
        let defaults = FilterConfig::default();
        let config = FilterConfig {
            reject_plain_links: self.reject_plain_links.unwrap_or(defaults.reject_plain_links),
            allowed_protocols_embedded: self
                .allowed_protocols_embedded
                .map(ProtocolList::into_protocols)
                .unwrap_or(defaults.allowed_protocols_embedded),
            allowed_protocols_plain: self
                .allowed_protocols_plain
                .map(ProtocolList::into_protocols)
                .unwrap_or(defaults.allowed_protocols_plain),
            rewrite_protocols: self
                .rewrite_protocols
                .map(ProtocolList::into_protocols)
                .unwrap_or(defaults.rewrite_protocols),
            create_warning_message: self
                .warnings
                .create
                .unwrap_or(defaults.create_warning_message),
            edit_warning_message: self.warnings.edit.unwrap_or(defaults.edit_warning_message),
        };
        info!(
            "config: resolved reject_plain_links={}, embedded=[{}], plain=[{}], rewrite=[{}]",
            config.reject_plain_links,
            config.allowed_protocols_embedded.join(","),
            config.allowed_protocols_plain.join(","),
            config.rewrite_protocols.join(","),
        );
        config
    }
}

/// Resolve the XDG config path for schemefilter.
pub fn config_path() -> Option<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(config_dir.join("schemefilter").join("config.toml"))
}

/// Load a config file.
///
/// With `explicit` set, that file must exist. Otherwise the XDG path is
/// tried and a missing file yields `ConfigFile::default()`. A file that
/// exists but cannot be parsed is always an error.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<ConfigFile> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match config_path() {
            Some(p) => p,
            None => {
                info!("config: no HOME or XDG_CONFIG_HOME set, using defaults");
                return Ok(ConfigFile::default());
            }
        },
    };
    debug!("config: looking for {}", path.display());
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!("config: loaded from {}", path.display());
            let cfg: ConfigFile = toml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && explicit.is_none() => {
            info!("config: {} not found, using defaults", path.display());
            Ok(ConfigFile::default())
        }
        Err(e) => Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
    }
}
