//! Node configuration extraction and process-level settings

use crate::errors::ConfigError;
use crate::models::{Configuration, ProtocolVersion};
use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_STS_URL: &str = "https://login.microsoftonline.com/extSTS.srf";

/// The seven text fields as they appear in the host configuration document.
/// A field is `None` when its element is absent or carries no text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFields {
    pub site: Option<String>,
    pub docs: Option<String>,
    pub version: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub filespec: Option<String>,
    pub save_path: Option<String>,
}

impl RawFields {
    /// Read the direct children of the root element. Unknown elements are ignored
    /// and the first occurrence of a field wins.
    pub fn from_xml(xml: &str) -> Result<Self, ConfigError> {
        let mut reader = Reader::from_str(xml);
        let mut fields = RawFields::default();
        let mut depth = 0usize;
        let mut current: Option<String> = None;
        let mut text = String::new();

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    depth += 1;
                    if depth == 2 {
                        current = Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                        text.clear();
                    }
                }
                Ok(Event::Text(ref e)) if depth == 2 && current.is_some() => {
                    let unescaped = e
                        .unescape()
                        .map_err(|err| ConfigError::Xml(err.to_string()))?;
                    text.push_str(&unescaped);
                }
                Ok(Event::CData(e)) if depth == 2 && current.is_some() => {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
                Ok(Event::End(_)) => {
                    if depth == 2 {
                        if let Some(name) = current.take() {
                            fields.set(&name, std::mem::take(&mut text));
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(ConfigError::Xml(format!(
                        "error at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {}
            }
        }

        Ok(fields)
    }

    fn set(&mut self, name: &str, value: String) {
        let slot = match name {
            "site" => &mut self.site,
            "docs" => &mut self.docs,
            "version" => &mut self.version,
            "username" => &mut self.username,
            "password" => &mut self.password,
            "filespec" => &mut self.filespec,
            "save_path" => &mut self.save_path,
            _ => return,
        };
        if slot.is_none() && !value.is_empty() {
            *slot = Some(value);
        }
    }

    /// Validate into a [`Configuration`].
    ///
    /// The password is decrypted first, whenever the field is present. A failed
    /// or empty decryption counts as a missing password. Fields are then checked
    /// in a fixed order and the first failure is returned.
    pub fn into_configuration<F>(self, decrypt: F) -> Result<Configuration, ConfigError>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        let password = self
            .password
            .as_deref()
            .and_then(decrypt)
            .filter(|p| !p.is_empty());

        let site = self.site.ok_or(ConfigError::MissingSite)?;
        let docs = self.docs.ok_or(ConfigError::MissingDocs)?;
        let version = self.version.ok_or(ConfigError::MissingVersion)?;
        let username = self.username.ok_or(ConfigError::MissingUsername)?;
        let password = password.ok_or(ConfigError::MissingPassword)?;
        let filespec = self.filespec.ok_or(ConfigError::MissingFilespec)?;
        let save_path = PathBuf::from(self.save_path.ok_or(ConfigError::MissingSavePath)?);

        if !save_path.exists() {
            return Err(ConfigError::SavePathNotFound);
        }

        debug!("Configuration validated for site {}", site);

        Ok(Configuration {
            site,
            docs,
            version: ProtocolVersion::from_flag(&version),
            username,
            password,
            filespec,
            save_path,
        })
    }
}

/// Process-level settings shared by every node run
#[derive(Debug, Clone)]
pub struct Settings {
    /// User agent sent with every request
    pub user_agent: String,
    /// Request timeout in seconds. `None` leaves the HTTP stack default in place.
    pub timeout_seconds: Option<u64>,
    /// Security token service used for Office 365 sign-in
    pub sts_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_seconds: None,
            sts_url: DEFAULT_STS_URL.to_string(),
        }
    }
}

fn default_user_agent() -> String {
    format!("sharepoint-dl/{}", env!("CARGO_PKG_VERSION"))
}

impl Settings {
    /// Load settings from environment variables and defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<L>(lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        Ok(Settings {
            user_agent: lookup("SPDL_USER_AGENT").unwrap_or_else(default_user_agent),
            timeout_seconds: parse_var(&lookup, "SPDL_HTTP_TIMEOUT_SECONDS")?,
            sts_url: lookup("SPDL_STS_URL").unwrap_or_else(|| DEFAULT_STS_URL.to_string()),
        })
    }

    /// Get HTTP timeout as Duration
    pub fn http_timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

/// Helper function to parse a variable as a specific type
fn parse_var<T, L>(lookup: &L, var_name: &str) -> Result<Option<T>>
where
    L: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display + Send + Sync + std::error::Error + 'static,
{
    match lookup(var_name) {
        Some(val) => val.parse().map(Some).with_context(|| {
            format!("Failed to parse environment variable {} = '{}'", var_name, val)
        }),
        None => Ok(None),
    }
}

/// Read a node configuration document from disk
pub fn read_node_xml(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read node configuration: {}", path.display()))
}
