use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Validated node configuration. Built once at initialization and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Configuration {
    pub site: String,
    pub docs: String,
    pub version: ProtocolVersion,
    pub username: String,
    pub password: String,
    pub filespec: String,
    pub save_path: PathBuf,
}

// Keeps the decrypted password out of logs.
impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("site", &self.site)
            .field("docs", &self.docs)
            .field("version", &self.version)
            .field("username", &self.username)
            .field("password", &"********")
            .field("filespec", &self.filespec)
            .field("save_path", &self.save_path)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// NTLM credentials against an on-premises site
    Legacy,
    /// Office 365 token-cookie sign-in
    Modern,
}

impl ProtocolVersion {
    /// Only the literal `365` selects modern authentication.
    pub fn from_flag(flag: &str) -> Self {
        if flag == "365" {
            ProtocolVersion::Modern
        } else {
            ProtocolVersion::Legacy
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ProtocolVersion::Legacy => "legacy",
            ProtocolVersion::Modern => "365",
        }
    }
}

/// One entry of a remote folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ServerRelativeUrl", default)]
    pub server_relative_url: Option<String>,
}

impl FileEntry {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            server_relative_url: None,
        }
    }
}

/// Where and how the credential exchange happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthTarget {
    /// Token exchange against `scheme://host` only.
    Modern { root_url: String },
    /// NTLM credential used against the full configured site URL.
    Legacy { site_url: String },
}
