//! Error types surfaced by the node

use crate::sharepoint::ClientError;
use thiserror::Error;

/// A required configuration field is missing, or the save directory is absent.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Site URL field cannot be empty.")]
    MissingSite,

    #[error("Documents folder field cannot be empty.")]
    MissingDocs,

    #[error("Version field cannot be empty.")]
    MissingVersion,

    #[error("Username field cannot be empty.")]
    MissingUsername,

    #[error("Password field cannot be empty.")]
    MissingPassword,

    #[error("File specification field cannot be empty.")]
    MissingFilespec,

    #[error("Save location field cannot be empty.")]
    MissingSavePath,

    #[error("Save location does not exist. Create the folder first.")]
    SavePathNotFound,

    #[error("Invalid configuration XML: {0}")]
    Xml(String),
}

/// Failures of the download routine. The messages are deliberately coarse;
/// the client error that caused them is kept as the source.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Unable to authenticate using supplied user name and password.")]
    Authentication {
        #[source]
        source: ClientError,
    },

    #[error("{site} is not a valid site")]
    SiteAccess {
        site: String,
        #[source]
        source: ClientError,
    },

    #[error("Unable to download files from {docs}")]
    Download {
        docs: String,
        #[source]
        source: ClientError,
    },
}
