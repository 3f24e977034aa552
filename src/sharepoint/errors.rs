//! Client-level error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Security token service returned a fault: {0}")]
    Fault(String),

    #[error("Sign-in response did not contain a security token")]
    MissingToken,

    #[error("Sign-in response did not set the {0} cookie")]
    MissingCookie(&'static str),

    #[error("Invalid site URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Unexpected response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Refusing to save remote file with unsafe name '{0}'")]
    UnsafeFileName(String),

    #[error("NTLM error: {0}")]
    Ntlm(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
