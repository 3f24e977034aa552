//! SharePoint document-store client
//!
//! The download routine only talks to the traits defined here: a store that
//! turns credentials into a [`Credential`] and opens sites, a site that opens
//! folders, and a folder that lists and fetches files. [`SharePointClient`] is
//! the reqwest-backed implementation.

pub mod client;
pub mod errors;
pub mod ntlm;
pub mod office365;
mod types;

#[cfg(test)]
pub(crate) mod fake;

pub use client::SharePointClient;
pub use errors::ClientError;
pub use ntlm::NtlmCredential;
pub use office365::AuthCookies;

use crate::models::FileEntry;
use async_trait::async_trait;

/// Proof of identity presented on every site request
#[derive(Debug, Clone)]
pub enum Credential {
    /// Office 365 `FedAuth`/`rtFa` cookies
    Cookies(AuthCookies),
    /// Per-request NTLM handshake
    Ntlm(NtlmCredential),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Exchange a username and password for Office 365 cookies, signing in at
    /// `root_url` (scheme and host only).
    async fn sign_in(
        &self,
        root_url: &str,
        username: &str,
        password: &str,
    ) -> Result<Credential, ClientError>;

    /// Build an NTLM credential. No network traffic happens until the site is opened.
    fn ntlm_credential(&self, username: &str, password: &str) -> Result<Credential, ClientError>;

    /// Open the site at its full URL, verifying the credential is accepted.
    async fn open_site(
        &self,
        site_url: &str,
        credential: Credential,
    ) -> Result<Box<dyn RemoteSite>, ClientError>;
}

#[async_trait]
pub trait RemoteSite: Send + Sync {
    /// Open a folder by its server-relative path
    async fn open_folder(&self, path: &str) -> Result<Box<dyn RemoteFolder>, ClientError>;
}

#[async_trait]
pub trait RemoteFolder: Send + Sync {
    /// Files directly inside the folder, in server order
    async fn files(&self) -> Result<Vec<FileEntry>, ClientError>;

    /// Raw bytes of a file in this folder
    async fn get_file(&self, name: &str) -> Result<Vec<u8>, ClientError>;
}
