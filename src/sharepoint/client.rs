//! reqwest-backed SharePoint REST client

use super::types::{FolderInfo, ODataCollection, ODataEnvelope, ODATA_VERBOSE};
use super::{office365, ClientError, Credential, DocumentStore, NtlmCredential, RemoteFolder, RemoteSite};
use crate::config::Settings;
use crate::models::FileEntry;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

pub struct SharePointClient {
    http: Client,
    /// Separate client for sign-in: the cookie-issuing response is a redirect
    /// that must not be followed.
    sign_in_http: Client,
    sts_url: String,
}

impl SharePointClient {
    pub fn new(settings: &Settings) -> Result<Self, ClientError> {
        let mut builder = Client::builder()
            .user_agent(&settings.user_agent)
            .pool_max_idle_per_host(1);
        let mut sign_in_builder = Client::builder()
            .user_agent(&settings.user_agent)
            .redirect(reqwest::redirect::Policy::none());

        if let Some(timeout) = settings.http_timeout() {
            builder = builder.timeout(timeout);
            sign_in_builder = sign_in_builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            sign_in_http: sign_in_builder.build()?,
            sts_url: settings.sts_url.clone(),
        })
    }
}

#[async_trait]
impl DocumentStore for SharePointClient {
    async fn sign_in(
        &self,
        root_url: &str,
        username: &str,
        password: &str,
    ) -> Result<Credential, ClientError> {
        office365::sign_in(&self.sign_in_http, &self.sts_url, root_url, username, password)
            .await
            .map(Credential::Cookies)
    }

    fn ntlm_credential(&self, username: &str, password: &str) -> Result<Credential, ClientError> {
        NtlmCredential::new(username, password).map(Credential::Ntlm)
    }

    async fn open_site(
        &self,
        site_url: &str,
        credential: Credential,
    ) -> Result<Box<dyn RemoteSite>, ClientError> {
        let session = Arc::new(Session {
            http: self.http.clone(),
            credential,
        });
        let url = site_url.trim_end_matches('/').to_string();

        session.get(&format!("{}/_api/web", url)).await?;
        debug!("Opened site {}", url);

        Ok(Box::new(Site { session, url }))
    }
}

/// An authenticated HTTP session, shared by the site and its folders
struct Session {
    http: Client,
    credential: Credential,
}

impl Session {
    /// GET with the credential attached; non-success statuses are errors.
    async fn get(&self, url: &str) -> Result<Response, ClientError> {
        let response = match &self.credential {
            Credential::Cookies(cookies) => {
                self.http
                    .get(url)
                    .header(ACCEPT, ODATA_VERBOSE)
                    .header(COOKIE, cookies.header_value())
                    .send()
                    .await?
            }
            Credential::Ntlm(ntlm) => ntlm.get(&self.http, url, ODATA_VERBOSE).await?,
        };

        if !response.status().is_success() {
            return Err(ClientError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ClientError> {
        let body = self.get(url).await?.text().await?;
        let envelope: ODataEnvelope<T> = serde_json::from_str(&body)?;
        Ok(envelope.d)
    }
}

struct Site {
    session: Arc<Session>,
    url: String,
}

#[async_trait]
impl RemoteSite for Site {
    async fn open_folder(&self, path: &str) -> Result<Box<dyn RemoteFolder>, ClientError> {
        let api_url = format!(
            "{}/_api/web/GetFolderByServerRelativeUrl('{}')",
            self.url,
            encode_server_path(path)
        );
        let info: FolderInfo = self.session.get_json(&api_url).await?;
        debug!("Opened folder {}", info.server_relative_url);

        Ok(Box::new(Folder {
            session: Arc::clone(&self.session),
            site_url: self.url.clone(),
            api_url,
            server_relative_url: info.server_relative_url,
        }))
    }
}

struct Folder {
    session: Arc<Session>,
    site_url: String,
    api_url: String,
    server_relative_url: String,
}

#[async_trait]
impl RemoteFolder for Folder {
    async fn files(&self) -> Result<Vec<FileEntry>, ClientError> {
        let listing: ODataCollection<FileEntry> =
            self.session.get_json(&format!("{}/Files", self.api_url)).await?;
        Ok(listing.results)
    }

    async fn get_file(&self, name: &str) -> Result<Vec<u8>, ClientError> {
        let file_path = format!("{}/{}", self.server_relative_url.trim_end_matches('/'), name);
        let url = format!(
            "{}/_api/web/GetFileByServerRelativeUrl('{}')/$value",
            self.site_url,
            encode_server_path(&file_path)
        );
        let bytes = self.session.get(&url).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Quote a server-relative path for use inside an OData string literal.
/// Single quotes are doubled and each segment is percent-encoded.
pub(crate) fn encode_server_path(path: &str) -> String {
    path.replace('\'', "''")
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
