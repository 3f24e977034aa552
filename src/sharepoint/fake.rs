//! In-memory document store for tests

use super::{AuthCookies, ClientError, Credential, DocumentStore, NtlmCredential, RemoteFolder, RemoteSite};
use crate::models::FileEntry;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct State {
    files: Vec<(String, Vec<u8>)>,
    fail_sign_in: bool,
    fail_open_site: bool,
    fail_fetch_of: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl State {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeStore {
    state: Arc<State>,
}

impl FakeStore {
    pub fn with_files(files: &[(&str, &[u8])]) -> Self {
        Self {
            state: Arc::new(State {
                files: files
                    .iter()
                    .map(|(name, bytes)| (name.to_string(), bytes.to_vec()))
                    .collect(),
                ..Default::default()
            }),
        }
    }

    fn configure(self, apply: impl FnOnce(&mut State)) -> Self {
        let mut state = Arc::try_unwrap(self.state).unwrap_or_else(|_| panic!("store already shared"));
        apply(&mut state);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn failing_sign_in(self) -> Self {
        self.configure(|s| s.fail_sign_in = true)
    }

    pub fn failing_open_site(self) -> Self {
        self.configure(|s| s.fail_open_site = true)
    }

    pub fn failing_fetch_of(self, name: &str) -> Self {
        let name = name.to_string();
        self.configure(|s| s.fail_fetch_of = Some(name))
    }

    /// Every call made so far, e.g. `sign_in:https://host`
    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().unwrap().clone()
    }
}

fn refused(what: &str) -> ClientError {
    ClientError::Status {
        status: 500,
        url: what.to_string(),
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn sign_in(
        &self,
        root_url: &str,
        _username: &str,
        _password: &str,
    ) -> Result<Credential, ClientError> {
        self.state.record(format!("sign_in:{}", root_url));
        if self.state.fail_sign_in {
            return Err(ClientError::MissingToken);
        }
        Ok(Credential::Cookies(AuthCookies::new("fa", "rt")))
    }

    fn ntlm_credential(&self, username: &str, password: &str) -> Result<Credential, ClientError> {
        self.state.record(format!("ntlm:{}", username));
        NtlmCredential::new(username, password).map(Credential::Ntlm)
    }

    async fn open_site(
        &self,
        site_url: &str,
        credential: Credential,
    ) -> Result<Box<dyn RemoteSite>, ClientError> {
        let kind = match credential {
            Credential::Cookies(_) => "cookies",
            Credential::Ntlm(_) => "ntlm",
        };
        self.state.record(format!("open_site:{}:{}", site_url, kind));
        if self.state.fail_open_site {
            return Err(refused(site_url));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl RemoteSite for FakeStore {
    async fn open_folder(&self, path: &str) -> Result<Box<dyn RemoteFolder>, ClientError> {
        self.state.record(format!("open_folder:{}", path));
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl RemoteFolder for FakeStore {
    async fn files(&self) -> Result<Vec<FileEntry>, ClientError> {
        Ok(self
            .state
            .files
            .iter()
            .map(|(name, _)| FileEntry::named(name.clone()))
            .collect())
    }

    async fn get_file(&self, name: &str) -> Result<Vec<u8>, ClientError> {
        self.state.record(format!("get_file:{}", name));
        if self.state.fail_fetch_of.as_deref() == Some(name) {
            return Err(refused(name));
        }
        self.state
            .files
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| refused(name))
    }
}
