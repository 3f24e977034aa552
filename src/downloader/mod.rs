//! The download routine: authenticate, open the site and documents folder,
//! and copy every file matching the filespec into the save directory.

pub mod filespec;
pub mod site_url;

pub use filespec::FileSpec;
pub use site_url::SiteUrl;

use crate::errors::DownloadError;
use crate::models::{AuthTarget, Configuration, ProtocolVersion};
use crate::sharepoint::{ClientError, Credential, DocumentStore, RemoteSite};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Where credentials are exchanged for a configuration. Modern sign-in only
/// ever sees the scheme and host.
pub fn auth_target(config: &Configuration) -> Result<AuthTarget, ClientError> {
    match config.version {
        ProtocolVersion::Modern => Ok(AuthTarget::Modern {
            root_url: SiteUrl::parse(&config.site)?.root(),
        }),
        ProtocolVersion::Legacy => Ok(AuthTarget::Legacy {
            site_url: config.site.clone(),
        }),
    }
}

/// Download every matching file and return the local paths written, in
/// listing order. `notify` receives the host-facing progress messages.
///
/// Nothing is retried. A failure part-way through the listing discards the
/// paths gathered so far; files already written stay on disk.
pub async fn download<S, N>(
    store: &S,
    config: &Configuration,
    notify: N,
) -> Result<Vec<PathBuf>, DownloadError>
where
    S: DocumentStore + ?Sized,
    N: Fn(&str),
{
    info!("Starting SharePoint download from {}", config.site);

    let credential = authenticate(store, config)
        .await
        .map_err(|source| DownloadError::Authentication { source })?;
    notify("Successfully authenticated");

    let site_access = |source| DownloadError::SiteAccess {
        site: config.site.clone(),
        source,
    };
    let site = store
        .open_site(&config.site, credential)
        .await
        .map_err(site_access)?;
    let site_url = SiteUrl::parse(&config.site).map_err(|e| site_access(e.into()))?;
    notify(&format!("Successfully accessed site {}", config.site));

    let folder_path = site_url.folder_path(&config.docs);
    let downloaded = fetch_matching(site.as_ref(), &folder_path, config)
        .await
        .map_err(|source| DownloadError::Download {
            docs: config.docs.clone(),
            source,
        })?;

    info!("Downloaded {} files from {}", downloaded.len(), folder_path);
    Ok(downloaded)
}

async fn authenticate<S>(store: &S, config: &Configuration) -> Result<Credential, ClientError>
where
    S: DocumentStore + ?Sized,
{
    match auth_target(config)? {
        AuthTarget::Modern { root_url } => {
            debug!("Signing in to Office 365 at {}", root_url);
            store.sign_in(&root_url, &config.username, &config.password).await
        }
        AuthTarget::Legacy { site_url } => {
            debug!("Using NTLM credentials for {}", site_url);
            store.ntlm_credential(&config.username, &config.password)
        }
    }
}

async fn fetch_matching(
    site: &dyn RemoteSite,
    folder_path: &str,
    config: &Configuration,
) -> Result<Vec<PathBuf>, ClientError> {
    let spec = FileSpec::new(&config.filespec);
    let folder = site.open_folder(folder_path).await?;
    let entries = folder.files().await?;
    debug!("Folder {} lists {} files", folder_path, entries.len());

    let mut downloaded = Vec::new();
    for entry in entries {
        if !spec.matches(&entry.name) {
            debug!("Skipping {}", entry.name);
            continue;
        }

        let dest = config.save_path.join(local_name(&entry.name)?);
        let bytes = folder.get_file(&entry.name).await?;
        tokio::fs::write(&dest, &bytes).await?;
        info!("Saved {} ({} bytes)", dest.display(), bytes.len());
        downloaded.push(dest);
    }

    Ok(downloaded)
}

/// A listed name must be a single plain path component to be saved.
fn local_name(name: &str) -> Result<&Path, ClientError> {
    let path = Path::new(name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(path),
        _ => Err(ClientError::UnsafeFileName(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharepoint::fake::FakeStore;
    use std::cell::RefCell;
    use tempfile::TempDir;

    fn config(save_path: &TempDir, version: ProtocolVersion) -> Configuration {
        Configuration {
            site: "https://contoso.sharepoint.com/sites/team".to_string(),
            docs: "Shared Documents".to_string(),
            version,
            username: "u".to_string(),
            password: "p".to_string(),
            filespec: "*.csv".to_string(),
            save_path: save_path.path().to_path_buf(),
        }
    }

    fn sample_store() -> FakeStore {
        FakeStore::with_files(&[
            ("a.csv", &b"1,2"[..]),
            ("b.txt", &b"text"[..]),
            ("c.csv", &b"3,4"[..]),
        ])
    }

    #[tokio::test]
    async fn test_downloads_matching_files_in_listing_order() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, ProtocolVersion::Modern);
        let store = sample_store();

        let paths = download(&store, &config, |_| {}).await.unwrap();

        assert_eq!(paths, vec![dir.path().join("a.csv"), dir.path().join("c.csv")]);
        assert_eq!(std::fs::read(dir.path().join("a.csv")).unwrap(), b"1,2");
        assert_eq!(std::fs::read(dir.path().join("c.csv")).unwrap(), b"3,4");
        assert!(!dir.path().join("b.txt").exists());
    }

    #[tokio::test]
    async fn test_modern_signs_in_at_root_url() {
        let dir = TempDir::new().unwrap();
        let store = sample_store();

        download(&store, &config(&dir, ProtocolVersion::Modern), |_| {})
            .await
            .unwrap();

        let calls = store.calls();
        assert_eq!(calls[0], "sign_in:https://contoso.sharepoint.com");
        assert_eq!(
            calls[1],
            "open_site:https://contoso.sharepoint.com/sites/team:cookies"
        );
        assert_eq!(calls[2], "open_folder:/sites/team/Shared Documents");
    }

    #[tokio::test]
    async fn test_legacy_uses_ntlm_against_full_site() {
        let dir = TempDir::new().unwrap();
        let store = sample_store();
        let config = config(&dir, ProtocolVersion::Legacy);

        assert_eq!(
            auth_target(&config).unwrap(),
            AuthTarget::Legacy {
                site_url: "https://contoso.sharepoint.com/sites/team".to_string()
            }
        );
        download(&store, &config, |_| {}).await.unwrap();

        let calls = store.calls();
        assert_eq!(calls[0], "ntlm:u");
        assert_eq!(
            calls[1],
            "open_site:https://contoso.sharepoint.com/sites/team:ntlm"
        );
        assert!(!calls.iter().any(|c| c.starts_with("sign_in")));
    }

    #[tokio::test]
    async fn test_empty_folder_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FakeStore::with_files(&[]);
        let paths = download(&store, &config(&dir, ProtocolVersion::Modern), |_| {})
            .await
            .unwrap();
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn test_rerun_overwrites_identically() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, ProtocolVersion::Modern);
        std::fs::write(dir.path().join("a.csv"), b"stale contents that are longer").unwrap();

        let first = download(&sample_store(), &config, |_| {}).await.unwrap();
        let second = download(&sample_store(), &config, |_| {}).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read(dir.path().join("a.csv")).unwrap(), b"1,2");
    }

    #[tokio::test]
    async fn test_sign_in_failure_is_authentication_error() {
        let dir = TempDir::new().unwrap();
        let store = sample_store().failing_sign_in();
        let err = download(&store, &config(&dir, ProtocolVersion::Modern), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Authentication { .. }));
        assert_eq!(
            err.to_string(),
            "Unable to authenticate using supplied user name and password."
        );
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_ntlm_user_is_authentication_error() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, ProtocolVersion::Legacy);
        config.username = "CONTOSO\\".to_string();
        let err = download(&sample_store(), &config, |_| {}).await.unwrap_err();
        assert!(matches!(err, DownloadError::Authentication { .. }));
    }

    #[tokio::test]
    async fn test_site_failure_names_site() {
        let dir = TempDir::new().unwrap();
        let store = sample_store().failing_open_site();
        let err = download(&store, &config(&dir, ProtocolVersion::Modern), |_| {})
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "https://contoso.sharepoint.com/sites/team is not a valid site"
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_discards_results() {
        let dir = TempDir::new().unwrap();
        let store = sample_store().failing_fetch_of("c.csv");
        let err = download(&store, &config(&dir, ProtocolVersion::Modern), |_| {})
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Unable to download files from Shared Documents");
        // Written before the failure and left in place
        assert!(dir.path().join("a.csv").exists());
    }

    #[tokio::test]
    async fn test_names_escaping_save_path_are_rejected() {
        for name in ["../escaped.csv", "/abs/escaped.csv", "nested/inner.csv"] {
            let root = TempDir::new().unwrap();
            let save = root.path().join("save");
            std::fs::create_dir(&save).unwrap();

            let mut config = config(&root, ProtocolVersion::Modern);
            config.save_path = save.clone();
            config.filespec = "*".to_string();
            let store = FakeStore::with_files(&[(name, &b"x"[..])]);

            let err = download(&store, &config, |_| {}).await.unwrap_err();
            match &err {
                DownloadError::Download { source, .. } => {
                    assert!(matches!(source, ClientError::UnsafeFileName(n) if n == name))
                }
                other => panic!("unexpected error {}", other),
            }
            assert!(!root.path().join("escaped.csv").exists());
            assert!(!store.calls().iter().any(|c| c.starts_with("get_file")));
        }
    }

    #[test]
    fn test_local_name() {
        assert_eq!(local_name("a.csv").unwrap(), Path::new("a.csv"));
        assert!(local_name("..").is_err());
        assert!(local_name("").is_err());
        assert!(local_name("./a.csv").is_err());
    }

    #[tokio::test]
    async fn test_notifies_progress() {
        let dir = TempDir::new().unwrap();
        let messages = RefCell::new(Vec::new());
        download(&sample_store(), &config(&dir, ProtocolVersion::Modern), |m| {
            messages.borrow_mut().push(m.to_string())
        })
        .await
        .unwrap();

        assert_eq!(
            messages.into_inner(),
            vec![
                "Successfully authenticated".to_string(),
                "Successfully accessed site https://contoso.sharepoint.com/sites/team".to_string(),
            ]
        );
    }
}
