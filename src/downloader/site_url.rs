use url::Url;

/// The pieces of a configured site URL the download routine needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteUrl {
    pub scheme: String,
    /// Host with port, if one was given
    pub host: String,
    /// Decoded path, e.g. `/sites/team`
    pub path: String,
}

impl SiteUrl {
    /// Parse a site URL, assuming `https` when no scheme is given.
    pub fn parse(site: &str) -> Result<Self, url::ParseError> {
        let url = if site.contains("://") {
            Url::parse(site)?
        } else {
            Url::parse(&format!("https://{}", site))?
        };

        let host = url.host_str().ok_or(url::ParseError::EmptyHost)?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let path = urlencoding::decode(url.path())
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| url.path().to_string());

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            path,
        })
    }

    /// `scheme://host`, without any path
    pub fn root(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Server-relative path of a documents folder under this site.
    pub fn folder_path(&self, docs: &str) -> String {
        join_remote_path(&self.path, docs)
    }
}

/// Join like a POSIX path: an absolute `child` replaces `base`.
pub fn join_remote_path(base: &str, child: &str) -> String {
    if child.starts_with('/') || base.is_empty() {
        child.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, child)
    } else {
        format!("{}/{}", base, child)
    }
}
