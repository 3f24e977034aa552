//! OData (verbose) response shapes used by the REST API

use serde::Deserialize;

pub(crate) const ODATA_VERBOSE: &str = "application/json;odata=verbose";

#[derive(Debug, Deserialize)]
pub(crate) struct ODataEnvelope<T> {
    pub d: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ODataCollection<T> {
    pub results: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FolderInfo {
    #[serde(rename = "ServerRelativeUrl")]
    pub server_relative_url: String,
}
