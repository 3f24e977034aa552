//! SharePoint document downloader node: reads a host configuration, copies
//! files matching a filespec out of a document library, and emits one
//! `FilePath` record per downloaded file.

pub mod cli;
pub mod config;
pub mod downloader;
pub mod errors;
pub mod models;
pub mod node;
pub mod output;
pub mod sharepoint;
