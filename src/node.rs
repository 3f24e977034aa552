//! Node lifecycle
//!
//! ```text
//! Uninitialized --init--> Configured --+--> Invalid
//!                                      +--> Ready --push_all_records--> Emitting --> Closed
//! ```
//!
//! `Invalid` and `Closed` are terminal: every later call is a no-op that
//! reports failure. The download runs at most once per node.

use crate::config::RawFields;
use crate::downloader;
use crate::models::Configuration;
use crate::output::{Record, RecordSchema, RecordSink};
use crate::sharepoint::DocumentStore;
use std::error::Error as _;
use tracing::{debug, error, warn};

/// Services the surrounding runtime provides to a node
pub trait Host {
    /// Turn the stored password field into plain text. `None` means the
    /// secret could not be recovered.
    fn decrypt_password(&self, ciphertext: &str) -> Option<String>;

    /// True when the runtime only wants the output layout, not the data.
    fn update_only(&self) -> bool {
        false
    }

    fn info(&self, message: &str);

    fn error(&self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Uninitialized,
    Configured,
    Invalid,
    Ready,
    Emitting,
    Closed,
}

pub struct Node<S, H, O> {
    store: S,
    host: H,
    sink: O,
    state: NodeState,
    config: Option<Configuration>,
}

impl<S, H, O> Node<S, H, O>
where
    S: DocumentStore,
    H: Host,
    O: RecordSink,
{
    pub fn new(store: S, host: H, sink: O) -> Self {
        Self {
            store,
            host,
            sink,
            state: NodeState::Uninitialized,
            config: None,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn configuration(&self) -> Option<&Configuration> {
        self.config.as_ref()
    }

    pub fn sink(&self) -> &O {
        &self.sink
    }

    pub fn into_sink(self) -> O {
        self.sink
    }

    /// Read and validate the configuration document. Returns whether the node
    /// is ready to download.
    pub fn init(&mut self, xml: &str) -> bool {
        if self.state != NodeState::Uninitialized {
            warn!("Ignoring repeated init in state {:?}", self.state);
            return false;
        }

        self.state = NodeState::Configured;
        let fields = match RawFields::from_xml(xml) {
            Ok(fields) => fields,
            Err(e) => {
                self.fail(&e.to_string());
                return false;
            }
        };

        let host = &self.host;
        match fields.into_configuration(|cipher| host.decrypt_password(cipher)) {
            Ok(config) => {
                debug!("Node configured: {:?}", config);
                self.config = Some(config);
                self.state = NodeState::Ready;
                true
            }
            Err(e) => {
                self.fail(&e.to_string());
                false
            }
        }
    }

    /// Download matching files and push one record per local path, then
    /// close the output. Returns `false` without doing anything unless the
    /// node is `Ready`.
    pub async fn push_all_records(&mut self) -> bool {
        let config = match (self.state, &self.config) {
            (NodeState::Ready, Some(config)) => config.clone(),
            _ => {
                debug!("Skipping record push in state {:?}", self.state);
                return false;
            }
        };

        if let Err(e) = self.sink.init(&RecordSchema::file_path()) {
            self.fail(&e.to_string());
            return false;
        }

        if self.host.update_only() {
            debug!("Update-only run; layout published without downloading");
            return false;
        }

        self.state = NodeState::Emitting;
        let host = &self.host;
        let result = downloader::download(&self.store, &config, |message| host.info(message)).await;

        let paths = match result {
            Ok(paths) => paths,
            Err(e) => {
                let mut source = e.source();
                while let Some(cause) = source {
                    debug!("caused by: {}", cause);
                    source = cause.source();
                }
                self.fail(&e.to_string());
                return false;
            }
        };

        for path in &paths {
            let record = Record::single(path.to_string_lossy());
            if let Err(e) = self.sink.push(&record) {
                self.fail(&e.to_string());
                return false;
            }
        }

        if paths.is_empty() {
            self.host
                .info(&format!("No files matched file specification {}", config.filespec));
        } else {
            self.host.info(&format!(
                "Downloaded {} files to {}",
                paths.len(),
                config.save_path.display()
            ));
        }

        if let Err(e) = self.sink.close() {
            self.fail(&e.to_string());
            return false;
        }
        self.state = NodeState::Closed;
        true
    }

    /// Final lifecycle call; makes sure the output is closed.
    pub fn close(&mut self, has_errors: bool) {
        debug!("Closing node (has_errors: {})", has_errors);
        if !self.sink.is_closed() {
            if let Err(e) = self.sink.close() {
                error!("Failed to close output: {}", e);
            }
        }
    }

    fn fail(&mut self, message: &str) {
        debug!("Node invalid: {}", message);
        self.host.error(message);
        self.state = NodeState::Invalid;
    }
}
