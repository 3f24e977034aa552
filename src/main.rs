use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::File;
use tracing::{info, warn};

use sharepoint_dl::cli::{Cli, CliHost, Commands};
use sharepoint_dl::config::{read_node_xml, Settings};
use sharepoint_dl::node::{Node, NodeState};
use sharepoint_dl::output::{CsvSink, MemorySink, RecordSink};
use sharepoint_dl::sharepoint::SharePointClient;

fn init_logging() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Default to INFO for this crate when RUST_LOG is unset
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "sharepoint_dl=info,spdl=info");
    }

    let file_appender = tracing_appender::rolling::never(".", "spdl.log");

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::from_default_env()),
        )
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_filter(EnvFilter::from_default_env()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    match &cli.command {
        Commands::Run {
            config,
            output,
            update_only,
            password_env,
        } => {
            let xml = read_node_xml(config)?;
            let client = SharePointClient::new(&settings)?;

            let sink: Box<dyn RecordSink> = match output {
                Some(path) => {
                    let file = File::create(path)
                        .with_context(|| format!("Cannot create output file: {}", path.display()))?;
                    Box::new(CsvSink::new(file))
                }
                None => Box::new(CsvSink::new(std::io::stdout())),
            };

            let host = CliHost::new(password_env.clone(), *update_only);
            let mut node = Node::new(client, host, sink);

            if node.init(&xml) && !node.push_all_records().await && node.state() == NodeState::Ready {
                info!("Record layout published; no files downloaded");
            }

            let failed = node.state() == NodeState::Invalid;
            node.close(failed);
            if failed {
                bail!("SharePoint download failed for {}", config.display());
            }
        }

        Commands::Check {
            config,
            password_env,
        } => {
            let xml = read_node_xml(config)?;
            let client = SharePointClient::new(&settings)?;
            let host = CliHost::new(password_env.clone(), false);
            let mut node = Node::new(client, host, MemorySink::new());

            if node.init(&xml) {
                if let Some(config) = node.configuration() {
                    println!(
                        "Configuration is valid: {} files from {} ({} authentication)",
                        config.filespec,
                        config.site,
                        config.version.as_str()
                    );
                }
            } else {
                warn!("Configuration is not valid");
                bail!("Invalid node configuration: {}", config.display());
            }
        }
    }

    Ok(())
}
