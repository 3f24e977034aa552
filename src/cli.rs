use crate::node::Host;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "spdl")]
#[command(about = "Download files matching a filespec from a SharePoint document library")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download matching files and emit one FilePath row per file
    Run {
        /// Node configuration XML file
        #[arg(short, long)]
        config: PathBuf,

        /// Write CSV rows to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Publish the record layout only, without downloading
        #[arg(long)]
        update_only: bool,

        /// Read the password from this environment variable instead of the XML
        #[arg(long)]
        password_env: Option<String>,
    },

    /// Validate a node configuration without contacting SharePoint
    Check {
        /// Node configuration XML file
        #[arg(short, long)]
        config: PathBuf,

        /// Read the password from this environment variable instead of the XML
        #[arg(long)]
        password_env: Option<String>,
    },
}

/// Host for standalone runs: messages go to the log, secrets come from the
/// XML as-is or from an environment variable.
#[derive(Debug, Clone, Default)]
pub struct CliHost {
    pub password_env: Option<String>,
    pub update_only: bool,
}

impl CliHost {
    pub fn new(password_env: Option<String>, update_only: bool) -> Self {
        Self {
            password_env,
            update_only,
        }
    }

    fn resolve_password<L>(&self, stored: &str, lookup: L) -> Option<String>
    where
        L: Fn(&str) -> Option<String>,
    {
        match &self.password_env {
            Some(var) => {
                let value = lookup(var);
                if value.is_none() {
                    warn!("Environment variable {} is not set", var);
                }
                value
            }
            None => Some(stored.to_string()),
        }
    }
}

impl Host for CliHost {
    fn decrypt_password(&self, ciphertext: &str) -> Option<String> {
        self.resolve_password(ciphertext, |name| std::env::var(name).ok())
    }

    fn update_only(&self) -> bool {
        self.update_only
    }

    fn info(&self, message: &str) {
        info!("{}", message);
    }

    fn error(&self, message: &str) {
        error!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "spdl",
            "run",
            "--config",
            "node.xml",
            "--output",
            "rows.csv",
            "--password-env",
            "SP_PASSWORD",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                config,
                output,
                update_only,
                password_env,
            } => {
                assert_eq!(config, PathBuf::from("node.xml"));
                assert_eq!(output, Some(PathBuf::from("rows.csv")));
                assert!(!update_only);
                assert_eq!(password_env.as_deref(), Some("SP_PASSWORD"));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_check_requires_config() {
        assert!(Cli::try_parse_from(["spdl", "check"]).is_err());
        let cli = Cli::try_parse_from(["spdl", "check", "-c", "node.xml"]).unwrap();
        assert!(matches!(cli.command, Commands::Check { .. }));
    }

    #[test]
    fn test_password_is_used_as_stored_by_default() {
        let host = CliHost::default();
        assert_eq!(host.resolve_password("secret", |_| None), Some("secret".to_string()));
    }

    #[test]
    fn test_password_from_environment() {
        let host = CliHost::new(Some("SP_PASSWORD".to_string()), false);
        let lookup = |name: &str| (name == "SP_PASSWORD").then(|| "from-env".to_string());
        assert_eq!(host.resolve_password("ignored", lookup), Some("from-env".to_string()));

        let unset = CliHost::new(Some("UNSET_VAR".to_string()), false);
        assert_eq!(unset.resolve_password("ignored", lookup), None);
    }
}
