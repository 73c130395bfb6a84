//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::DEFAULT_CONFIG_PATH;

/// Push live session identities to network group policies.
#[derive(Debug, Clone, Parser)]
#[command(name = "igm-bridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Inventory CSV; overrides `networks_file_path`.
    #[arg(short, long)]
    pub networks: Option<PathBuf>,

    /// Log level or filter directive; overrides `log_level`.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit JSON logs.
    #[arg(long)]
    pub json_logs: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["igm-bridge"]);
        assert_eq!(cli.config, PathBuf::from("config/config.yaml"));
        assert!(cli.networks.is_none());
        assert!(!cli.json_logs);
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::parse_from(["igm-bridge", "-c", "/etc/igm.yaml", "-n", "nets.csv"]);
        assert_eq!(cli.config, PathBuf::from("/etc/igm.yaml"));
        assert_eq!(cli.networks, Some(PathBuf::from("nets.csv")));
    }
}
