//! Command-line interface definitions for the IMDb harvester.
//!
//! Everything about *what* to collect lives in the YAML config; the command
//! line only picks the config file, the collection phase and the storage
//! credential.

use clap::{Parser, ValueEnum};

/// Which collection phase to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Entity {
    /// Discover title ids (first run) and collect title metadata
    Metadata,
    /// Collect reviews of titles with metadata into partitions
    Reviews,
}

/// Command-line arguments for the IMDb harvester.
///
/// # Examples
///
/// ```sh
/// # First phase: build the progress table and fill in metadata
/// imdb_harvest --config config.yaml --entity metadata
///
/// # Second phase: reviews, against an HTTP object store
/// STORAGE_TOKEN=secret imdb_harvest -c config.yaml -e reviews
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: String,

    /// Collection phase to run
    #[arg(short, long, value_enum)]
    pub entity: Entity,

    /// Bearer token for the HTTP object store backend
    #[arg(long, env = "STORAGE_TOKEN", hide_env_values = true)]
    pub storage_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "imdb_harvest",
            "--config",
            "/etc/imdb/config.yaml",
            "--entity",
            "reviews",
        ]);

        assert_eq!(cli.config, "/etc/imdb/config.yaml");
        assert_eq!(cli.entity, Entity::Reviews);
    }

    #[test]
    fn test_cli_short_flags_and_default_config() {
        let cli = Cli::parse_from(["imdb_harvest", "-e", "metadata"]);

        assert_eq!(cli.config, "config.yaml");
        assert_eq!(cli.entity, Entity::Metadata);
    }

    #[test]
    fn test_cli_storage_token_flag() {
        let cli = Cli::parse_from([
            "imdb_harvest",
            "-e",
            "metadata",
            "--storage-token",
            "abc123",
        ]);

        assert_eq!(cli.storage_token.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_cli_rejects_unknown_entity() {
        let result = Cli::try_parse_from(["imdb_harvest", "-e", "posters"]);
        assert!(result.is_err());
    }
}
