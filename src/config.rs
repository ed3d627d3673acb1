//! Configuration for the directory server and client.
//!
//! The server reads command-line arguments and an optional TOML file; CLI
//! arguments take precedence over file values. Values that neither source
//! provides (table path, port) are asked for on the console.

use crate::channel::OverflowPolicy;
use crate::net::DEFAULT_BACKLOG;
use crate::table::DEFAULT_CAPACITY;
use clap::Parser;
use serde::Deserialize;
use std::io;
use std::path::PathBuf;
use tokio::sync::Semaphore;

/// Command-line arguments for the directory server
#[derive(Parser, Debug, Default)]
#[command(name = "keydir-server")]
#[command(version = "0.1.0")]
#[command(about = "Serves public keys for identities over TCP", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Identity table file of `<identity> <public key>` pairs
    #[arg(short = 'f', long)]
    pub table: Option<PathBuf>,

    /// Host name or address to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Pending-connection backlog
    #[arg(long)]
    pub backlog: Option<i32>,

    /// Maximum number of sessions served at once (1 = one client at a time)
    #[arg(short = 'n', long)]
    pub max_connections: Option<usize>,

    /// Maximum number of table entries
    #[arg(long)]
    pub table_capacity: Option<usize>,

    /// Handling of identities that overflow the receive buffer
    #[arg(long, value_enum)]
    pub overflow: Option<OverflowPolicy>,

    /// Log level (trace, debug, info, warn, error) [default: info]
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: Option<u16>,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            backlog: default_backlog(),
            max_connections: default_max_connections(),
        }
    }
}

/// Identity table configuration
#[derive(Debug, Deserialize)]
pub struct TableConfig {
    pub path: Option<PathBuf>,
    #[serde(default = "default_table_capacity")]
    pub capacity: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            path: None,
            capacity: default_table_capacity(),
        }
    }
}

/// Wire protocol configuration
#[derive(Debug, Deserialize, Default)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_backlog() -> i32 {
    DEFAULT_BACKLOG
}

fn default_max_connections() -> usize {
    64
}

fn default_table_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub table_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub backlog: i32,
    pub max_connections: usize,
    pub table_capacity: usize,
    pub overflow: OverflowPolicy,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args, an optional TOML file and, for
    /// anything still missing, console prompts.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::resolve(cli, toml_config, crate::console::prompt)
    }

    /// Merge CLI args with TOML values (CLI takes precedence), asking
    /// `prompt` for a table path or port that neither provides.
    pub fn resolve<P>(
        cli: CliArgs,
        toml_config: TomlConfig,
        mut prompt: P,
    ) -> Result<Self, ConfigError>
    where
        P: FnMut(&str) -> io::Result<String>,
    {
        let table_path = match cli.table.or(toml_config.table.path) {
            Some(path) => path,
            None => {
                PathBuf::from(prompt("Enter a file name: ").map_err(ConfigError::Prompt)?)
            }
        };

        let port = match cli.port.or(toml_config.server.port) {
            Some(port) => port,
            None => {
                let input = prompt("Enter server port number: ").map_err(ConfigError::Prompt)?;
                parse_port(&input)?
            }
        };

        let max_connections = cli
            .max_connections
            .unwrap_or(toml_config.server.max_connections);
        if max_connections == 0 || max_connections > Semaphore::MAX_PERMITS {
            return Err(ConfigError::Invalid(format!(
                "max_connections must be between 1 and {}",
                Semaphore::MAX_PERMITS
            )));
        }

        Ok(Config {
            table_path,
            host: cli.host.unwrap_or(toml_config.server.host),
            port,
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            max_connections,
            table_capacity: cli
                .table_capacity
                .unwrap_or(toml_config.table.capacity),
            overflow: cli.overflow.unwrap_or(toml_config.protocol.overflow),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

/// Command-line arguments for the directory client
#[derive(Parser, Debug, Default)]
#[command(name = "keydir-client")]
#[command(version = "0.1.0")]
#[command(about = "Looks up public keys on a keydir server", long_about = None)]
pub struct ClientArgs {
    /// Server host name
    #[arg(long)]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Handling of keys that overflow the receive buffer
    #[arg(long, value_enum)]
    pub overflow: Option<OverflowPolicy>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

/// Final resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub overflow: OverflowPolicy,
    pub log_level: String,
}

impl ClientConfig {
    /// Load configuration from CLI args, prompting for a missing host or port.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(ClientArgs::parse(), crate::console::prompt)
    }

    pub fn resolve<P>(args: ClientArgs, mut prompt: P) -> Result<Self, ConfigError>
    where
        P: FnMut(&str) -> io::Result<String>,
    {
        let host = match args.host {
            Some(host) => host,
            None => prompt("Enter a server host name: ").map_err(ConfigError::Prompt)?,
        };
        let port = match args.port {
            Some(port) => port,
            None => {
                let input = prompt("Enter server port number: ").map_err(ConfigError::Prompt)?;
                parse_port(&input)?
            }
        };

        Ok(ClientConfig {
            host,
            port,
            overflow: args.overflow.unwrap_or_default(),
            log_level: args.log_level,
        })
    }
}

fn parse_port(input: &str) -> Result<u16, ConfigError> {
    input
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidPort(input.trim().to_string()))
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Prompt(std::io::Error),
    InvalidPort(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Prompt(e) => write!(f, "Failed to read from console: {}", e),
            ConfigError::InvalidPort(input) => write!(f, "Invalid port number '{}'", input),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_prompt(message: &str) -> io::Result<String> {
        panic!("unexpected prompt: {message}")
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, None);
        assert_eq!(config.server.backlog, 10);
        assert_eq!(config.table.capacity, 1024);
        assert_eq!(config.protocol.overflow, OverflowPolicy::Reject);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "192.0.2.1"
            port = 4000
            backlog = 32
            max_connections = 1

            [table]
            path = "keys.txt"
            capacity = 2048

            [protocol]
            overflow = "truncate"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "192.0.2.1");
        assert_eq!(config.server.port, Some(4000));
        assert_eq!(config.server.backlog, 32);
        assert_eq!(config.server.max_connections, 1);
        assert_eq!(config.table.path, Some(PathBuf::from("keys.txt")));
        assert_eq!(config.table.capacity, 2048);
        assert_eq!(config.protocol.overflow, OverflowPolicy::Truncate);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            port = 4000
            [table]
            path = "from-file.txt"
            "#,
        )
        .unwrap();
        let cli = CliArgs {
            port: Some(5000),
            ..Default::default()
        };

        let config = Config::resolve(cli, toml_config, no_prompt).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.table_path, PathBuf::from("from-file.txt"));
        assert_eq!(config.backlog, 10);
    }

    #[test]
    fn test_missing_values_are_prompted() {
        let cli = CliArgs::default();
        let mut asked = Vec::new();

        let config = Config::resolve(cli, TomlConfig::default(), |message| {
            asked.push(message.to_string());
            Ok(if message.contains("file") {
                "keys21.txt".to_string()
            } else {
                " 1234 ".to_string()
            })
        })
        .unwrap();

        assert_eq!(asked.len(), 2);
        assert_eq!(config.table_path, PathBuf::from("keys21.txt"));
        assert_eq!(config.port, 1234);
    }

    #[test]
    fn test_invalid_prompted_port() {
        let cli = CliArgs {
            table: Some(PathBuf::from("keys.txt")),
            ..Default::default()
        };

        let err = Config::resolve(cli, TomlConfig::default(), |_| Ok("abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort(ref input) if input == "abc"));
    }

    #[test]
    fn test_zero_max_connections_rejected() {
        let cli = CliArgs {
            table: Some(PathBuf::from("keys.txt")),
            port: Some(1),
            max_connections: Some(0),
            ..Default::default()
        };

        assert!(matches!(
            Config::resolve(cli, TomlConfig::default(), no_prompt),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_excessive_max_connections_rejected() {
        let cli = CliArgs {
            table: Some(PathBuf::from("keys.txt")),
            port: Some(1),
            max_connections: Some(usize::MAX),
            ..Default::default()
        };

        assert!(matches!(
            Config::resolve(cli, TomlConfig::default(), no_prompt),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_default_host_binds_all_interfaces() {
        let cli = CliArgs {
            table: Some(PathBuf::from("keys.txt")),
            port: Some(1),
            ..Default::default()
        };

        let config = Config::resolve(cli, TomlConfig::default(), no_prompt).unwrap();
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_log_level_precedence() {
        let toml_config = || -> TomlConfig {
            toml::from_str(
                r#"
                [logging]
                level = "debug"
                "#,
            )
            .unwrap()
        };
        let cli = || CliArgs {
            table: Some(PathBuf::from("keys.txt")),
            port: Some(1),
            ..Default::default()
        };

        let config = Config::resolve(cli(), toml_config(), no_prompt).unwrap();
        assert_eq!(config.log_level, "debug");

        let explicit = CliArgs {
            log_level: Some("info".to_string()),
            ..cli()
        };
        let config = Config::resolve(explicit, toml_config(), no_prompt).unwrap();
        assert_eq!(config.log_level, "info");

        let config = Config::resolve(cli(), TomlConfig::default(), no_prompt).unwrap();
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_client_prompts_for_host() {
        let args = ClientArgs {
            port: Some(4000),
            ..Default::default()
        };

        let config = ClientConfig::resolve(args, |_| Ok("localhost".to_string())).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 4000);
    }
}
