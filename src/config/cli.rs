use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the isr-cache binary.
#[derive(Debug, Parser)]
#[command(
    name = "isr-cache",
    version,
    about = "ISR page cache in front of an upstream content API"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "ISR_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Prewarm the cache and serve HTTP.
    Serve(Box<ServeArgs>),
    /// Print the registered ISR routes and exit.
    Routes,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the upstream content API base URL.
    #[arg(long = "upstream-base-url", value_name = "URL")]
    pub upstream_base_url: Option<String>,

    /// Override the upstream request timeout.
    #[arg(long = "upstream-timeout-seconds", value_name = "SECONDS")]
    pub upstream_timeout_seconds: Option<u64>,

    /// Override the cache key prefix.
    #[arg(long = "cache-key-prefix", value_name = "PREFIX")]
    pub cache_key_prefix: Option<String>,

    /// Override the default entry TTL.
    #[arg(long = "cache-default-ttl-seconds", value_name = "SECONDS")]
    pub cache_default_ttl_seconds: Option<u64>,

    /// Override the default stale-while-revalidate window.
    #[arg(long = "cache-default-stale-seconds", value_name = "SECONDS")]
    pub cache_default_stale_seconds: Option<u64>,

    /// Override the minimum spacing between root hash checks.
    #[arg(long = "cache-root-check-interval-seconds", value_name = "SECONDS")]
    pub cache_root_check_interval_seconds: Option<u64>,

    /// Override the key length above which keys are hashed.
    #[arg(long = "cache-max-key-len", value_name = "COUNT")]
    pub cache_max_key_len: Option<usize>,

    /// Toggle startup prewarming.
    #[arg(
        long = "cache-prewarm-on-startup",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_prewarm_on_startup: Option<bool>,

    /// Toggle development mode (skips prewarming).
    #[arg(
        long = "dev-mode",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub dev_mode: Option<bool>,
}
