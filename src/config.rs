//!
//! filesync server configuration
//! -----------------------------
//! Resolved from CLI flags, then environment variables, then defaults.

use std::env;
use std::path::PathBuf;

pub const ENV_HTTP_PORT: &str = "FILESYNC_HTTP_PORT";
pub const ENV_DATA_FOLDER: &str = "FILESYNC_DATA_FOLDER";
pub const ENV_BACKUP_INTERVAL: &str = "FILESYNC_BACKUP_INTERVAL_SEC";

pub const DEFAULT_HTTP_PORT: u16 = 5000;
pub const DEFAULT_DATA_FOLDER: &str = "data";

pub const USAGE: &str = "filesync server\n\nUSAGE:\n  filesync_server [--http-port N] [--data-folder PATH] [--backup-interval-secs N]\n\nOPTIONS:\n  --http-port N               HTTP API port (env: FILESYNC_HTTP_PORT, default 5000)\n  --data-folder PATH          Data root holding user_dirs and state documents (env: FILESYNC_DATA_FOLDER, default data)\n  --backup-interval-secs N    Periodic backup interval, 0 disables (env: FILESYNC_BACKUP_INTERVAL_SEC, default 0)\n  -h, --help                  Print this help\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub http_port: u16,
    pub data_root: PathBuf,
    pub backup_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { http_port: DEFAULT_HTTP_PORT, data_root: PathBuf::from(DEFAULT_DATA_FOLDER), backup_interval_secs: 0 }
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].as_str());
        }
        i += 1;
    }
    None
}

pub fn has_flag(args: &[String], flag: &str) -> bool { args.iter().any(|a| a == flag) }

pub fn wants_help(args: &[String]) -> bool { has_flag(args, "--help") || has_flag(args, "-h") }

impl ServerConfig {
    /// Resolve from explicit arguments and an environment lookup. Unparsable
    /// values fall through to the next source.
    pub fn resolve<F>(args: &[String], env_lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let http_port = arg_value(args, "--http-port").and_then(|v| v.parse::<u16>().ok())
            .or_else(|| env_lookup(ENV_HTTP_PORT).and_then(|v| v.parse::<u16>().ok()))
            .unwrap_or(defaults.http_port);
        let data_root = arg_value(args, "--data-folder").map(PathBuf::from)
            .or_else(|| env_lookup(ENV_DATA_FOLDER).filter(|v| !v.is_empty()).map(PathBuf::from))
            .unwrap_or(defaults.data_root);
        let backup_interval_secs = arg_value(args, "--backup-interval-secs").and_then(|v| v.parse::<u64>().ok())
            .or_else(|| env_lookup(ENV_BACKUP_INTERVAL).and_then(|v| v.parse::<u64>().ok()))
            .unwrap_or(defaults.backup_interval_secs);
        Self { http_port, data_root, backup_interval_secs }
    }

    /// Resolve from the process arguments and environment.
    pub fn from_env_and_args(args: &[String]) -> Self { Self::resolve(args, |k| env::var(k).ok()) }
}
