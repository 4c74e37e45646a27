use clap::builder::{OsStringValueParser, TypedValueParser};
use clap::Parser;
use std::path::{Path, PathBuf};

use crate::persistence::DEFAULT_DATA_FILE;

/*
Command line / environment configuration of the server.
Every option has a default, so a plain `parlor-server` starts on loopback.
*/

#[derive(Parser, Debug, Clone)]
#[command(name = "parlor-server", version, about = "Chat relay server")]
pub struct Args {
    /// Bind address, e.g. 0.0.0.0:5000
    #[arg(long, env = "PARLOR_BIND", default_value = "127.0.0.1:5000")]
    pub bind: String,

    /// Snapshot file holding chats, groups and known users
    #[arg(long, env = "PARLOR_DATA_FILE", default_value = DEFAULT_DATA_FILE)]
    pub data_file: PathBuf,

    /// Log file appended next to stdout; pass an empty value to disable
    #[arg(
        long,
        env = "PARLOR_LOG_FILE",
        default_value = "server.log",
        value_parser = OsStringValueParser::new().map(PathBuf::from)
    )]
    pub log_file: PathBuf,

    /// tracing filter directive, e.g. "info" or "parlor_server=debug"
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,

    /// Don't read operator commands from stdin
    #[arg(long)]
    pub no_console: bool,
}

impl Args {
    pub fn log_file(&self) -> Option<&Path> {
        if self.log_file.as_os_str().is_empty() {
            None
        } else {
            Some(&self.log_file)
        }
    }
}
