/// Error taxonomy for the pgbulk core

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Catalog listing could not reach the server or authenticate.
    #[error("connection to '{server}' failed: {source}")]
    Connection {
        server: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// An external tool binary could not be started.
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: io::Error,
    },

    /// An external tool ran to completion but exited nonzero.
    #[error("{tool} failed ({status}): {stderr}")]
    Tool {
        tool: &'static str,
        status: ExitStatus,
        stderr: String,
    },

    /// The server list file could not be read or written.
    #[error("server list at {}: {source}", .path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The server list file exists but does not parse.
    #[error("server list at {} is not valid JSON: {source}", .path.display())]
    StoreFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
