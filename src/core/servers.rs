/// Server credential storage
///
/// Loads and saves the configured PostgreSQL servers as a JSON list.
/// A missing file is not an error; it reads as an empty list.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::core::error::{Error, Result};
use crate::utils::{CONFIG_DIR, SERVERS_FILE};

/// Connection details for one PostgreSQL server.
///
/// Identity is the `name` field; the rest is passed through to the
/// catalog reader and the external tools.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl ServerDescriptor {
    /// `user@host:port`, for status lines.
    pub fn address(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

// Manual impl so the password never ends up in logs or panic messages.
impl fmt::Debug for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerDescriptor")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<hidden>")
            .finish()
    }
}

/// JSON-backed store for the server list.
pub struct ServerStore {
    path: PathBuf,
}

impl ServerStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Default location under the user config directory,
    /// e.g. `~/.config/pgbulk-cli/servers.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(SERVERS_FILE))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the server list. A missing file yields an empty list.
    pub fn load(&self) -> Result<Vec<ServerDescriptor>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|source| Error::Store {
            path: self.path.clone(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| Error::StoreFormat {
            path: self.path.clone(),
            source,
        })
    }

    /// Rewrite the whole list, preserving the given order.
    pub fn save(&self, servers: &[ServerDescriptor]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Store {
                path: self.path.clone(),
                source,
            })?;
        }

        let content = serde_json::to_string_pretty(servers).map_err(|source| Error::StoreFormat {
            path: self.path.clone(),
            source,
        })?;

        fs::write(&self.path, content).map_err(|source| Error::Store {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_servers() -> Vec<ServerDescriptor> {
        vec![
            ServerDescriptor {
                name: "staging".to_string(),
                host: "staging.example.com".to_string(),
                port: 5432,
                user: "postgres".to_string(),
                password: "hunter2".to_string(),
            },
            ServerDescriptor {
                name: "prod".to_string(),
                host: "10.0.0.12".to_string(),
                port: 5433,
                user: "backup".to_string(),
                password: "s3cret".to_string(),
            },
        ]
    }

    #[test]
    fn test_round_trip_preserves_fields_and_order() {
        let dir = TempDir::new().unwrap();
        let store = ServerStore::new(dir.path().join("servers.json"));

        let servers = sample_servers();
        store.save(&servers).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, servers);
        assert_eq!(loaded[0].name, "staging");
        assert_eq!(loaded[1].name, "prod");
    }

    #[test]
    fn test_missing_file_reads_as_empty_list() {
        let dir = TempDir::new().unwrap();
        let store = ServerStore::new(dir.path().join("does-not-exist.json"));

        assert_eq!(store.load().unwrap(), Vec::new());
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = ServerStore::new(dir.path().join("nested").join("servers.json"));

        store.save(&sample_servers()).unwrap();
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("servers.json");
        std::fs::write(&path, "not json").unwrap();

        let store = ServerStore::new(path);
        assert!(matches!(store.load(), Err(Error::StoreFormat { .. })));
    }

    #[test]
    fn test_debug_hides_password() {
        let server = &sample_servers()[0];
        let printed = format!("{:?}", server);
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("staging"));
    }
}
