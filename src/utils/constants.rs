/// Defaults and fixed names shared across the pgbulk CLI

use std::time::Duration;

/// Concurrent external processes per batch unless overridden.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Parallel dump workers for directory-format backups.
pub const DEFAULT_DUMP_JOBS: usize = 4;

/// Administrative database used for catalog queries and auto-create restores.
pub const ADMIN_DATABASE: &str = "postgres";

/// Environment variable the PostgreSQL tools read the password from.
pub const PASSWORD_ENV: &str = "PGPASSWORD";

/// File extension of custom-format backup artifacts.
pub const BACKUP_FILE_EXT: &str = "backup";

/// Directory under the user config dir holding our files.
pub const CONFIG_DIR: &str = "pgbulk-cli";

/// Server list file name inside [`CONFIG_DIR`].
pub const SERVERS_FILE: &str = "servers.json";

/// Connect timeout for catalog queries.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
