/// External tool invocation
///
/// Builds the pg_dump / pg_restore / createdb command lines and spawns them
/// without blocking. The server password travels only in the child's
/// environment, never on the command line.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::core::error::{Error, Result};
use crate::core::servers::ServerDescriptor;
use crate::utils::{ADMIN_DATABASE, BACKUP_FILE_EXT, PASSWORD_ENV};

pub const PG_DUMP: &str = "pg_dump";
pub const PG_RESTORE: &str = "pg_restore";
pub const CREATEDB: &str = "createdb";

/// Dump output format, pg_dump's `-F` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupFormat {
    /// Single compressed archive, written as `<database>.backup`.
    Custom,
    /// Directory-format dump; supports parallel dump workers.
    Directory { jobs: usize },
}

impl Default for BackupFormat {
    fn default() -> Self {
        BackupFormat::Custom
    }
}

impl BackupFormat {
    fn flag(&self) -> &'static str {
        match self {
            BackupFormat::Custom => "c",
            BackupFormat::Directory { .. } => "d",
        }
    }
}

/// Where the artifact for `database` lands under `output_dir`.
pub fn artifact_path(output_dir: &Path, database: &str, format: BackupFormat) -> PathBuf {
    match format {
        BackupFormat::Custom => output_dir.join(format!("{}.{}", database, BACKUP_FILE_EXT)),
        BackupFormat::Directory { .. } => output_dir.join(database),
    }
}

fn base_args(server: &ServerDescriptor) -> Vec<String> {
    vec![
        "-h".to_string(),
        server.host.clone(),
        "-p".to_string(),
        server.port.to_string(),
        "-U".to_string(),
        server.user.clone(),
    ]
}

/// pg_dump argument vector for one database.
pub fn backup_args(
    server: &ServerDescriptor,
    database: &str,
    output_dir: &Path,
    format: BackupFormat,
) -> Vec<String> {
    let mut args = base_args(server);
    args.push("-F".to_string());
    args.push(format.flag().to_string());
    if let BackupFormat::Directory { jobs } = format {
        args.push("-j".to_string());
        args.push(jobs.to_string());
    }
    args.push("-d".to_string());
    args.push(database.to_string());
    args.push("-f".to_string());
    args.push(artifact_path(output_dir, database, format).to_string_lossy().into_owned());
    args
}

/// pg_restore argument vector.
///
/// With a target the artifact is loaded into that existing database. Without
/// one, pg_restore connects to the administrative database and creates the
/// database recorded in the artifact's own metadata.
pub fn restore_args(
    server: &ServerDescriptor,
    backup_path: &Path,
    target: Option<&str>,
) -> Vec<String> {
    let mut args = base_args(server);
    match target {
        Some(database) => {
            args.push("-d".to_string());
            args.push(database.to_string());
        }
        None => {
            args.push("--create".to_string());
            args.push("-d".to_string());
            args.push(ADMIN_DATABASE.to_string());
        }
    }
    args.push(backup_path.to_string_lossy().into_owned());
    args
}

/// createdb argument vector.
pub fn createdb_args(server: &ServerDescriptor, database: &str) -> Vec<String> {
    let mut args = base_args(server);
    args.push(database.to_string());
    args
}

/// Spawns the external tools on behalf of the job runner.
///
/// The trait seam lets the runner be exercised without the PostgreSQL
/// client tools installed.
pub trait ToolInvoker: Send + Sync {
    fn spawn_backup(
        &self,
        server: &ServerDescriptor,
        database: &str,
        output_dir: &Path,
        format: BackupFormat,
    ) -> Result<Child>;

    fn spawn_restore(
        &self,
        server: &ServerDescriptor,
        backup_path: &Path,
        target: Option<&str>,
    ) -> Result<Child>;
}

/// Production invoker shelling out to the PostgreSQL client tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgTools;

impl PgTools {
    fn spawn(tool: &'static str, args: Vec<String>, password: &str) -> Result<Child> {
        tracing::debug!(tool, ?args, "spawning external tool");
        Command::new(tool)
            .args(&args)
            .env(PASSWORD_ENV, password)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn { tool, source })
    }
}

impl ToolInvoker for PgTools {
    fn spawn_backup(
        &self,
        server: &ServerDescriptor,
        database: &str,
        output_dir: &Path,
        format: BackupFormat,
    ) -> Result<Child> {
        let args = backup_args(server, database, output_dir, format);
        Self::spawn(PG_DUMP, args, &server.password)
    }

    fn spawn_restore(
        &self,
        server: &ServerDescriptor,
        backup_path: &Path,
        target: Option<&str>,
    ) -> Result<Child> {
        let args = restore_args(server, backup_path, target);
        Self::spawn(PG_RESTORE, args, &server.password)
    }
}

/// Run `createdb` to completion. Used by the explicit create-then-restore
/// flow before a targeted restore.
pub async fn create_database(server: &ServerDescriptor, database: &str) -> Result<()> {
    let args = createdb_args(server, database);
    tracing::debug!(tool = CREATEDB, ?args, "creating database");

    let output = Command::new(CREATEDB)
        .args(&args)
        .env(PASSWORD_ENV, &server.password)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| Error::Spawn {
            tool: CREATEDB,
            source,
        })?;

    if !output.status.success() {
        return Err(Error::Tool {
            tool: CREATEDB,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> ServerDescriptor {
        ServerDescriptor {
            name: "staging".to_string(),
            host: "db.example.com".to_string(),
            port: 5433,
            user: "admin".to_string(),
            password: "s3cret".to_string(),
        }
    }

    #[test]
    fn test_backup_args_custom_format() {
        let args = backup_args(&server(), "sales", Path::new("/backups"), BackupFormat::Custom);
        assert_eq!(
            args,
            vec![
                "-h", "db.example.com", "-p", "5433", "-U", "admin", "-F", "c", "-d", "sales",
                "-f", "/backups/sales.backup",
            ]
        );
    }

    #[test]
    fn test_backup_args_directory_format() {
        let args = backup_args(
            &server(),
            "sales",
            Path::new("/backups"),
            BackupFormat::Directory { jobs: 4 },
        );
        assert_eq!(
            args,
            vec![
                "-h", "db.example.com", "-p", "5433", "-U", "admin", "-F", "d", "-j", "4", "-d",
                "sales", "-f", "/backups/sales",
            ]
        );
    }

    #[test]
    fn test_restore_args_auto_create() {
        let args = restore_args(&server(), Path::new("/backups/sales.backup"), None);
        assert_eq!(
            args,
            vec![
                "-h", "db.example.com", "-p", "5433", "-U", "admin", "--create", "-d", "postgres",
                "/backups/sales.backup",
            ]
        );
    }

    #[test]
    fn test_restore_args_targeted_does_not_create() {
        let args = restore_args(&server(), Path::new("/backups/sales.backup"), Some("sales_copy"));
        assert_eq!(
            args,
            vec![
                "-h", "db.example.com", "-p", "5433", "-U", "admin", "-d", "sales_copy",
                "/backups/sales.backup",
            ]
        );
        assert!(!args.contains(&"--create".to_string()));
    }

    #[test]
    fn test_createdb_args() {
        let args = createdb_args(&server(), "restored");
        assert_eq!(
            args,
            vec!["-h", "db.example.com", "-p", "5433", "-U", "admin", "restored"]
        );
    }

    #[test]
    fn test_password_never_appears_in_args() {
        let server = server();
        let all = [
            backup_args(&server, "sales", Path::new("/backups"), BackupFormat::Custom),
            restore_args(&server, Path::new("/backups/sales.backup"), None),
            createdb_args(&server, "sales"),
        ];
        for args in all {
            assert!(args.iter().all(|arg| !arg.contains("s3cret")));
        }
    }
}
