/// Database catalog listing
///
/// Connects to a server's administrative database and lists the databases
/// eligible for backup (everything that is not a template).

use tokio_postgres::NoTls;

use crate::core::error::{Error, Result};
use crate::core::servers::ServerDescriptor;
use crate::utils::{ADMIN_DATABASE, DEFAULT_CONNECT_TIMEOUT};

const LIST_DATABASES: &str =
    "SELECT datname FROM pg_database WHERE datistemplate = false ORDER BY datname";

/// List non-template database names on the given server.
pub async fn list_databases(server: &ServerDescriptor) -> Result<Vec<String>> {
    let mut config = tokio_postgres::Config::new();
    config
        .host(&server.host)
        .port(server.port)
        .user(&server.user)
        .password(&server.password)
        .dbname(ADMIN_DATABASE)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT);

    let (client, connection) = config.connect(NoTls).await.map_err(|source| Error::Connection {
        server: server.name.clone(),
        source,
    })?;

    // The connection future must be polled for the client to make progress.
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            tracing::debug!(%err, "catalog connection closed with error");
        }
    });

    let rows = client
        .query(LIST_DATABASES, &[])
        .await
        .map_err(|source| Error::Connection {
            server: server.name.clone(),
            source,
        })?;

    let databases: Vec<String> = rows.into_iter().map(|row| row.get(0)).collect();
    tracing::debug!(server = %server.name, count = databases.len(), "listed databases");

    Ok(databases)
}
