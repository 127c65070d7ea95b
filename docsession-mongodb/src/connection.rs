//! Client lifecycle for the MongoDB backend.
//!
//! The driver client is created by `connect`, shared by every query through a
//! cheap handle clone taken under the read lock, and torn down by `disconnect`
//! under the write lock.

use std::time::Duration;

use bson::doc;
use mea::rwlock::RwLock;
use mongodb::{
    Client, Collection as MongoCollection,
    options::{ClientOptions, ReadPreference, SelectionCriteria},
};
use tracing::{debug, info};

use docsession_core::error::{DocumentStoreError, DocumentStoreResult};

/// Upper bound on establishing a connection, including the initial ping.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Default)]
struct ConnectionState {
    database: Option<String>,
    max_pool_size: Option<u32>,
    client: Option<Client>,
}

/// The process-wide connection handle.
#[derive(Debug, Default)]
pub struct MongoConnection {
    state: RwLock<ConnectionState>,
}

fn primary() -> SelectionCriteria {
    SelectionCriteria::ReadPreference(ReadPreference::Primary)
}

async fn ping_primary(client: &Client, database: &str) -> DocumentStoreResult<()> {
    client
        .database(database)
        .run_command(doc! { "ping": 1 })
        .selection_criteria(primary())
        .await
        .map_err(DocumentStoreError::connection)?;

    Ok(())
}

async fn establish(uri: &str, database: &str, max_pool_size: Option<u32>) -> DocumentStoreResult<Client> {
    let mut options = ClientOptions::parse(uri)
        .await
        .map_err(DocumentStoreError::connection)?;

    if max_pool_size.is_some() {
        options.max_pool_size = max_pool_size;
    }
    options.connect_timeout = Some(CONNECT_TIMEOUT);
    options.server_selection_timeout = Some(CONNECT_TIMEOUT);

    let client = Client::with_options(options).map_err(DocumentStoreError::connection)?;
    ping_primary(&client, database).await?;

    Ok(client)
}

impl MongoConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pool size applied by the next `connect`.
    pub async fn set_pool_limit(&self, limit: u32) {
        self.state.write().await.max_pool_size = Some(limit);
    }

    pub async fn pool_limit(&self) -> Option<u32> {
        self.state.read().await.max_pool_size
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.client.is_some()
    }

    /// Builds a client, checks the primary answers, then installs it.
    ///
    /// A client installed by an earlier `connect` is replaced and shut down.
    #[tracing::instrument(skip(self, uri))]
    pub async fn connect(&self, uri: &str, database: &str) -> DocumentStoreResult<()> {
        let max_pool_size = self.pool_limit().await;

        let client = tokio::time::timeout(CONNECT_TIMEOUT, establish(uri, database, max_pool_size))
            .await
            .map_err(|_| DocumentStoreError::Timeout("connect", CONNECT_TIMEOUT))??;

        let previous = {
            let mut state = self.state.write().await;
            state.database = Some(database.to_string());
            state.client.replace(client)
        };

        if let Some(previous) = previous {
            debug!("replacing existing client");
            previous.shutdown().await;
        }

        info!(database, ?max_pool_size, "connected to mongodb");
        Ok(())
    }

    /// Shuts the client down. A no-op when not connected.
    pub async fn disconnect(&self) {
        let mut state = self.state.write().await;

        if let Some(client) = state.client.take() {
            client.shutdown().await;
            info!(database = state.database.as_deref(), "disconnected from mongodb");
        }
    }

    pub async fn ping(&self) -> DocumentStoreResult<()> {
        let (client, database) = self.handle().await?;
        ping_primary(&client, &database).await
    }

    /// Clones the live client and the database name.
    pub async fn handle(&self) -> DocumentStoreResult<(Client, String)> {
        let state = self.state.read().await;

        match (&state.client, &state.database) {
            (Some(client), Some(database)) => Ok((client.clone(), database.clone())),
            _ => Err(DocumentStoreError::NotConnected),
        }
    }

    pub async fn collection(&self, name: &str) -> DocumentStoreResult<MongoCollection<bson::Document>> {
        let (client, database) = self.handle().await?;
        Ok(client.database(&database).collection(name))
    }
}
