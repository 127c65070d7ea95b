//! One-call MongoDB setup from a settings file.
//!
//! ```ignore
//! let env = docsession::bootstrap::boot("config/app.yaml").await?;
//! let mut user: Option<bson::Document> = None;
//! env.db.find_one("users", Some(Filter::eq("name", "alice")), &mut user).await?;
//! ```

use std::path::Path;

use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

use docsession_core::{
    adaptor::{DbAdaptor, StoreAdaptor},
    error::DocumentStoreError,
};
use docsession_mongodb::MongoDbStore;

use crate::{
    config::{ConfigError, Settings},
    logging,
};

#[derive(Error, Debug)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] DocumentStoreError),
}

/// A booted service: its settings, a connected facade and the log writer guard.
pub struct Env {
    pub settings: Settings,
    pub db: Box<dyn DbAdaptor>,
    _log_guard: Option<WorkerGuard>,
}

/// Connects a MongoDB-backed facade using the `Mongodb` settings.
pub async fn connect(settings: &Settings) -> Result<Box<dyn DbAdaptor>, BootError> {
    settings.mongodb.validate()?;

    let db = StoreAdaptor::new(MongoDbStore::new());

    if settings.mongodb.pool_limit > 0 {
        db.set_pool_limit(settings.mongodb.pool_limit).await?;
    }
    db.connect(&settings.mongodb.connection_uri(), &settings.mongodb.db_name)
        .await?;

    info!(
        host = %settings.mongodb.host,
        database = %settings.mongodb.db_name,
        pool_limit = settings.mongodb.pool_limit,
        "database ready"
    );

    Ok(Box::new(db))
}

/// Loads settings from `path`, installs logging and connects.
pub async fn boot<P: AsRef<Path>>(path: P) -> Result<Env, BootError> {
    let settings = Settings::from_file(path)?;
    let log_guard = logging::init(&settings.log, &settings.project_name)?;
    let db = connect(&settings).await?;

    Ok(Env {
        settings,
        db,
        _log_guard: log_guard,
    })
}
