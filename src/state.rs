use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use diesel::{
    SqliteConnection,
    r2d2::{ConnectionManager, Pool, PooledConnection},
};

use crate::{
    error::{ApiError, StorageError},
    events::certificates::{CertificateIssuer, Notifier},
};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub issuer: Arc<dyn CertificateIssuer>,
    pub notifier: Arc<dyn Notifier>,
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

/// A pooled database connection, checked out once per request.
pub struct Conn(PooledConnection<ConnectionManager<SqliteConnection>>);

impl Deref for Conn {
    type Target = PooledConnection<ConnectionManager<SqliteConnection>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Conn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Conn
where
    S: Send + Sync,
    DbPool: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let pool = DbPool::from_ref(state);

        let conn = tokio::task::spawn_blocking(move || pool.get())
            .await
            .map_err(|e| StorageError::Pool(e.to_string()))?
            .map_err(|e| StorageError::Pool(e.to_string()))?;

        Ok(Conn(conn))
    }
}
