use diesel_async::pooled_connection::deadpool;
use thiserror::Error;

#[allow(clippy::module_name_repetitions)]
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to create database pool {0}")]
    PoolBuild(#[from] deadpool::BuildError),
    #[error("Database pool failed {0}")]
    Pool(#[from] deadpool::PoolError),
    #[error("Database query failed {0}")]
    Database(#[from] diesel::result::Error),
    #[error("In-memory database lock was poisoned")]
    Poisoned,
    #[error("{entity} {id} does not exist")]
    Missing { entity: &'static str, id: i32 },
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
