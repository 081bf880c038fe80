pub mod connection;
pub mod vector_store;

pub use connection::{connect, connect_lazy, connect_options, ConnectError, DbPool};
pub use vector_store::{collection_exists, PgVectorStore, RepositoryError};
