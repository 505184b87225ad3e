//! Database module for PostgreSQL connection, execution and introspection

pub mod connection;
pub mod executor;
pub mod introspection;
pub mod postgres;

pub use connection::init_pool;
pub use executor::{Executor, QueryOutput, ResultSet};
pub use introspection::PostgresSchemaProvider;
pub use postgres::PostgresExecutor;
