pub mod builder;
pub mod executor;
pub mod params;
pub mod postgres;
pub mod sqlite;

pub use builder::QueryBuf;
pub use executor::{Row, SqlExecutor, SqlTransaction};
pub use postgres::PgExecutor;
pub use sqlite::SqliteExecutor;
