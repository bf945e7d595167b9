pub mod catalog;
pub mod dialect;
pub mod introspect;

pub use catalog::{ColumnSchema, DatabaseSchema, SchemaCatalog, TableSchema};
pub use dialect::{Dialect, DialectQueries, ReturningStyle};
pub use introspect::{build_catalog, IntrospectionProvider, SchemaProvider};
