//! Schema REST: a CRUD REST API inferred from the schema of an existing relational database.
//!
//! Requests like `GET /users/3?include=orders&relation=users.id,orders.user_id` are parsed into
//! per-table views, compiled to SQL through a small filter language and executed concurrently.

pub mod config;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod model;
pub mod relation;
pub mod request;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod sql;
pub mod state;

pub use config::{validate_settings, ApiSettings};
pub use error::{AppError, ConfigError, FilterError};
pub use filter::FilterCompiler;
pub use model::{Model, ModelCall, ModelRegistry};
pub use relation::RelationLink;
pub use request::{ParsedRequest, ParsedViews, RequestParser, ResourceView, ViewRole};
pub use routes::{app_router, common_routes, common_routes_with_ready, rest_routes};
pub use schema::{build_catalog, Dialect, IntrospectionProvider, SchemaCatalog, SchemaProvider, TableSchema};
pub use service::{ApiOutput, Command, CommandExecutor, RestEngine};
pub use sql::{PgExecutor, QueryBuf, SqlExecutor, SqlTransaction, SqliteExecutor};
pub use state::AppState;
