//! PostgreSQL connection manager for bookshelf.
//!
//! - `Database` owns a lazily established sqlx pool with an explicit
//!   `init` / `shutdown` lifecycle
//! - `StatementBuilder` binds parameters structurally (`$1`, `$2`, ...)
//! - `RecordSet` carries affected-row counts and rows decoded into field maps
//! - `run_migrations` applies module migrations once, recording them in
//!   `schema_migrations`

pub mod error;
pub mod migrate;
pub mod pool;
pub mod record;
pub mod statement;

pub use error::DbError;
pub use migrate::run_migrations;
pub use pool::{connect_options, Database};
pub use record::{Record, RecordSet};
pub use statement::{BindValue, Statement, StatementBuilder};
