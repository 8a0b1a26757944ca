//! Statement building
//!
//! The implementation lives in separate modules:
//!
//! - dialects/: Database-specific SQL generation
//! - args.rs: Argument shapes accepted by conditions and raw SQL
//! - core.rs: SELECT/INSERT/UPDATE/DELETE building
//! - schema.rs: DDL building

#[path = "query_builder_modules/mod.rs"]
mod query_builder_modules;

pub use query_builder_modules::*;
