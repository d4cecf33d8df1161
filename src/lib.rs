// Library interface, shared by the server binary, integration tests and benchmarks.

pub mod api_model;
pub mod command_line_interface;
pub mod constants;
pub mod database_api;
pub mod database_ddl;
pub mod database_ddl_parse;
pub mod database_model;
pub mod error;
pub mod record_api;
pub mod relational_backend;
pub mod schema;
pub mod schema_engine;
pub mod sql_converters;
pub mod warp_api;
pub mod warp_endpoints;
