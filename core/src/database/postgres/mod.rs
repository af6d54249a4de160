pub mod client;
pub mod row_mapping;
pub mod schema;
pub mod sql_literal;
pub mod upsert;
