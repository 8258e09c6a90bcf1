pub mod file;
pub mod query;
