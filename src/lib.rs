pub mod background;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod protocol;
pub mod query;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;
