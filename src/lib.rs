pub mod adapters;
pub mod batch;
pub mod clean;
pub mod collector;
pub mod config;
pub mod entity_db;
pub mod entity_store;
pub mod error;
pub mod game;
pub mod http_cache;
pub mod http_client;
pub mod line_db;
pub mod line_key;
pub mod logging;
pub mod matcher;
pub mod model;
pub mod report;
pub mod resolver;
pub mod stream;
