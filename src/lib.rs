pub mod config;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod model;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod sync;
pub mod ui;
