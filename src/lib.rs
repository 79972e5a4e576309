pub mod access;
pub mod auth;
pub mod blob;
pub mod chat;
pub mod config;
pub mod error;
pub mod handler;
pub mod id;
pub mod model;
pub mod reaper;
pub mod registry;
pub mod service;
pub mod transform;
pub mod users;
pub mod util;

use tracing_subscriber::EnvFilter;

/// CloudWatch stamps each line, so no timestamps here.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .without_time()
        .init();
}
