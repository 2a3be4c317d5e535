pub mod alerts;
pub mod api;
pub mod broadcast;
pub mod config;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod ingest;
pub mod market;
pub mod notify;

pub use engine::AlertEngine;
pub use error::{AlertWatchError, Result};
