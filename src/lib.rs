pub mod apis;
pub mod config;
pub mod constants;
#[cfg(feature = "db")]
pub mod db;
pub mod dedupe;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod resolver;
pub mod storage;
pub mod types;
