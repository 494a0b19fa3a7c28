pub mod agent;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod report;
pub mod tracing;

pub use config::AppConfig;
pub use error::{AskDbError, Result};
