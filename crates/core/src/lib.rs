//! Shared types, error taxonomy, configuration, and capability traits for
//! the outreach sequence platform.

pub mod channels;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod types;

pub use config::AppConfig;
pub use error::{OutreachError, OutreachResult};
