//! Deployment & invocation adapter — publishes compiled workflow graphs to
//! the external automation runtime and triggers them per contact over
//! webhooks.

pub mod client;
pub mod payload;

pub use client::{DeployOutcome, InvocationOutcome, RuntimeClient};
pub use payload::webhook_payload;
