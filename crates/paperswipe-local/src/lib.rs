//! reqwest-backed gateway to the workflow API.

pub mod config;
pub mod workflow;

pub use config::WorkflowConfig;
pub use workflow::WorkflowClient;
