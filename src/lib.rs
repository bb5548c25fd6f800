//! Resumable account-registration workflow for the decor marketplace client.

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod onboarding;
pub mod store;
pub mod telemetry;
