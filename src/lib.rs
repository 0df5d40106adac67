//! crewflow - phase-driven coordination of AI coding agents

pub mod commands;
pub mod config;
pub mod detect;
pub mod dispatch;
pub mod error;
pub mod git;
pub mod subprocess;
pub mod telemetry;
pub mod template;
pub mod workflow;
