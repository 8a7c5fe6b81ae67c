//! Syntropy daemon library - exposes modules for testing.

pub mod aggregator;
pub mod api;
pub mod autofix;
pub mod backup;
pub mod command;
pub mod config;
pub mod config_validator;
pub mod factory;
pub mod fsutil;
pub mod host;
pub mod probes;
pub mod routes;
pub mod server;
pub mod setup;
pub mod templates;
