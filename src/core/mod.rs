//! Core configuration shared by the library and the CLI.

mod config;

pub use config::{Config, CredentialsConfig, GatewayConfig, OutputConfig};
