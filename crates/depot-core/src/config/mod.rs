//! Configuration for the deployer and the artifact server
//!
//! Values come from `depot.toml`, then `DEPOT_*` environment variables, then
//! command-line flags, each layer overriding the previous one.

pub mod parser;
pub mod paths;
pub mod schema;
pub mod store;

pub use parser::{parse_depot_toml, parse_depot_toml_str, to_toml};
pub use paths::{CONFIG_FILE_NAME, default_config_path};
pub use schema::{ArtifactApiConfig, DepotConfig, DeploymentConfig, ServerConfig};
pub use store::ConfigStore;
