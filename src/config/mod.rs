//! Configuration management
//!
//! Node settings come from defaults, an optional TOML file and `NODE_*`
//! environment variables, in that order of precedence.

pub mod settings;

pub use settings::{Config, WalletKeys};
