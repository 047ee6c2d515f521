//! fOS Proxy Collaborators
//!
//! The glue around the timezone core:
//! - `config`: validated proxy settings loaded from TOML
//! - `pac`: PAC script routing whitelisted hosts direct
//! - `supervisor`: connectivity checks with durable backoff that kick
//!   off timezone detection once the proxy is reachable

pub mod config;
pub mod pac;
pub mod supervisor;

pub use config::{ConfigError, Endpoint, ProxyConfig};
pub use pac::pac_script;
pub use supervisor::{Connectivity, ConnectivitySupervisor, SupervisorError};
