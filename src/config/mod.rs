//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BridgeConfig (validated, immutable)
//!     → handed by reference to startup, forwarder and cleanup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the instance never reloads
//! - All fields have defaults so the bridge runs without a file
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, ConfigError, CONFIG_PATH_ENV};
pub use schema::{
    BridgeConfig, ControlPlaneConfig, ForwarderConfig, LifecycleConfig, ObservabilityConfig,
    OverlayConfig, ParameterConfig,
};
pub use validation::{validate_config, ValidationError};
