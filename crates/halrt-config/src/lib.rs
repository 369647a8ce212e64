//! TOML driver descriptions for the halrt plugin runtime.
//!
//! A description lists the plugin's devices, their identity and clock
//! settings, supported rates, and streams. Loading one and calling
//! [`DriverConfig::build`] yields a ready [`halrt_core::Plugin`].
//!
//! # Features
//!
//! - **File Format**: Load and save descriptions as TOML
//! - **Validation**: Report every inconsistency in one pass
//! - **Builder**: Turn a description into live runtime objects
//! - **Built-ins**: Bundled descriptions for common virtual devices
//!
//! # Example
//!
//! ```rust
//! use halrt_config::DriverConfig;
//!
//! let config = DriverConfig::from_toml(r#"
//!     [[devices]]
//!     name = "Loopback"
//!     sample_rate = 48000.0
//!
//!     [[devices.streams]]
//!     direction = "input"
//!     mute = true
//! "#).unwrap();
//!
//! let driver = config.build_driver().unwrap();
//! let devices = driver.plugin().devices();
//! let device = &devices[0];
//! assert_eq!(device.streams().len(), 1);
//! assert_eq!(device.nominal_sample_rate(), 48000.0);
//! ```

mod builtin;
mod driver_config;
mod error;

/// Description validation.
pub mod validation;

pub use builtin::{BUILTIN_NAMES, builtin_config, builtin_configs, is_builtin};
pub use driver_config::{
    DeviceConfig, DriverConfig, PluginConfig, RateSpec, SampleFormat, StreamConfig,
    StreamDirection,
};
pub use error::ConfigError;
pub use validation::{ValidationError, ValidationResult, validate_config, validate_device};
