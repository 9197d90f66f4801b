// src/config/mod.rs

//! Session configuration.
//!
//! Responsibilities:
//! - Define the settings model and the accepted input shapes (`model.rs`).
//! - Normalise duration-like values (`duration.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate values while converting raw input into [`Config`] (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::{DurationInput, TimeoutSetting};
pub use loader::{load_and_validate, load_from_path};
pub use model::{Config, ConfigBuilder, ConfigInput, RawConfig};
