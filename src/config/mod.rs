//! Provider configuration.
//!
//! This module handles:
//! - Parsing provider settings from YAML with environment overrides
//! - Validation of settings values
//! - Hashing of requests for idempotent creates

mod hash;
mod parser;
mod settings;

pub use hash::RequestHasher;
pub use parser::{SettingsParser, ENV_DEFAULT_TAGS, ENV_REGION, ENV_STATE_PATH};
pub use settings::{
    ProviderSettings, StateSettings, Timeouts, WaitSettings, DEFAULT_TIMEOUT_SECS,
};
