//! Tether Services Layer
//!
//! Settings shared by the bridge and the runtime binary.

pub mod settings;

pub use settings::{ScriptSettings, Settings, SettingsError};
