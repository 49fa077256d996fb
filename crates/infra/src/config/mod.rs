//! Configuration loading

pub mod loader;

pub use loader::{
    apply_env_overrides, discover_config_path, load, load_from_env, load_from_file, preset_config,
};
