//! Recipe and process configuration types
//!
//! These types are loaded from TOML or flash by the firmware and are
//! read-only once a run starts.

mod process;
mod recipe;

pub use process::{ConfigError, ProcessConfig, ProcessConfigBuilder, RetryPolicy};
pub use recipe::{
    DeviceLimits, Recipe, RecipeDraft, RecipeError, Stage, StageField, MAX_STAGES,
    MAX_STAGE_DURATION_S,
};
