use crate::error::CoreError;
use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides, e.g. `APP_API__BASE_URL`.
pub const ENV_PREFIX: &str = "APP";

/// Load settings from `<dir>/base.yaml` (optional) layered under `APP_*`
/// environment variables. Nested keys use `__` as separator.
pub fn load_settings<T: DeserializeOwned>(configuration_directory: &Path) -> Result<T, CoreError> {
    let settings = Config::builder()
        .add_source(File::from(configuration_directory.join("base.yaml")).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize::<T>()?)
}

/// Resolve the `config` directory of a crate whether the process runs from
/// the crate directory itself or from the workspace root.
pub fn configuration_directory(crate_dir: &str) -> Result<PathBuf, CoreError> {
    let base_path = std::env::current_dir()?;

    if base_path.ends_with(crate_dir) {
        Ok(base_path.join("config"))
    } else {
        Ok(base_path.join(crate_dir).join("config"))
    }
}
