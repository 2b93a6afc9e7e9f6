use crate::error::AppError;
use crate::filesystem::AppPaths;
use photo_vault::VaultConfig;

/// Load `coachbook.toml` from the data directory.
///
/// Without a config file the vault runs local-only with default profiles.
pub fn load_vault_config(paths: &AppPaths) -> Result<VaultConfig, AppError> {
    let file = paths.config_file();

    let mut config = if file.exists() {
        log::debug!("Loading configuration from {}", file.display());
        VaultConfig::load(&file)?
    } else {
        log::info!(
            "No configuration at {}, storing photos locally only",
            file.display()
        );
        VaultConfig::new(paths.photos_dir())
    };

    config.storage_path = paths.resolve(&config.storage_path);
    Ok(config)
}
